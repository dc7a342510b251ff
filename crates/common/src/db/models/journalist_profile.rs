//! Journalist profile entity (author extension of a user account)

use super::enums::{MembershipTier, VerificationStatus};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "journalist_profiles")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(unique)]
    pub user_id: Uuid,

    #[sea_orm(column_type = "Text", nullable)]
    pub bio: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub experience: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub specialization: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub location: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub languages: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub website: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub social_media: Option<String>,

    #[sea_orm(column_type = "Text")]
    pub membership_tier: String,

    #[sea_orm(column_type = "Text")]
    pub verification_status: String,

    pub is_verified: bool,

    pub mentor_id: Option<Uuid>,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

impl Model {
    pub fn tier(&self) -> MembershipTier {
        MembershipTier::from(self.membership_tier.as_str())
    }

    pub fn status(&self) -> VerificationStatus {
        VerificationStatus::from(self.verification_status.as_str())
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id",
        on_delete = "Cascade"
    )]
    User,

    #[sea_orm(
        belongs_to = "Entity",
        from = "Column::MentorId",
        to = "Column::Id",
        on_delete = "SetNull"
    )]
    Mentor,

    #[sea_orm(has_many = "super::case::Entity")]
    Cases,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl Related<super::case::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Cases.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

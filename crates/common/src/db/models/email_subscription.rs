//! Per-user email delivery preferences

use super::enums::EmailFrequency;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "email_subscriptions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(unique)]
    pub user_id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub email: String,

    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub preferences: Option<serde_json::Value>,

    #[sea_orm(column_type = "Text")]
    pub frequency: String,

    pub is_active: bool,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

impl Model {
    pub fn email_frequency(&self) -> EmailFrequency {
        EmailFrequency::from(self.frequency.as_str())
    }

    /// Whether queued mail should go out to this subscriber at all
    pub fn wants_email(&self) -> bool {
        self.is_active && self.email_frequency() != EmailFrequency::Never
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
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

//! User account entity

use super::enums::UserRole;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(column_type = "Text", unique)]
    pub email: String,

    /// Argon2id PHC string, never serialized
    #[sea_orm(column_type = "Text")]
    #[serde(skip_serializing)]
    pub password_hash: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub name: Option<String>,

    #[sea_orm(column_type = "Text")]
    pub role: String,

    pub is_active: bool,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

impl Model {
    pub fn user_role(&self) -> UserRole {
        UserRole::from(self.role.as_str())
    }

    /// Display name, falling back to the email address
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.email)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_one = "super::journalist_profile::Entity")]
    JournalistProfile,

    #[sea_orm(has_many = "super::notification::Entity")]
    Notifications,

    #[sea_orm(has_many = "super::case_subscription::Entity")]
    CaseSubscriptions,

    #[sea_orm(has_one = "super::email_subscription::Entity")]
    EmailSubscription,
}

impl Related<super::journalist_profile::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::JournalistProfile.def()
    }
}

impl Related<super::notification::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Notifications.def()
    }
}

impl Related<super::case_subscription::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CaseSubscriptions.def()
    }
}

impl Related<super::email_subscription::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::EmailSubscription.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

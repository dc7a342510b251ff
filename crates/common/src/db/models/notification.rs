//! In-app notification entity

use super::enums::NotificationType;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "notifications")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub user_id: Uuid,

    #[sea_orm(column_name = "type", column_type = "Text")]
    #[serde(rename = "type")]
    pub kind: String,

    #[sea_orm(column_type = "Text")]
    pub title: String,

    #[sea_orm(column_type = "Text")]
    pub message: String,

    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub data: Option<serde_json::Value>,

    #[sea_orm(column_type = "Text")]
    pub priority: String,

    pub is_read: bool,

    pub entity_id: Option<Uuid>,

    #[sea_orm(column_type = "Text", nullable)]
    pub entity_type: Option<String>,

    pub created_at: DateTimeWithTimeZone,
}

impl Model {
    pub fn notification_type(&self) -> NotificationType {
        NotificationType::from(self.kind.as_str())
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

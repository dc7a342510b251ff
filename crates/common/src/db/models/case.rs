//! Case entity: an investigative story tracker

use super::enums::CaseStatus;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "cases")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub journalist_id: Option<Uuid>,

    #[sea_orm(column_type = "Text")]
    pub title: String,

    #[sea_orm(column_type = "Text", unique)]
    pub slug: String,

    #[sea_orm(column_type = "Text")]
    pub description: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub content: Option<String>,

    #[sea_orm(column_type = "Text")]
    pub category: String,

    /// Comma separated, as entered
    #[sea_orm(column_type = "Text", nullable)]
    pub tags: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub location: Option<String>,

    #[sea_orm(column_type = "Text")]
    pub priority: String,

    #[sea_orm(column_type = "Text")]
    pub status: String,

    pub is_public: bool,

    pub published_at: Option<DateTimeWithTimeZone>,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

impl Model {
    pub fn case_status(&self) -> CaseStatus {
        CaseStatus::from(self.status.as_str())
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::journalist_profile::Entity",
        from = "Column::JournalistId",
        to = "super::journalist_profile::Column::Id",
        on_delete = "SetNull"
    )]
    Journalist,

    #[sea_orm(has_many = "super::timeline_event::Entity")]
    Timeline,

    #[sea_orm(has_many = "super::case_source::Entity")]
    Sources,

    #[sea_orm(has_many = "super::case_update::Entity")]
    Updates,

    #[sea_orm(has_many = "super::comment::Entity")]
    Comments,

    #[sea_orm(has_many = "super::document::Entity")]
    Documents,

    #[sea_orm(has_many = "super::case_subscription::Entity")]
    Subscriptions,
}

impl Related<super::journalist_profile::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Journalist.def()
    }
}

impl Related<super::timeline_event::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Timeline.def()
    }
}

impl Related<super::case_source::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Sources.def()
    }
}

impl Related<super::case_update::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Updates.def()
    }
}

impl Related<super::comment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Comments.def()
    }
}

impl Related<super::document::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Documents.def()
    }
}

impl Related<super::case_subscription::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Subscriptions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

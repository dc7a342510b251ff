//! Outgoing email queue entity

use super::enums::EmailStatus;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "email_queue")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub to_address: String,

    #[sea_orm(column_type = "Text")]
    pub subject: String,

    #[sea_orm(column_type = "Text")]
    pub html_content: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub text_content: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub template_id: Option<String>,

    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub data: Option<serde_json::Value>,

    #[sea_orm(column_type = "Text")]
    pub status: String,

    pub attempts: i32,

    #[sea_orm(column_type = "Text", nullable)]
    pub error: Option<String>,

    pub sent_at: Option<DateTimeWithTimeZone>,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

impl Model {
    pub fn email_status(&self) -> EmailStatus {
        EmailStatus::from(self.status.as_str())
    }

    /// Still eligible for a delivery attempt
    pub fn is_deliverable(&self, max_attempts: i32) -> bool {
        self.email_status() == EmailStatus::Pending && self.attempts < max_attempts
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

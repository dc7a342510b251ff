//! Verification: a peer or staff judgment on a case, document, source
//! or journalist

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "verifications")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub target_id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub target_type: String,

    #[sea_orm(column_type = "Text")]
    pub status: String,

    /// 1..=100
    pub confidence: Option<i32>,

    #[sea_orm(column_type = "Text", nullable)]
    pub notes: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub evidence: Option<String>,

    pub verifier_id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub verifier_type: String,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::VerifierId",
        to = "super::user::Column::Id",
        on_delete = "Cascade"
    )]
    Verifier,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Verifier.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Append-only stock history row written by the inventory ledger
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "inventory_movements")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub variant_id: Uuid,
    /// Order that caused the movement; not a foreign key so history outlives the order
    pub order_id: Option<Uuid>,
    /// Signed stock change
    pub delta: i32,
    pub reason: MovementReason,
    pub stock_after: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::commerce::product_variant::Entity",
        from = "Column::VariantId",
        to = "super::commerce::product_variant::Column::Id"
    )]
    ProductVariant,
}

impl Related<super::commerce::product_variant::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ProductVariant.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(30))")]
#[serde(rename_all = "snake_case")]
pub enum MovementReason {
    #[sea_orm(string_value = "order_debit")]
    OrderDebit,
    #[sea_orm(string_value = "order_cancel_credit")]
    OrderCancelCredit,
}

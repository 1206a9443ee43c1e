//! Stock and sales counters.
//!
//! Every mutation takes a caller-owned [`DatabaseTransaction`]. There is no
//! pool-level entry point.

use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseTransaction,
    EntityTrait, QueryFilter,
};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::entities::{
    commerce::product_variant,
    inventory_movement::{self, MovementReason},
    product,
};
use crate::errors::{ServiceError, StockShortage};

/// Result of one ledger mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockChange {
    pub variant_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub stock_after: i32,
}

pub struct InventoryLedger;

impl InventoryLedger {
    /// Removes `quantity` units and books them as sold.
    ///
    /// The decrement is a compare-and-swap on `stock >= quantity`, so a debit
    /// that would drive stock negative is rejected rather than clamped, even if
    /// the caller's earlier read is stale.
    #[instrument(skip(txn))]
    pub async fn debit(
        txn: &DatabaseTransaction,
        variant_id: Uuid,
        quantity: i32,
        order_id: Option<Uuid>,
    ) -> Result<StockChange, ServiceError> {
        ensure_positive(quantity)?;

        let updated = product_variant::Entity::update_many()
            .col_expr(
                product_variant::Column::Stock,
                Expr::col(product_variant::Column::Stock).sub(quantity),
            )
            .col_expr(product_variant::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(product_variant::Column::Id.eq(variant_id))
            .filter(product_variant::Column::Stock.gte(quantity))
            .exec(txn)
            .await?;

        if updated.rows_affected == 0 {
            let variant = product_variant::Entity::find_by_id(variant_id)
                .one(txn)
                .await?
                .ok_or(ServiceError::VariantNotFound(variant_id))?;
            return Err(ServiceError::InsufficientStock(vec![StockShortage {
                variant_id,
                available: variant.stock,
                requested: quantity,
            }]));
        }

        let variant = product_variant::Entity::find_by_id(variant_id)
            .one(txn)
            .await?
            .ok_or(ServiceError::VariantNotFound(variant_id))?;

        product::Entity::update_many()
            .col_expr(
                product::Column::SalesCount,
                Expr::col(product::Column::SalesCount).add(i64::from(quantity)),
            )
            .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(product::Column::Id.eq(variant.product_id))
            .exec(txn)
            .await?;

        record_movement(
            txn,
            variant_id,
            order_id,
            -quantity,
            MovementReason::OrderDebit,
            variant.stock,
        )
        .await?;

        debug!(stock_after = variant.stock, "stock debited");
        Ok(StockChange {
            variant_id,
            product_id: variant.product_id,
            quantity,
            stock_after: variant.stock,
        })
    }

    /// Returns `quantity` units to stock. Sales counters are lifetime totals
    /// and are left untouched.
    #[instrument(skip(txn))]
    pub async fn credit(
        txn: &DatabaseTransaction,
        variant_id: Uuid,
        quantity: i32,
        order_id: Option<Uuid>,
    ) -> Result<StockChange, ServiceError> {
        ensure_positive(quantity)?;

        let updated = product_variant::Entity::update_many()
            .col_expr(
                product_variant::Column::Stock,
                Expr::col(product_variant::Column::Stock).add(quantity),
            )
            .col_expr(product_variant::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(product_variant::Column::Id.eq(variant_id))
            .exec(txn)
            .await?;

        if updated.rows_affected == 0 {
            return Err(ServiceError::VariantNotFound(variant_id));
        }

        let variant = product_variant::Entity::find_by_id(variant_id)
            .one(txn)
            .await?
            .ok_or(ServiceError::VariantNotFound(variant_id))?;

        record_movement(
            txn,
            variant_id,
            order_id,
            quantity,
            MovementReason::OrderCancelCredit,
            variant.stock,
        )
        .await?;

        debug!(stock_after = variant.stock, "stock credited");
        Ok(StockChange {
            variant_id,
            product_id: variant.product_id,
            quantity,
            stock_after: variant.stock,
        })
    }
}

fn ensure_positive(quantity: i32) -> Result<(), ServiceError> {
    if quantity <= 0 {
        return Err(ServiceError::ValidationError(format!(
            "Ledger quantity must be positive, got {}",
            quantity
        )));
    }
    Ok(())
}

async fn record_movement(
    txn: &DatabaseTransaction,
    variant_id: Uuid,
    order_id: Option<Uuid>,
    delta: i32,
    reason: MovementReason,
    stock_after: i32,
) -> Result<(), ServiceError> {
    inventory_movement::ActiveModel {
        id: Set(Uuid::new_v4()),
        variant_id: Set(variant_id),
        order_id: Set(order_id),
        delta: Set(delta),
        reason: Set(reason),
        stock_after: Set(stock_after),
        created_at: Set(Utc::now()),
    }
    .insert(txn)
    .await?;
    Ok(())
}

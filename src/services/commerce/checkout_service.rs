use crate::{
    config::AppConfig,
    db::locks::{advisory_xact_lock, begin_write},
    entities::{
        commerce::{cart, cart_item, product_variant, CartOwner},
        order, order_item, OrderStatus,
    },
    errors::{ServiceError, StockShortage},
    events::{Event, EventSender},
    services::{
        inventory_ledger::{InventoryLedger, StockChange},
        orders::OrderView,
    },
};
use chrono::Utc;
use metrics::counter;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction,
    DbBackend, EntityTrait, QueryFilter, QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

/// Request body for placing an order
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateOrderFromCartRequest {
    pub cart_id: Uuid,
}

#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    pub transaction_timeout: Duration,
    pub currency: String,
    pub low_stock_threshold: i32,
}

impl From<&AppConfig> for CheckoutSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            transaction_timeout: config.order_transaction_timeout(),
            currency: config.default_currency.clone(),
            low_stock_threshold: config.low_stock_threshold,
        }
    }
}

/// Checkout service for converting carts to orders
#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    settings: CheckoutSettings,
}

/// A cart line joined with its locked variant row
struct PricedLine {
    item: cart_item::Model,
    variant: product_variant::Model,
}

impl CheckoutService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        settings: CheckoutSettings,
    ) -> Self {
        Self {
            db,
            event_sender,
            settings,
        }
    }

    /// Converts the user's cart into an order.
    ///
    /// Stock validation, the order snapshot, the inventory debit and removal
    /// of the cart happen in one transaction. Any failure, including the
    /// transaction timeout, leaves carts and stock exactly as they were.
    #[instrument(skip(self))]
    pub async fn create_order_from_cart(
        &self,
        user_id: Uuid,
        cart_id: Uuid,
    ) -> Result<OrderView, ServiceError> {
        let placed = tokio::time::timeout(
            self.settings.transaction_timeout,
            self.place_order(user_id, cart_id),
        )
        .await
        .map_err(|_| {
            ServiceError::TransactionAborted(format!(
                "Order transaction exceeded {:?}",
                self.settings.transaction_timeout
            ))
        })?;

        let (view, debits) = match placed {
            Ok(done) => done,
            Err(err) => {
                if let ServiceError::InsufficientStock(shortages) = &err {
                    counter!("storefront.orders.insufficient_stock", 1);
                    warn!(%cart_id, shortages = shortages.len(), "Checkout rejected for insufficient stock");
                }
                return Err(err);
            }
        };

        info!(
            order_id = %view.id,
            %user_id,
            amount_cents = view.amount_cents,
            lines = view.items.len(),
            "Order created from cart"
        );
        counter!("storefront.orders.created", 1);

        self.event_sender.send_or_log(Event::OrderCreated {
            order_id: view.id,
            user_id,
            amount_cents: view.amount_cents,
        });
        for change in &debits {
            self.event_sender.send_or_log(Event::InventoryDebited {
                variant_id: change.variant_id,
                quantity: change.quantity,
                stock_after: change.stock_after,
            });
            if change.stock_after <= self.settings.low_stock_threshold {
                self.event_sender.send_or_log(Event::LowStock {
                    variant_id: change.variant_id,
                    stock: change.stock_after,
                });
            }
        }

        Ok(view)
    }

    async fn place_order(
        &self,
        user_id: Uuid,
        cart_id: Uuid,
    ) -> Result<(OrderView, Vec<StockChange>), ServiceError> {
        let txn = begin_write(&*self.db).await?;
        let is_postgres = txn.get_database_backend() == DbBackend::Postgres;

        let mut cart_query = cart::Entity::find_by_id(cart_id);
        if is_postgres {
            cart_query = cart_query.lock_exclusive();
        }
        let cart = cart_query
            .one(&txn)
            .await?
            .filter(|c| c.is_owned_by(&CartOwner::User(user_id)))
            .ok_or_else(|| ServiceError::NotFound(format!("Cart {} not found", cart_id)))?;

        let mut items = cart_item::Entity::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .all(&txn)
            .await?;
        if items.is_empty() {
            return Err(ServiceError::ValidationError(format!(
                "Cart {} has no items",
                cart.id
            )));
        }
        // Ascending variant order for every checkout keeps row locks deadlock free
        items.sort_by_key(|item| item.variant_id);

        let lines = lock_variants(&txn, items, is_postgres).await?;

        let shortages: Vec<StockShortage> = lines
            .iter()
            .filter(|line| line.item.quantity > line.variant.stock)
            .map(|line| StockShortage {
                variant_id: line.variant.id,
                available: line.variant.stock,
                requested: line.item.quantity,
            })
            .collect();
        if !shortages.is_empty() {
            return Err(ServiceError::InsufficientStock(shortages));
        }

        let amount_cents = order_total(&lines)?;
        let now = Utc::now();
        let order_id = Uuid::new_v4();

        let order = order::ActiveModel {
            id: Set(order_id),
            user_id: Set(user_id),
            amount_cents: Set(amount_cents),
            currency: Set(self.settings.currency.clone()),
            status: Set(OrderStatus::Pending),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        let snapshot: Vec<order_item::Model> = lines
            .iter()
            .map(|line| order_item::Model {
                id: Uuid::new_v4(),
                order_id,
                variant_id: line.variant.id,
                sku: line.variant.sku.clone(),
                quantity: line.item.quantity,
                unit_price_cents: line.variant.price_cents,
                line_total_cents: i64::from(line.item.quantity) * line.variant.price_cents,
            })
            .collect();
        order_item::Entity::insert_many(snapshot.iter().map(|item| order_item::ActiveModel {
            id: Set(item.id),
            order_id: Set(item.order_id),
            variant_id: Set(item.variant_id),
            sku: Set(item.sku.clone()),
            quantity: Set(item.quantity),
            unit_price_cents: Set(item.unit_price_cents),
            line_total_cents: Set(item.line_total_cents),
        }))
        .exec_without_returning(&txn)
        .await?;

        let mut debits = Vec::with_capacity(lines.len());
        for line in &lines {
            debits.push(
                InventoryLedger::debit(&txn, line.variant.id, line.item.quantity, Some(order_id))
                    .await?,
            );
        }

        cart_item::Entity::delete_many()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .exec(&txn)
            .await?;
        cart::Entity::delete_by_id(cart.id).exec(&txn).await?;

        txn.commit()
            .await
            .map_err(|e| ServiceError::TransactionAborted(format!("Commit failed: {}", e)))?;

        Ok((OrderView::from_parts(order, snapshot), debits))
    }
}

/// Reads the variant behind every line, taking row locks on PostgreSQL.
async fn lock_variants(
    txn: &DatabaseTransaction,
    items: Vec<cart_item::Model>,
    is_postgres: bool,
) -> Result<Vec<PricedLine>, ServiceError> {
    let mut lines = Vec::with_capacity(items.len());
    for item in items {
        if is_postgres {
            advisory_xact_lock(txn, "variant_stock", &item.variant_id.to_string()).await?;
        }
        let mut query = product_variant::Entity::find_by_id(item.variant_id);
        if is_postgres {
            query = query.lock_exclusive();
        }
        let variant = query
            .one(txn)
            .await?
            .ok_or(ServiceError::VariantNotFound(item.variant_id))?;
        lines.push(PricedLine { item, variant });
    }
    Ok(lines)
}

fn order_total(lines: &[PricedLine]) -> Result<i64, ServiceError> {
    lines.iter().try_fold(0i64, |total, line| {
        i64::from(line.item.quantity)
            .checked_mul(line.variant.price_cents)
            .and_then(|line_total| total.checked_add(line_total))
            .ok_or_else(|| ServiceError::ValidationError("Order total is out of range".to_string()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(quantity: i32, price_cents: i64) -> PricedLine {
        let now = Utc::now();
        let variant_id = Uuid::new_v4();
        PricedLine {
            item: cart_item::Model {
                id: Uuid::new_v4(),
                cart_id: Uuid::new_v4(),
                variant_id,
                quantity,
                created_at: now,
                updated_at: now,
            },
            variant: product_variant::Model {
                id: variant_id,
                product_id: Uuid::new_v4(),
                sku: "SKU".into(),
                name: "Variant".into(),
                price_cents,
                stock: 10,
                created_at: now,
                updated_at: now,
            },
        }
    }

    #[test]
    fn total_sums_quantity_times_price() {
        let lines = vec![line(2, 1_250), line(1, 999)];
        assert_eq!(order_total(&lines).unwrap(), 3_499);
    }

    #[test]
    fn total_overflow_is_rejected() {
        let lines = vec![line(2, i64::MAX)];
        assert!(order_total(&lines).is_err());
    }
}

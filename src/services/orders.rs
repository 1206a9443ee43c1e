use crate::{
    auth::Role,
    common::money,
    db::locks::begin_write,
    entities::{
        order::{self, Entity as OrderEntity, Model as OrderModel},
        order_item::{self, Entity as OrderItemEntity, Model as OrderItemModel},
        OrderStatus,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        inventory_ledger::{InventoryLedger, StockChange},
        order_status::ensure_transition,
    },
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

/// Order header with its purchase snapshot
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderView {
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount: Decimal,
    pub amount_cents: i64,
    pub currency: String,
    pub status: OrderStatus,
    pub items: Vec<OrderItemView>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct OrderItemView {
    pub variant_id: Uuid,
    pub sku: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub unit_price_cents: i64,
    pub line_total: Decimal,
    pub line_total_cents: i64,
}

impl From<OrderItemModel> for OrderItemView {
    fn from(item: OrderItemModel) -> Self {
        Self {
            variant_id: item.variant_id,
            sku: item.sku,
            quantity: item.quantity,
            unit_price: money(item.unit_price_cents),
            unit_price_cents: item.unit_price_cents,
            line_total: money(item.line_total_cents),
            line_total_cents: item.line_total_cents,
        }
    }
}

impl OrderView {
    pub fn from_parts(order: OrderModel, items: Vec<OrderItemModel>) -> Self {
        Self {
            id: order.id,
            user_id: order.user_id,
            amount: money(order.amount_cents),
            amount_cents: order.amount_cents,
            currency: order.currency,
            status: order.status,
            items: items.into_iter().map(OrderItemView::from).collect(),
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderListResponse {
    pub orders: Vec<OrderView>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

/// Reads and status changes for existing orders. Orders are created by
/// [`crate::services::commerce::CheckoutService`].
#[derive(Clone)]
pub struct OrderService {
    db_pool: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    max_page_size: u64,
}

impl OrderService {
    /// Creates a new order service instance
    pub fn new(
        db_pool: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        max_page_size: u64,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            max_page_size: max_page_size.max(1),
        }
    }

    /// Fetches an order. Admins may read any order; everyone else only their
    /// own, and a foreign order is reported as missing.
    #[instrument(skip(self))]
    pub async fn get_order_for_user(
        &self,
        order_id: Uuid,
        requester: Uuid,
        role: Role,
    ) -> Result<OrderView, ServiceError> {
        let db = &*self.db_pool;
        let order = OrderEntity::find_by_id(order_id)
            .one(db)
            .await?
            .filter(|o| role.is_admin() || o.user_id == requester)
            .ok_or_else(|| order_not_found(order_id))?;
        load_order_view(db, order).await
    }

    /// Lists the user's orders, newest first
    #[instrument(skip(self))]
    pub async fn list_orders_for_user(&self, user_id: Uuid) -> Result<Vec<OrderView>, ServiceError> {
        let db = &*self.db_pool;
        let orders = OrderEntity::find()
            .filter(order::Column::UserId.eq(user_id))
            .order_by_desc(order::Column::CreatedAt)
            .order_by_desc(order::Column::Id)
            .all(db)
            .await?;
        attach_items(db, orders).await
    }

    /// Lists all orders with pagination. `page` starts at 1.
    #[instrument(skip(self))]
    pub async fn list_orders(&self, page: u64, per_page: u64) -> Result<OrderListResponse, ServiceError> {
        let db = &*self.db_pool;
        let page = page.max(1);
        let per_page = per_page.clamp(1, self.max_page_size);

        let paginator = OrderEntity::find()
            .order_by_desc(order::Column::CreatedAt)
            .order_by_desc(order::Column::Id)
            .paginate(db, per_page);

        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page - 1).await?;
        let orders = attach_items(db, orders).await?;

        Ok(OrderListResponse {
            orders,
            total,
            page,
            per_page,
        })
    }

    /// Moves an order along the status table. Entering CANCELED puts every
    /// line back into stock in the same transaction.
    #[instrument(skip(self))]
    pub async fn update_order_status(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
    ) -> Result<OrderView, ServiceError> {
        let txn = begin_write(&*self.db_pool).await?;
        let order = OrderEntity::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| order_not_found(order_id))?;

        let (view, credits, from) = apply_transition(&txn, order, new_status).await?;
        txn.commit().await?;

        self.publish_transition(&view, from, &credits);
        Ok(view)
    }

    /// Owner-initiated cancellation
    #[instrument(skip(self))]
    pub async fn cancel_order(&self, user_id: Uuid, order_id: Uuid) -> Result<OrderView, ServiceError> {
        let txn = begin_write(&*self.db_pool).await?;
        let order = OrderEntity::find_by_id(order_id)
            .one(&txn)
            .await?
            .filter(|o| o.user_id == user_id)
            .ok_or_else(|| order_not_found(order_id))?;

        let (view, credits, from) = apply_transition(&txn, order, OrderStatus::Canceled).await?;
        txn.commit().await?;

        self.publish_transition(&view, from, &credits);
        Ok(view)
    }

    /// Administrative removal. Ledger history keeps the order id.
    #[instrument(skip(self))]
    pub async fn delete_order(&self, order_id: Uuid) -> Result<(), ServiceError> {
        let txn = begin_write(&*self.db_pool).await?;

        OrderItemEntity::delete_many()
            .filter(order_item::Column::OrderId.eq(order_id))
            .exec(&txn)
            .await?;
        let result = OrderEntity::delete_by_id(order_id).exec(&txn).await?;
        if result.rows_affected == 0 {
            return Err(order_not_found(order_id));
        }
        txn.commit().await?;

        warn!(%order_id, "Order deleted by administrator");
        self.event_sender.send_or_log(Event::OrderDeleted(order_id));
        Ok(())
    }

    fn publish_transition(&self, view: &OrderView, from: OrderStatus, credits: &[StockChange]) {
        info!(order_id = %view.id, %from, to = %view.status, "Order status updated");
        self.event_sender.send_or_log(Event::OrderStatusChanged {
            order_id: view.id,
            from,
            to: view.status,
        });
        for change in credits {
            self.event_sender.send_or_log(Event::InventoryCredited {
                variant_id: change.variant_id,
                quantity: change.quantity,
                stock_after: change.stock_after,
            });
        }
    }
}

fn order_not_found(order_id: Uuid) -> ServiceError {
    ServiceError::NotFound(format!("Order {} not found", order_id))
}

/// Performs a guarded status change. The update only applies while the
/// stored status still equals the one that was validated, so two racing
/// transitions cannot both succeed.
async fn apply_transition(
    txn: &DatabaseTransaction,
    order: OrderModel,
    new_status: OrderStatus,
) -> Result<(OrderView, Vec<StockChange>, OrderStatus), ServiceError> {
    let from = order.status;
    ensure_transition(from, new_status)?;

    let updated = OrderEntity::update_many()
        .col_expr(order::Column::Status, Expr::value(new_status))
        .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(order::Column::Id.eq(order.id))
        .filter(order::Column::Status.eq(from))
        .exec(txn)
        .await?;
    if updated.rows_affected == 0 {
        return Err(ServiceError::Conflict(format!(
            "Order {} was modified concurrently",
            order.id
        )));
    }

    let items = OrderItemEntity::find()
        .filter(order_item::Column::OrderId.eq(order.id))
        .order_by_asc(order_item::Column::VariantId)
        .all(txn)
        .await?;

    let mut credits = Vec::new();
    if new_status == OrderStatus::Canceled {
        for item in &items {
            credits.push(
                InventoryLedger::credit(txn, item.variant_id, item.quantity, Some(order.id)).await?,
            );
        }
    }

    let fresh = OrderEntity::find_by_id(order.id)
        .one(txn)
        .await?
        .ok_or_else(|| order_not_found(order.id))?;

    Ok((OrderView::from_parts(fresh, items), credits, from))
}

pub(crate) async fn load_order_view<C>(conn: &C, order: OrderModel) -> Result<OrderView, ServiceError>
where
    C: ConnectionTrait,
{
    let items = OrderItemEntity::find()
        .filter(order_item::Column::OrderId.eq(order.id))
        .order_by_asc(order_item::Column::VariantId)
        .all(conn)
        .await?;
    Ok(OrderView::from_parts(order, items))
}

async fn attach_items<C>(conn: &C, orders: Vec<OrderModel>) -> Result<Vec<OrderView>, ServiceError>
where
    C: ConnectionTrait,
{
    if orders.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
    let mut by_order: HashMap<Uuid, Vec<OrderItemModel>> = HashMap::new();
    for item in OrderItemEntity::find()
        .filter(order_item::Column::OrderId.is_in(ids))
        .order_by_asc(order_item::Column::VariantId)
        .all(conn)
        .await?
    {
        by_order.entry(item.order_id).or_default().push(item);
    }

    Ok(orders
        .into_iter()
        .map(|order| {
            let items = by_order.remove(&order.id).unwrap_or_default();
            OrderView::from_parts(order, items)
        })
        .collect())
}

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::OnConflict, ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait,
    DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::common::money;
use crate::db::locks::begin_write;
use crate::entities::commerce::{
    cart::{self, CartOwner},
    cart_item, product_variant,
};
use crate::errors::ServiceError;

/// Upper bound for a single cart line
pub const MAX_LINE_QUANTITY: i32 = 10_000;

/// Cart service for managing shopping carts
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
}

/// Input for adding an item to a cart
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct AddToCartInput {
    pub variant_id: Uuid,
    #[validate(range(min = 1, max = 10000))]
    pub quantity: i32,
}

/// Cart with its items and live pricing
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CartView {
    pub id: Uuid,
    #[schema(value_type = Object)]
    pub owner: CartOwner,
    pub items: Vec<CartLineView>,
    /// Sum of line quantities
    pub item_count: i64,
    pub subtotal: Decimal,
    pub subtotal_cents: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CartLineView {
    pub id: Uuid,
    pub variant_id: Uuid,
    pub sku: String,
    pub name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

impl CartView {
    pub fn quantity_of(&self, variant_id: Uuid) -> Option<i32> {
        self.items
            .iter()
            .find(|line| line.variant_id == variant_id)
            .map(|line| line.quantity)
    }
}

impl CartService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Returns the owner's cart with items
    #[instrument(skip(self))]
    pub async fn get_cart(&self, owner: &CartOwner) -> Result<CartView, ServiceError> {
        let db = &*self.db;
        let cart = find_cart(db, owner)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Cart for {} not found", owner)))?;
        load_cart_view(db, cart).await
    }

    /// Adds a variant to the owner's cart, creating the cart on first use.
    /// An existing line for the same variant has its quantity increased.
    #[instrument(skip(self))]
    pub async fn add_item(
        &self,
        owner: &CartOwner,
        input: AddToCartInput,
    ) -> Result<CartView, ServiceError> {
        input.validate()?;

        let txn = begin_write(&*self.db).await?;

        product_variant::Entity::find_by_id(input.variant_id)
            .one(&txn)
            .await?
            .ok_or(ServiceError::VariantNotFound(input.variant_id))?;

        let cart = ensure_cart(&txn, owner).await?;
        let now = Utc::now();

        let existing = cart_item::Entity::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::VariantId.eq(input.variant_id))
            .one(&txn)
            .await?;

        match existing {
            Some(item) => {
                let quantity = checked_line_quantity(item.quantity, input.quantity)?;
                let mut active: cart_item::ActiveModel = item.into();
                active.quantity = Set(quantity);
                active.updated_at = Set(now);
                active.update(&txn).await?;
            }
            None => {
                cart_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    cart_id: Set(cart.id),
                    variant_id: Set(input.variant_id),
                    quantity: Set(input.quantity),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(&txn)
                .await?;
            }
        }

        touch_cart(&txn, cart.id).await?;
        let view = load_cart_view(&txn, cart).await?;
        txn.commit().await?;

        info!(cart_id = %view.id, variant_id = %input.variant_id, "Item added to cart");
        Ok(view)
    }

    /// Sets the quantity of a cart line. A quantity of zero removes the line.
    #[instrument(skip(self))]
    pub async fn update_item_quantity(
        &self,
        owner: &CartOwner,
        variant_id: Uuid,
        quantity: i32,
    ) -> Result<CartView, ServiceError> {
        if !(0..=MAX_LINE_QUANTITY).contains(&quantity) {
            return Err(ServiceError::ValidationError(format!(
                "Quantity must be between 0 and {}",
                MAX_LINE_QUANTITY
            )));
        }

        let txn = begin_write(&*self.db).await?;
        let cart = find_cart(&txn, owner)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Cart for {} not found", owner)))?;

        let item = cart_item::Entity::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::VariantId.eq(variant_id))
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Variant {} is not in cart {}", variant_id, cart.id))
            })?;

        if quantity == 0 {
            cart_item::Entity::delete_by_id(item.id).exec(&txn).await?;
        } else {
            let mut active: cart_item::ActiveModel = item.into();
            active.quantity = Set(quantity);
            active.updated_at = Set(Utc::now());
            active.update(&txn).await?;
        }

        touch_cart(&txn, cart.id).await?;
        let view = load_cart_view(&txn, cart).await?;
        txn.commit().await?;
        Ok(view)
    }

    /// Removes a variant from the owner's cart
    pub async fn remove_item(
        &self,
        owner: &CartOwner,
        variant_id: Uuid,
    ) -> Result<CartView, ServiceError> {
        self.update_item_quantity(owner, variant_id, 0).await
    }

    /// Empties the owner's cart; the cart record itself is kept
    #[instrument(skip(self))]
    pub async fn clear_cart(&self, owner: &CartOwner) -> Result<(), ServiceError> {
        let txn = begin_write(&*self.db).await?;
        let cart = find_cart(&txn, owner)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Cart for {} not found", owner)))?;

        cart_item::Entity::delete_many()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .exec(&txn)
            .await?;
        touch_cart(&txn, cart.id).await?;
        txn.commit().await?;

        info!(cart_id = %cart.id, "Cart cleared");
        Ok(())
    }
}

pub(crate) fn checked_line_quantity(current: i32, added: i32) -> Result<i32, ServiceError> {
    current
        .checked_add(added)
        .filter(|total| *total <= MAX_LINE_QUANTITY)
        .ok_or_else(|| {
            ServiceError::ValidationError(format!(
                "Line quantity may not exceed {}",
                MAX_LINE_QUANTITY
            ))
        })
}

pub(crate) async fn find_cart<C>(conn: &C, owner: &CartOwner) -> Result<Option<cart::Model>, ServiceError>
where
    C: ConnectionTrait,
{
    Ok(cart::Entity::find().filter(owner.filter()).one(conn).await?)
}

/// Looks up the owner's cart, inserting it if absent. Concurrent creators
/// converge on the same row through the unique owner index.
pub(crate) async fn ensure_cart<C>(conn: &C, owner: &CartOwner) -> Result<cart::Model, ServiceError>
where
    C: ConnectionTrait,
{
    if let Some(existing) = find_cart(conn, owner).await? {
        return Ok(existing);
    }

    let now = Utc::now();
    let model = cart::ActiveModel {
        id: Set(Uuid::new_v4()),
        owner_kind: Set(owner.kind()),
        owner_key: Set(owner.key()),
        created_at: Set(now),
        updated_at: Set(now),
    };
    cart::Entity::insert(model)
        .on_conflict(
            OnConflict::columns([cart::Column::OwnerKind, cart::Column::OwnerKey])
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(conn)
        .await?;

    find_cart(conn, owner)
        .await?
        .ok_or_else(|| ServiceError::InternalError(format!("Cart for {} was not persisted", owner)))
}

pub(crate) async fn touch_cart<C>(conn: &C, cart_id: Uuid) -> Result<(), ServiceError>
where
    C: ConnectionTrait,
{
    cart::Entity::update_many()
        .col_expr(
            cart::Column::UpdatedAt,
            sea_orm::sea_query::Expr::value(Utc::now()),
        )
        .filter(cart::Column::Id.eq(cart_id))
        .exec(conn)
        .await?;
    Ok(())
}

/// Loads a cart's lines joined with their variants
pub(crate) async fn load_cart_view<C>(conn: &C, cart: cart::Model) -> Result<CartView, ServiceError>
where
    C: ConnectionTrait,
{
    let owner = cart.owner().ok_or_else(|| {
        ServiceError::InternalError(format!("Cart {} has a malformed owner key", cart.id))
    })?;

    let rows = cart_item::Entity::find()
        .filter(cart_item::Column::CartId.eq(cart.id))
        .order_by_asc(cart_item::Column::CreatedAt)
        .order_by_asc(cart_item::Column::Id)
        .find_also_related(product_variant::Entity)
        .all(conn)
        .await?;

    let mut subtotal_cents: i64 = 0;
    let mut item_count: i64 = 0;
    let mut items = Vec::with_capacity(rows.len());
    for (item, variant) in rows {
        let Some(variant) = variant else { continue };
        let line_cents = i64::from(item.quantity) * variant.price_cents;
        subtotal_cents += line_cents;
        item_count += i64::from(item.quantity);
        items.push(CartLineView {
            id: item.id,
            variant_id: item.variant_id,
            sku: variant.sku,
            name: variant.name,
            quantity: item.quantity,
            unit_price: money(variant.price_cents),
            line_total: money(line_cents),
        });
    }

    // Reflect writes made earlier in the same unit of work
    let updated_at = cart::Entity::find_by_id(cart.id)
        .one(conn)
        .await?
        .map(|fresh| fresh.updated_at)
        .unwrap_or(cart.updated_at);

    Ok(CartView {
        id: cart.id,
        owner,
        items,
        item_count,
        subtotal: money(subtotal_cents),
        subtotal_cents,
        created_at: cart.created_at,
        updated_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_quantity_is_capped() {
        assert_eq!(checked_line_quantity(2, 3).unwrap(), 5);
        assert!(checked_line_quantity(MAX_LINE_QUANTITY, 1).is_err());
        assert!(checked_line_quantity(i32::MAX, 1).is_err());
    }

    #[test]
    fn add_input_rejects_non_positive_quantity() {
        let input = AddToCartInput {
            variant_id: Uuid::new_v4(),
            quantity: 0,
        };
        assert!(input.validate().is_err());
    }
}

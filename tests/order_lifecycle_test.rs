//! Order status transitions, cancellation and access rules.

mod common;

use assert_matches::assert_matches;
use common::TestApp;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use storefront_api::auth::Role;
use storefront_api::entities::{commerce::CartOwner, inventory_movement, OrderStatus};
use storefront_api::errors::ServiceError;
use storefront_api::services::orders::OrderView;
use uuid::Uuid;

async fn place_order(app: &TestApp, user_id: Uuid, variant_id: Uuid, quantity: i32) -> OrderView {
    let cart = app
        .add_to_cart(&CartOwner::User(user_id), variant_id, quantity)
        .await;
    app.state
        .services
        .checkout
        .create_order_from_cart(user_id, cart.id)
        .await
        .unwrap()
}

#[tokio::test]
async fn order_walks_forward_through_fulfilment() {
    let app = TestApp::new().await;
    let variant = app.seed_variant("FLOW", 1_000, 10).await;
    let order = place_order(&app, Uuid::new_v4(), variant.id, 1).await;
    let orders = &app.state.services.order;

    for next in [
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
    ] {
        let updated = orders.update_order_status(order.id, next).await.unwrap();
        assert_eq!(updated.status, next);
    }

    let back = orders
        .update_order_status(order.id, OrderStatus::Pending)
        .await
        .unwrap_err();
    assert_matches!(back, ServiceError::InvalidStatusTransition { ref from, ref to }
        if from == "DELIVERED" && to == "PENDING");

    let cancel = orders
        .update_order_status(order.id, OrderStatus::Canceled)
        .await;
    assert_matches!(cancel, Err(ServiceError::InvalidStatusTransition { .. }));
    assert_eq!(app.variant(variant.id).await.stock, 9);
}

#[tokio::test]
async fn skipping_a_step_is_rejected() {
    let app = TestApp::new().await;
    let variant = app.seed_variant("SKIP", 1_000, 10).await;
    let order = place_order(&app, Uuid::new_v4(), variant.id, 1).await;

    let result = app
        .state
        .services
        .order
        .update_order_status(order.id, OrderStatus::Delivered)
        .await;
    assert_matches!(result, Err(ServiceError::InvalidStatusTransition { .. }));
}

#[tokio::test]
async fn cancellation_returns_stock_but_keeps_sales_count() {
    let app = TestApp::new().await;
    let variant = app.seed_variant("CANCEL", 1_000, 10).await;
    let user_id = Uuid::new_v4();
    let order = place_order(&app, user_id, variant.id, 4).await;
    assert_eq!(app.variant(variant.id).await.stock, 6);

    let canceled = app
        .state
        .services
        .order
        .cancel_order(user_id, order.id)
        .await
        .unwrap();

    assert_eq!(canceled.status, OrderStatus::Canceled);
    assert_eq!(canceled.amount_cents, order.amount_cents);
    assert_eq!(app.variant(variant.id).await.stock, 10);
    assert_eq!(app.sales_count(variant.product_id).await, 4);

    let again = app
        .state
        .services
        .order
        .cancel_order(user_id, order.id)
        .await;
    assert_matches!(again, Err(ServiceError::InvalidStatusTransition { .. }));
    assert_eq!(app.variant(variant.id).await.stock, 10);
}

#[tokio::test]
async fn shipped_order_can_still_be_canceled() {
    let app = TestApp::new().await;
    let variant = app.seed_variant("SHIPPED-CANCEL", 1_000, 3).await;
    let order = place_order(&app, Uuid::new_v4(), variant.id, 3).await;
    let orders = &app.state.services.order;

    orders
        .update_order_status(order.id, OrderStatus::Processing)
        .await
        .unwrap();
    orders
        .update_order_status(order.id, OrderStatus::Shipped)
        .await
        .unwrap();
    let canceled = orders
        .update_order_status(order.id, OrderStatus::Canceled)
        .await
        .unwrap();

    assert_eq!(canceled.status, OrderStatus::Canceled);
    assert_eq!(app.variant(variant.id).await.stock, 3);
}

#[tokio::test]
async fn users_only_see_their_own_orders() {
    let app = TestApp::new().await;
    let variant = app.seed_variant("PRIVATE", 1_000, 10).await;
    let owner = Uuid::new_v4();
    let stranger = Uuid::new_v4();
    let order = place_order(&app, owner, variant.id, 1).await;
    let orders = &app.state.services.order;

    let own = orders
        .get_order_for_user(order.id, owner, Role::User)
        .await
        .unwrap();
    assert_eq!(own.id, order.id);

    let foreign = orders
        .get_order_for_user(order.id, stranger, Role::User)
        .await;
    assert_matches!(foreign, Err(ServiceError::NotFound(_)));

    let admin = orders
        .get_order_for_user(order.id, stranger, Role::Admin)
        .await
        .unwrap();
    assert_eq!(admin.user_id, owner);

    let stranger_cancel = orders.cancel_order(stranger, order.id).await;
    assert_matches!(stranger_cancel, Err(ServiceError::NotFound(_)));

    assert_eq!(orders.list_orders_for_user(owner).await.unwrap().len(), 1);
    assert!(orders.list_orders_for_user(stranger).await.unwrap().is_empty());
}

#[tokio::test]
async fn admin_listing_is_paginated() {
    let app = TestApp::new().await;
    let variant = app.seed_variant("PAGES", 100, 50).await;
    for _ in 0..5 {
        place_order(&app, Uuid::new_v4(), variant.id, 1).await;
    }

    let orders = &app.state.services.order;
    let first = orders.list_orders(1, 2).await.unwrap();
    assert_eq!(first.total, 5);
    assert_eq!(first.orders.len(), 2);

    let last = orders.list_orders(3, 2).await.unwrap();
    assert_eq!(last.orders.len(), 1);

    let clamped = orders.list_orders(0, 10_000).await.unwrap();
    assert_eq!(clamped.page, 1);
    assert_eq!(clamped.per_page, 100);
    assert_eq!(clamped.orders.len(), 5);
}

#[tokio::test]
async fn deleting_an_order_keeps_stock_history() {
    let app = TestApp::new().await;
    let variant = app.seed_variant("DELETE", 1_000, 10).await;
    let user_id = Uuid::new_v4();
    let order = place_order(&app, user_id, variant.id, 2).await;
    let orders = &app.state.services.order;

    orders.delete_order(order.id).await.unwrap();

    let gone = orders
        .get_order_for_user(order.id, user_id, Role::Admin)
        .await;
    assert_matches!(gone, Err(ServiceError::NotFound(_)));
    assert_matches!(
        orders.delete_order(order.id).await,
        Err(ServiceError::NotFound(_))
    );
    assert_eq!(app.variant(variant.id).await.stock, 8);

    let history = inventory_movement::Entity::find()
        .filter(inventory_movement::Column::OrderId.eq(order.id))
        .all(&*app.state.db)
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].delta, -2);
}

//! Cart to order conversion: atomicity, price snapshots and counters.

mod common;

use assert_matches::assert_matches;
use common::TestApp;
use rust_decimal_macros::dec;
use storefront_api::entities::{commerce::CartOwner, OrderStatus};
use storefront_api::errors::ServiceError;
use uuid::Uuid;

#[tokio::test]
async fn order_captures_lines_and_clears_cart() {
    let app = TestApp::new().await;
    let shirt = app.seed_variant("CHECKOUT-SHIRT", 2_499, 10).await;
    let socks = app.seed_variant("CHECKOUT-SOCKS", 650, 10).await;
    let user_id = Uuid::new_v4();
    let owner = CartOwner::User(user_id);

    app.add_to_cart(&owner, shirt.id, 2).await;
    let cart = app.add_to_cart(&owner, socks.id, 3).await;

    let order = app
        .state
        .services
        .checkout
        .create_order_from_cart(user_id, cart.id)
        .await
        .unwrap();

    assert_eq!(order.user_id, user_id);
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.amount_cents, 2 * 2_499 + 3 * 650);
    assert_eq!(order.amount, dec!(68.48));
    assert_eq!(order.currency, "USD");
    assert_eq!(order.items.len(), 2);

    let shirt_line = order
        .items
        .iter()
        .find(|line| line.variant_id == shirt.id)
        .unwrap();
    assert_eq!(shirt_line.sku, "CHECKOUT-SHIRT");
    assert_eq!(shirt_line.quantity, 2);
    assert_eq!(shirt_line.unit_price_cents, 2_499);
    assert_eq!(shirt_line.line_total_cents, 4_998);

    assert_eq!(app.variant(shirt.id).await.stock, 8);
    assert_eq!(app.variant(socks.id).await.stock, 7);

    let after = app.state.services.cart.get_cart(&owner).await;
    assert_matches!(after, Err(ServiceError::NotFound(_)));
}

#[tokio::test]
async fn under_stocked_line_aborts_whole_order() {
    let app = TestApp::new().await;
    let plenty = app.seed_variant("ATOMIC-PLENTY", 1_000, 10).await;
    let scarce = app.seed_variant("ATOMIC-SCARCE", 1_000, 1).await;
    let user_id = Uuid::new_v4();
    let owner = CartOwner::User(user_id);

    app.add_to_cart(&owner, plenty.id, 2).await;
    let cart = app.add_to_cart(&owner, scarce.id, 3).await;

    let err = app
        .state
        .services
        .checkout
        .create_order_from_cart(user_id, cart.id)
        .await
        .unwrap_err();

    assert_matches!(err, ServiceError::InsufficientStock(ref shortages) => {
        assert_eq!(shortages.len(), 1);
        assert_eq!(shortages[0].variant_id, scarce.id);
        assert_eq!(shortages[0].available, 1);
        assert_eq!(shortages[0].requested, 3);
    });

    assert_eq!(app.variant(plenty.id).await.stock, 10);
    assert_eq!(app.variant(scarce.id).await.stock, 1);
    assert_eq!(app.sales_count(plenty.product_id).await, 0);

    let intact = app.state.services.cart.get_cart(&owner).await.unwrap();
    assert_eq!(intact.id, cart.id);
    assert_eq!(intact.quantity_of(plenty.id), Some(2));
    assert_eq!(intact.quantity_of(scarce.id), Some(3));

    let orders = app
        .state
        .services
        .order
        .list_orders_for_user(user_id)
        .await
        .unwrap();
    assert!(orders.is_empty());
}

#[tokio::test]
async fn every_short_line_is_reported() {
    let app = TestApp::new().await;
    let first = app.seed_variant("SHORT-A", 500, 0).await;
    let second = app.seed_variant("SHORT-B", 500, 1).await;
    let user_id = Uuid::new_v4();
    let owner = CartOwner::User(user_id);

    app.add_to_cart(&owner, first.id, 1).await;
    let cart = app.add_to_cart(&owner, second.id, 2).await;

    let err = app
        .state
        .services
        .checkout
        .create_order_from_cart(user_id, cart.id)
        .await
        .unwrap_err();

    assert_matches!(err, ServiceError::InsufficientStock(shortages) => {
        let mut ids: Vec<Uuid> = shortages.iter().map(|s| s.variant_id).collect();
        ids.sort();
        let mut expected = vec![first.id, second.id];
        expected.sort();
        assert_eq!(ids, expected);
    });
}

#[tokio::test]
async fn later_price_change_does_not_touch_past_orders() {
    let app = TestApp::new().await;
    let variant = app.seed_variant("SNAPSHOT", 1_999, 10).await;
    let user_id = Uuid::new_v4();
    let cart = app.add_to_cart(&CartOwner::User(user_id), variant.id, 2).await;

    let order = app
        .state
        .services
        .checkout
        .create_order_from_cart(user_id, cart.id)
        .await
        .unwrap();

    app.state
        .services
        .product_catalog
        .set_variant_price(variant.id, 5_000)
        .await
        .unwrap();

    let reread = app
        .state
        .services
        .order
        .get_order_for_user(order.id, user_id, Default::default())
        .await
        .unwrap();
    assert_eq!(reread.amount_cents, 3_998);
    assert_eq!(reread.items[0].unit_price_cents, 1_999);
    assert_eq!(reread.items[0].line_total_cents, 3_998);
    assert_eq!(app.variant(variant.id).await.price_cents, 5_000);
}

#[tokio::test]
async fn sales_count_and_stock_move_by_ordered_units() {
    let app = TestApp::new().await;
    let small = app.seed_variant("COUNT-S", 1_000, 20).await;
    let large = app
        .seed_variant_of(small.product_id, "COUNT-L", 1_200, 20)
        .await;

    let quantities = [(small.id, 2), (large.id, 3), (small.id, 4)];
    for (variant_id, quantity) in quantities {
        let user_id = Uuid::new_v4();
        let cart = app
            .add_to_cart(&CartOwner::User(user_id), variant_id, quantity)
            .await;
        app.state
            .services
            .checkout
            .create_order_from_cart(user_id, cart.id)
            .await
            .unwrap();
    }

    assert_eq!(app.sales_count(small.product_id).await, 9);
    assert_eq!(app.variant(small.id).await.stock, 20 - 6);
    assert_eq!(app.variant(large.id).await.stock, 20 - 3);
}

#[tokio::test]
async fn checkout_rejects_foreign_and_empty_carts() {
    let app = TestApp::new().await;
    let variant = app.seed_variant("FOREIGN", 1_000, 5).await;
    let owner_id = Uuid::new_v4();
    let cart = app.add_to_cart(&CartOwner::User(owner_id), variant.id, 1).await;

    let checkout = &app.state.services.checkout;
    let stranger = checkout
        .create_order_from_cart(Uuid::new_v4(), cart.id)
        .await
        .unwrap_err();
    assert_matches!(stranger, ServiceError::NotFound(_));

    let guest_cart = app
        .add_to_cart(&CartOwner::Session("sess-checkout".into()), variant.id, 1)
        .await;
    let guest = checkout
        .create_order_from_cart(owner_id, guest_cart.id)
        .await
        .unwrap_err();
    assert_matches!(guest, ServiceError::NotFound(_));

    app.state
        .services
        .cart
        .clear_cart(&CartOwner::User(owner_id))
        .await
        .unwrap();
    let empty = checkout
        .create_order_from_cart(owner_id, cart.id)
        .await
        .unwrap_err();
    assert_matches!(empty, ServiceError::ValidationError(_));

    assert_eq!(app.variant(variant.id).await.stock, 5);
}

#[tokio::test]
async fn exceeded_transaction_timeout_rolls_back() {
    let app = TestApp::with_config(|cfg| cfg.order_transaction_timeout_ms = 1).await;
    let variant = app.seed_variant("TIMEOUT", 1_000, 5).await;
    let user_id = Uuid::new_v4();
    let owner = CartOwner::User(user_id);
    let cart = app.add_to_cart(&owner, variant.id, 1).await;

    let checkout = app.state.services.checkout.clone();
    let result = checkout.create_order_from_cart(user_id, cart.id).await;

    match result {
        Err(ServiceError::TransactionAborted(_)) => {
            assert_eq!(app.variant(variant.id).await.stock, 5);
            let cart = app.state.services.cart.get_cart(&owner).await.unwrap();
            assert_eq!(cart.quantity_of(variant.id), Some(1));
        }
        // A fast machine can finish inside the budget; then the order must be whole
        Ok(order) => {
            assert_eq!(order.items.len(), 1);
            assert_eq!(app.variant(variant.id).await.stock, 4);
        }
        Err(other) => panic!("unexpected error: {other:?}"),
    }
}

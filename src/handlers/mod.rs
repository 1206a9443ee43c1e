pub mod auth;
pub mod commerce;
pub mod common;
pub mod health;
pub mod orders;

use crate::auth::AuthSessionListener;
use crate::config::AppConfig;
use crate::db::DbPool;
use crate::events::EventSender;
use crate::services::{
    commerce::{CartMergeService, CartService, CheckoutService, CheckoutSettings, ProductCatalogService},
    orders::OrderService,
};
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub product_catalog: Arc<ProductCatalogService>,
    pub cart: Arc<CartService>,
    pub cart_merge: Arc<CartMergeService>,
    pub checkout: Arc<CheckoutService>,
    pub order: Arc<OrderService>,
    /// Entry point used by the login flow
    pub session_listener: Arc<dyn AuthSessionListener>,
}

impl AppServices {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>, config: &AppConfig) -> Self {
        let product_catalog = Arc::new(ProductCatalogService::new(db_pool.clone()));
        let cart = Arc::new(CartService::new(db_pool.clone()));
        let cart_merge = Arc::new(CartMergeService::new(
            db_pool.clone(),
            event_sender.clone(),
        ));
        let checkout = Arc::new(CheckoutService::new(
            db_pool.clone(),
            event_sender.clone(),
            CheckoutSettings::from(config),
        ));
        let order = Arc::new(OrderService::new(
            db_pool,
            event_sender,
            config.api_max_page_size,
        ));

        Self {
            product_catalog,
            cart,
            session_listener: cart_merge.clone(),
            cart_merge,
            checkout,
            order,
        }
    }
}

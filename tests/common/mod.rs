#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{self, Body},
    http::{Method, Request},
    response::Response,
    Router,
};
use serde_json::Value;
use storefront_api::{
    auth::{SESSION_ID_HEADER, USER_ID_HEADER, USER_ROLE_HEADER},
    config::AppConfig,
    db,
    entities::commerce::{product_variant, CartOwner},
    events::{self, EventSender},
    services::commerce::{AddToCartInput, CartView, CreateProductInput, CreateVariantInput},
    AppState,
};
use tempfile::TempDir;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

/// Caller identity sent as gateway headers
#[derive(Debug, Clone, Default)]
pub struct Caller {
    pub user_id: Option<Uuid>,
    pub session_id: Option<String>,
    pub admin: bool,
}

impl Caller {
    pub fn user(user_id: Uuid) -> Self {
        Self {
            user_id: Some(user_id),
            ..Default::default()
        }
    }

    pub fn admin(user_id: Uuid) -> Self {
        Self {
            user_id: Some(user_id),
            admin: true,
            ..Default::default()
        }
    }

    pub fn guest(session_id: &str) -> Self {
        Self {
            session_id: Some(session_id.to_string()),
            ..Default::default()
        }
    }
}

/// Application harness backed by a throwaway SQLite file.
pub struct TestApp {
    router: Router,
    pub state: Arc<AppState>,
    _dir: TempDir,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Builds the app after letting the caller adjust the test config.
    pub async fn with_config(adjust: impl FnOnce(&mut AppConfig)) -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let db_path = dir.path().join("storefront_test.db");

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_path.display()),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.auto_migrate = true;
        cfg.cors_allow_any_origin = true;
        // Several connections so concurrent writers really contend
        cfg.db_max_connections = 8;
        cfg.db_min_connections = 1;
        adjust(&mut cfg);

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let (tx, rx) = mpsc::channel(cfg.event_channel_capacity);
        let event_task = tokio::spawn(events::process_events(rx));
        let event_sender = Arc::new(EventSender::new(tx));

        let state = Arc::new(AppState::new(Arc::new(pool), cfg, event_sender));
        let router = storefront_api::build_router(state.clone());

        Self {
            router,
            state,
            _dir: dir,
            _event_task: event_task,
        }
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        caller: &Caller,
        body: Option<Value>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user_id) = caller.user_id {
            builder = builder.header(USER_ID_HEADER, user_id.to_string());
        }
        if let Some(session_id) = &caller.session_id {
            builder = builder.header(SESSION_ID_HEADER, session_id);
        }
        if caller.admin {
            builder = builder.header(USER_ROLE_HEADER, "admin");
        }

        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .expect("request"),
            None => builder.body(Body::empty()).expect("request"),
        };

        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router response")
    }

    /// Creates a product with a single variant
    pub async fn seed_variant(&self, sku: &str, price_cents: i64, stock: i32) -> product_variant::Model {
        let catalog = &self.state.services.product_catalog;
        let product = catalog
            .create_product(CreateProductInput {
                name: format!("Product {}", sku),
            })
            .await
            .expect("product");
        self.seed_variant_of(product.id, sku, price_cents, stock).await
    }

    pub async fn seed_variant_of(
        &self,
        product_id: Uuid,
        sku: &str,
        price_cents: i64,
        stock: i32,
    ) -> product_variant::Model {
        self.state
            .services
            .product_catalog
            .create_variant(CreateVariantInput {
                product_id,
                sku: sku.to_string(),
                name: format!("Variant {}", sku),
                price_cents,
                stock,
            })
            .await
            .expect("variant")
    }

    pub async fn add_to_cart(&self, owner: &CartOwner, variant_id: Uuid, quantity: i32) -> CartView {
        self.state
            .services
            .cart
            .add_item(
                owner,
                AddToCartInput {
                    variant_id,
                    quantity,
                },
            )
            .await
            .expect("add to cart")
    }

    pub async fn variant(&self, variant_id: Uuid) -> product_variant::Model {
        self.state
            .services
            .product_catalog
            .get_variant(variant_id)
            .await
            .expect("variant exists")
    }

    pub async fn sales_count(&self, product_id: Uuid) -> i64 {
        self.state
            .services
            .product_catalog
            .get_product(product_id)
            .await
            .expect("product exists")
            .sales_count
    }
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}

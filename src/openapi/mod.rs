use axum::{response::IntoResponse, Json};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Storefront API",
        version = "1.0.0",
        description = r#"
# Storefront API

Carts, guest-to-account cart merge and checkout for a retail storefront.

## Identity

Credentials are verified by the fronting gateway, which forwards:

- `x-user-id`: authenticated user UUID
- `x-session-id`: anonymous session token
- `x-user-role`: `user` (default) or `admin`

## Errors

Every failure uses the same envelope. Checkout rejects an order for
insufficient stock with status 422 and lists each short line:

```json
{
  "error": "Unprocessable Entity",
  "message": "Insufficient stock for 1 line item(s)",
  "details": {"kind": "InsufficientStock", "shortages": [{"variant_id": "...", "available": 1, "requested": 2}]},
  "timestamp": "2026-01-01T00:00:00Z"
}
```

Status 503 means the transaction was aborted and the request may be retried.
        "#
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "cart", description = "Guest and user carts"),
        (name = "auth", description = "Post-login session hand-off"),
        (name = "orders", description = "Checkout and order history"),
        (name = "admin", description = "Administrative order management"),
        (name = "health", description = "Health check endpoints")
    ),
    paths(
        crate::handlers::health::health_check,

        crate::handlers::commerce::carts::get_cart,
        crate::handlers::commerce::carts::add_to_cart,
        crate::handlers::commerce::carts::update_cart_item,
        crate::handlers::commerce::carts::remove_cart_item,
        crate::handlers::commerce::carts::clear_cart,

        crate::handlers::auth::session_merge,

        crate::handlers::orders::create_order,
        crate::handlers::orders::list_my_orders,
        crate::handlers::orders::get_order,
        crate::handlers::orders::cancel_order,
        crate::handlers::orders::list_all_orders,
        crate::handlers::orders::update_order_status,
        crate::handlers::orders::delete_order,
    ),
    components(
        schemas(
            crate::services::commerce::CartView,
            crate::services::commerce::CartLineView,
            crate::services::commerce::CreateOrderFromCartRequest,
            crate::services::orders::OrderView,
            crate::services::orders::OrderItemView,
            crate::entities::OrderStatus,
            crate::handlers::commerce::carts::AddItemRequest,
            crate::handlers::commerce::carts::UpdateQuantityRequest,
            crate::handlers::auth::SessionMergeRequest,
            crate::handlers::orders::UpdateOrderStatusRequest,
            crate::handlers::common::PaginationMeta,
            crate::handlers::health::HealthResponse,
            crate::handlers::health::ComponentHealth,
            crate::handlers::health::ComponentStatus,

            // Error types
            crate::errors::ErrorResponse,
            crate::errors::StockShortage,
        )
    )
)]
pub struct ApiDocV1;

/// Serves the generated document as JSON
pub async fn openapi_json() -> impl IntoResponse {
    Json(ApiDocV1::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_lists_core_routes() {
        let openapi = ApiDocV1::openapi();
        let json = serde_json::to_string_pretty(&openapi).unwrap();
        assert!(json.contains("Storefront API"));
        assert!(json.contains("/api/v1/orders"));
        assert!(json.contains("/api/v1/auth/session-merge"));
        assert!(json.contains("StockShortage"));
    }
}

use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Json},
    routing::{get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::RequestIdentity,
    entities::OrderStatus,
    errors::{ApiError, ErrorResponse},
    handlers::common::{
        created_response, map_service_error, no_content_response, success_response,
        PaginatedResponse, PaginationParams,
    },
    services::{commerce::CreateOrderFromCartRequest, orders::OrderView},
    AppState,
};

/// Customer-facing order routes
pub fn orders_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(create_order).get(list_my_orders))
        .route("/:id", get(get_order))
        .route("/:id/cancel", post(cancel_order))
}

/// Administrative order routes
pub fn admin_orders_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_all_orders))
        .route("/:id", axum::routing::delete(delete_order))
        .route("/:id/status", put(update_order_status))
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
}

/// Place an order from the caller's cart
#[utoipa::path(
    post,
    path = "/api/v1/orders",
    tag = "orders",
    request_body = CreateOrderFromCartRequest,
    responses(
        (status = 201, description = "Order created; `Location` names the order", body = OrderView),
        (status = 404, description = "Cart or variant not found", body = ErrorResponse),
        (status = 422, description = "Insufficient stock; details list every short line", body = ErrorResponse),
        (status = 503, description = "Transaction aborted, safe to retry", body = ErrorResponse)
    )
)]
pub async fn create_order(
    State(state): State<Arc<AppState>>,
    identity: RequestIdentity,
    Json(payload): Json<CreateOrderFromCartRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = identity.require_user()?;
    let order = state
        .services
        .checkout
        .create_order_from_cart(user_id, payload.cart_id)
        .await
        .map_err(map_service_error)?;

    let location = format!("/api/v1/orders/{}", order.id);
    Ok(created_response(&location, order))
}

/// List the caller's orders
#[utoipa::path(
    get,
    path = "/api/v1/orders",
    tag = "orders",
    responses((status = 200, description = "Orders, newest first", body = [OrderView]))
)]
pub async fn list_my_orders(
    State(state): State<Arc<AppState>>,
    identity: RequestIdentity,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = identity.require_user()?;
    let orders = state
        .services
        .order
        .list_orders_for_user(user_id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(orders))
}

/// Get order details
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    tag = "orders",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order found", body = OrderView),
        (status = 404, description = "Order not found", body = ErrorResponse)
    )
)]
pub async fn get_order(
    State(state): State<Arc<AppState>>,
    identity: RequestIdentity,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let requester = identity.require_user()?;
    let order = state
        .services
        .order
        .get_order_for_user(id, requester, identity.role)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(order))
}

/// Cancel one of the caller's orders
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/cancel",
    tag = "orders",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order canceled and stock returned", body = OrderView),
        (status = 404, description = "Order not found", body = ErrorResponse),
        (status = 409, description = "Order is already terminal", body = ErrorResponse)
    )
)]
pub async fn cancel_order(
    State(state): State<Arc<AppState>>,
    identity: RequestIdentity,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = identity.require_user()?;
    let order = state
        .services
        .order
        .cancel_order(user_id, id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(order))
}

/// List all orders (admin)
#[utoipa::path(
    get,
    path = "/api/v1/admin/orders",
    tag = "admin",
    params(PaginationParams),
    responses(
        (status = 200, description = "Page of orders"),
        (status = 403, description = "Admin role required", body = ErrorResponse)
    )
)]
pub async fn list_all_orders(
    State(state): State<Arc<AppState>>,
    identity: RequestIdentity,
    Query(params): Query<PaginationParams>,
) -> Result<impl IntoResponse, ApiError> {
    identity.require_admin()?;
    let page = state
        .services
        .order
        .list_orders(params.page, params.per_page)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(PaginatedResponse::from(page)))
}

/// Move an order to a new status (admin)
#[utoipa::path(
    put,
    path = "/api/v1/admin/orders/{id}/status",
    tag = "admin",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = UpdateOrderStatusRequest,
    responses(
        (status = 200, description = "Status updated", body = OrderView),
        (status = 409, description = "Transition not allowed", body = ErrorResponse)
    )
)]
pub async fn update_order_status(
    State(state): State<Arc<AppState>>,
    identity: RequestIdentity,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateOrderStatusRequest>,
) -> Result<impl IntoResponse, ApiError> {
    identity.require_admin()?;
    let order = state
        .services
        .order
        .update_order_status(id, payload.status)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(order))
}

/// Delete an order (admin)
#[utoipa::path(
    delete,
    path = "/api/v1/admin/orders/{id}",
    tag = "admin",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 204, description = "Order deleted"),
        (status = 404, description = "Order not found", body = ErrorResponse)
    )
)]
pub async fn delete_order(
    State(state): State<Arc<AppState>>,
    identity: RequestIdentity,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    identity.require_admin()?;
    state
        .services
        .order
        .delete_order(id)
        .await
        .map_err(map_service_error)?;

    Ok(no_content_response())
}

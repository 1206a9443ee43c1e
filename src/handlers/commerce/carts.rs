use crate::handlers::common::{map_service_error, no_content_response, success_response, validate_input};
use crate::{
    auth::RequestIdentity,
    errors::{ApiError, ErrorResponse},
    services::commerce::cart_service::{AddToCartInput, CartView},
    AppState,
};
use axum::{
    extract::{Json, Path, State},
    routing::{get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Creates the router for cart endpoints
pub fn carts_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(get_cart).delete(clear_cart))
        .route("/items", post(add_to_cart))
        .route(
            "/items/:variant_id",
            put(update_cart_item).delete(remove_cart_item),
        )
}

/// Get the caller's cart with items
#[utoipa::path(
    get,
    path = "/api/v1/cart",
    tag = "cart",
    responses(
        (status = 200, description = "Cart with items", body = CartView),
        (status = 401, description = "No identity supplied", body = ErrorResponse),
        (status = 404, description = "Caller has no cart yet", body = ErrorResponse)
    )
)]
pub async fn get_cart(
    State(state): State<Arc<AppState>>,
    identity: RequestIdentity,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let owner = identity.cart_owner()?;
    let cart = state
        .services
        .cart
        .get_cart(&owner)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(cart))
}

/// Add item to cart
#[utoipa::path(
    post,
    path = "/api/v1/cart/items",
    tag = "cart",
    request_body = AddItemRequest,
    responses(
        (status = 200, description = "Updated cart", body = CartView),
        (status = 400, description = "Invalid quantity", body = ErrorResponse),
        (status = 404, description = "Unknown variant", body = ErrorResponse)
    )
)]
pub async fn add_to_cart(
    State(state): State<Arc<AppState>>,
    identity: RequestIdentity,
    Json(payload): Json<AddItemRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    validate_input(&payload)?;
    let owner = identity.cart_owner()?;

    let input = AddToCartInput {
        variant_id: payload.variant_id,
        quantity: payload.quantity,
    };

    let cart = state
        .services
        .cart
        .add_item(&owner, input)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(cart))
}

/// Update cart item quantity
#[utoipa::path(
    put,
    path = "/api/v1/cart/items/{variant_id}",
    tag = "cart",
    params(("variant_id" = Uuid, Path, description = "Variant in the cart")),
    request_body = UpdateQuantityRequest,
    responses(
        (status = 200, description = "Updated cart", body = CartView),
        (status = 404, description = "Line not in cart", body = ErrorResponse)
    )
)]
pub async fn update_cart_item(
    State(state): State<Arc<AppState>>,
    identity: RequestIdentity,
    Path(variant_id): Path<Uuid>,
    Json(payload): Json<UpdateQuantityRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    validate_input(&payload)?;
    let owner = identity.cart_owner()?;

    let cart = state
        .services
        .cart
        .update_item_quantity(&owner, variant_id, payload.quantity)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(cart))
}

/// Remove item from cart
#[utoipa::path(
    delete,
    path = "/api/v1/cart/items/{variant_id}",
    tag = "cart",
    params(("variant_id" = Uuid, Path, description = "Variant to remove")),
    responses(
        (status = 200, description = "Updated cart", body = CartView),
        (status = 404, description = "Line not in cart", body = ErrorResponse)
    )
)]
pub async fn remove_cart_item(
    State(state): State<Arc<AppState>>,
    identity: RequestIdentity,
    Path(variant_id): Path<Uuid>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let owner = identity.cart_owner()?;
    let cart = state
        .services
        .cart
        .remove_item(&owner, variant_id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(cart))
}

/// Clear all items from cart
#[utoipa::path(
    delete,
    path = "/api/v1/cart",
    tag = "cart",
    responses(
        (status = 204, description = "Cart emptied"),
        (status = 404, description = "Caller has no cart", body = ErrorResponse)
    )
)]
pub async fn clear_cart(
    State(state): State<Arc<AppState>>,
    identity: RequestIdentity,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let owner = identity.cart_owner()?;
    state
        .services
        .cart
        .clear_cart(&owner)
        .await
        .map_err(map_service_error)?;

    Ok(no_content_response())
}

// Request DTOs

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct AddItemRequest {
    pub variant_id: Uuid,
    #[validate(range(min = 1, max = 10000))]
    pub quantity: i32,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateQuantityRequest {
    #[validate(range(min = 0, max = 10000))]
    pub quantity: i32,
}

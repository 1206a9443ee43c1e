use axum::{
    extract::{Json, State},
    response::IntoResponse,
    routing::post,
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use utoipa::ToSchema;

use crate::{
    auth::RequestIdentity,
    errors::{ApiError, ErrorResponse},
    handlers::common::{map_service_error, success_response},
    services::commerce::CartView,
    AppState,
};

/// Body sent by the login flow once a visitor has authenticated
#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct SessionMergeRequest {
    /// Session id the visitor shopped under before logging in. Falls back to
    /// the `x-session-id` header.
    #[serde(default)]
    pub old_session_id: Option<String>,
}

pub fn auth_routes() -> Router<Arc<AppState>> {
    Router::new().route("/session-merge", post(session_merge))
}

/// Merge the pre-login guest cart into the authenticated user's cart
#[utoipa::path(
    post,
    path = "/api/v1/auth/session-merge",
    tag = "auth",
    request_body = SessionMergeRequest,
    responses(
        (status = 200, description = "Merged user cart", body = CartView),
        (status = 401, description = "Missing user identity", body = ErrorResponse),
        (status = 503, description = "Merge aborted, retry", body = ErrorResponse)
    )
)]
pub async fn session_merge(
    State(state): State<Arc<AppState>>,
    identity: RequestIdentity,
    payload: Option<Json<SessionMergeRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = identity.require_user()?;
    let Json(payload) = payload.unwrap_or_default();
    let old_session_id = payload.old_session_id.or(identity.session_id);

    let cart = state
        .services
        .session_listener
        .on_successful_authentication(old_session_id.as_deref(), user_id)
        .await
        .map_err(map_service_error)?;

    info!(%user_id, cart_id = %cart.id, "Session merged after authentication");
    Ok(success_response(cart))
}

use crate::errors::{ApiError, ServiceError};
use crate::services::orders::{OrderListResponse, OrderView};
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

pub fn success_response<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(data)).into_response()
}

/// 201 with a `Location` header pointing at the new resource
pub fn created_response<T: Serialize>(location: &str, data: T) -> Response {
    let mut response = (StatusCode::CREATED, Json(data)).into_response();
    if let Ok(value) = HeaderValue::from_str(location) {
        response.headers_mut().insert(header::LOCATION, value);
    }
    response
}

pub fn no_content_response() -> Response {
    StatusCode::NO_CONTENT.into_response()
}

/// Runs `validator` rules on a request body before it reaches a service
pub fn validate_input<T: Validate>(input: &T) -> Result<(), ApiError> {
    input
        .validate()
        .map_err(|e| ApiError::ValidationError(format!("Validation failed: {}", e)))
}

pub fn map_service_error(err: ServiceError) -> ApiError {
    ApiError::ServiceError(err)
}

/// Query string for paged admin listings. Out-of-range values are clamped
/// by the service rather than rejected.
#[derive(Debug, Deserialize, Serialize, IntoParams)]
pub struct PaginationParams {
    /// 1-based page number
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_per_page")]
    pub per_page: u64,
}

fn default_page() -> u64 {
    1
}

fn default_per_page() -> u64 {
    20
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self {
            page: default_page(),
            per_page: default_per_page(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PaginationMeta {
    pub page: u64,
    pub per_page: u64,
    pub total: u64,
    pub total_pages: u64,
}

impl PaginationMeta {
    pub fn new(page: u64, per_page: u64, total: u64) -> Self {
        let total_pages = if per_page == 0 {
            0
        } else {
            total.div_ceil(per_page)
        };
        Self {
            page,
            per_page,
            total,
            total_pages,
        }
    }
}

/// Page of results with the effective paging after clamping
#[derive(Debug, Serialize, Deserialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub pagination: PaginationMeta,
}

impl From<OrderListResponse> for PaginatedResponse<OrderView> {
    fn from(list: OrderListResponse) -> Self {
        Self {
            pagination: PaginationMeta::new(list.page, list.per_page, list.total),
            data: list.orders,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_pages_rounds_up() {
        assert_eq!(PaginationMeta::new(1, 20, 41).total_pages, 3);
        assert_eq!(PaginationMeta::new(1, 20, 40).total_pages, 2);
        assert_eq!(PaginationMeta::new(1, 20, 0).total_pages, 0);
    }

    #[test]
    fn order_list_keeps_clamped_paging() {
        let page: PaginatedResponse<OrderView> = OrderListResponse {
            orders: Vec::new(),
            total: 250,
            page: 3,
            per_page: 100,
        }
        .into();
        assert_eq!(page.pagination.page, 3);
        assert_eq!(page.pagination.per_page, 100);
        assert_eq!(page.pagination.total_pages, 3);
        assert!(page.data.is_empty());
    }

    #[test]
    fn created_response_points_at_resource() {
        let response = created_response("/api/v1/orders/42", serde_json::json!({ "id": 42 }));
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(
            response.headers().get(header::LOCATION).unwrap(),
            "/api/v1/orders/42"
        );
    }
}

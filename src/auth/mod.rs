//! Caller identity and the hand-off from authentication to the cart core.
//!
//! Credentials are verified upstream. By the time a request reaches this
//! service its identity arrives as plain headers, and the login flow reports
//! the pre-auth session id together with the authenticated user id.

use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::commerce::CartOwner;
use crate::errors::{ApiError, ServiceError};
use crate::services::commerce::{CartMergeService, CartView};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const SESSION_ID_HEADER: &str = "x-session-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// Callback invoked once a visitor has authenticated
#[async_trait]
pub trait AuthSessionListener: Send + Sync {
    async fn on_successful_authentication(
        &self,
        old_session_id: Option<&str>,
        user_id: Uuid,
    ) -> Result<CartView, ServiceError>;
}

#[async_trait]
impl AuthSessionListener for CartMergeService {
    async fn on_successful_authentication(
        &self,
        old_session_id: Option<&str>,
        user_id: Uuid,
    ) -> Result<CartView, ServiceError> {
        self.merge(old_session_id, user_id).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    pub fn is_admin(self) -> bool {
        matches!(self, Role::Admin)
    }
}

impl FromStr for Role {
    type Err = ApiError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            other => Err(ApiError::Unauthorized(format!("Unknown role '{}'", other))),
        }
    }
}

/// Identity of the caller as forwarded by the auth gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestIdentity {
    pub user_id: Option<Uuid>,
    pub session_id: Option<String>,
    pub role: Role,
}

impl RequestIdentity {
    pub fn anonymous(session_id: impl Into<String>) -> Self {
        Self {
            user_id: None,
            session_id: Some(session_id.into()),
            role: Role::User,
        }
    }

    /// Cart owner for this caller. Authenticated callers always shop with
    /// their user cart.
    pub fn cart_owner(&self) -> Result<CartOwner, ApiError> {
        match (&self.user_id, &self.session_id) {
            (Some(user_id), _) => Ok(CartOwner::User(*user_id)),
            (None, Some(session)) => Ok(CartOwner::Session(session.clone())),
            (None, None) => Err(ApiError::Unauthorized(format!(
                "Either {} or {} is required",
                USER_ID_HEADER, SESSION_ID_HEADER
            ))),
        }
    }

    pub fn require_user(&self) -> Result<Uuid, ApiError> {
        self.user_id
            .ok_or_else(|| ApiError::Unauthorized(format!("{} is required", USER_ID_HEADER)))
    }

    pub fn require_admin(&self) -> Result<Uuid, ApiError> {
        let user_id = self.require_user()?;
        if !self.role.is_admin() {
            return Err(ApiError::Forbidden("Admin role required".to_string()));
        }
        Ok(user_id)
    }
}

fn header_str<'a>(parts: &'a Parts, name: &str) -> Result<Option<&'a str>, ApiError> {
    match parts.headers.get(name) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .map(|s| Some(s.trim()).filter(|s| !s.is_empty()))
            .map_err(|_| ApiError::Unauthorized(format!("{} is not valid ASCII", name))),
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestIdentity
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = header_str(parts, USER_ID_HEADER)?
            .map(|raw| {
                Uuid::parse_str(raw).map_err(|_| {
                    ApiError::Unauthorized(format!("{} must be a UUID", USER_ID_HEADER))
                })
            })
            .transpose()?;
        let session_id = header_str(parts, SESSION_ID_HEADER)?.map(str::to_string);
        let role = header_str(parts, USER_ROLE_HEADER)?
            .map(Role::from_str)
            .transpose()?
            .unwrap_or_default();

        Ok(RequestIdentity {
            user_id,
            session_id,
            role,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use axum::http::Request;

    async fn identity_from(headers: &[(&str, &str)]) -> Result<RequestIdentity, ApiError> {
        let mut builder = Request::builder().uri("/");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        RequestIdentity::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn user_header_wins_over_session() {
        let user = Uuid::new_v4();
        let identity = identity_from(&[
            (USER_ID_HEADER, &user.to_string()),
            (SESSION_ID_HEADER, "guest-1"),
        ])
        .await
        .unwrap();
        assert_eq!(identity.cart_owner().unwrap(), CartOwner::User(user));
        assert_eq!(identity.role, Role::User);
    }

    #[tokio::test]
    async fn session_only_caller_gets_session_cart() {
        let identity = identity_from(&[(SESSION_ID_HEADER, "guest-1")]).await.unwrap();
        assert_eq!(
            identity.cart_owner().unwrap(),
            CartOwner::Session("guest-1".into())
        );
        assert_matches!(identity.require_user(), Err(ApiError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn malformed_user_id_is_rejected() {
        let result = identity_from(&[(USER_ID_HEADER, "not-a-uuid")]).await;
        assert_matches!(result, Err(ApiError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn admin_requires_role_header() {
        let user = Uuid::new_v4().to_string();
        let plain = identity_from(&[(USER_ID_HEADER, &user)]).await.unwrap();
        assert_matches!(plain.require_admin(), Err(ApiError::Forbidden(_)));

        let admin = identity_from(&[(USER_ID_HEADER, &user), (USER_ROLE_HEADER, "Admin")])
            .await
            .unwrap();
        assert!(admin.require_admin().is_ok());
    }

    #[test]
    fn empty_identity_has_no_cart() {
        let identity = RequestIdentity {
            user_id: None,
            session_id: None,
            role: Role::User,
        };
        assert_matches!(identity.cart_owner(), Err(ApiError::Unauthorized(_)));
    }
}

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use crate::auth::jwt::TokenError;
use crate::users::{ConflictField, StoreError};

/// Application-level error taxonomy. Everything a handler can fail with
/// funnels through here so the HTTP mapping lives in exactly one place.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid credentials")]
    BadCredentials,
    #[error("{0} already taken")]
    Conflict(ConflictField),
    #[error("invalid token: {0}")]
    TokenInvalid(#[from] TokenError),
    #[error("user not found")]
    UserNotFound,
    #[error("gave up after repeated concurrent update conflicts")]
    ConcurrencyConflict,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Forbidden(&'static str),
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict(field) => ApiError::Conflict(field),
            StoreError::VersionConflict => ApiError::ConcurrencyConflict,
            StoreError::NotFound => ApiError::UserNotFound,
            StoreError::Database(e) => ApiError::Internal(e.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match &self {
            // Every authentication failure collapses to the same 401 body so
            // callers cannot probe which accounts or tokens exist. The typed
            // cause still reaches the logs.
            ApiError::BadCredentials | ApiError::TokenInvalid(_) | ApiError::UserNotFound => {
                warn!(cause = %self, "authentication failed");
                (
                    StatusCode::UNAUTHORIZED,
                    "Authentication failed".to_string(),
                )
            }
            ApiError::Conflict(ConflictField::Email) => (
                StatusCode::BAD_REQUEST,
                "Email already registered".to_string(),
            ),
            ApiError::Conflict(ConflictField::Username) => {
                (StatusCode::BAD_REQUEST, "Username already taken".to_string())
            }
            ApiError::ConcurrencyConflict => {
                warn!("update retries exhausted");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Concurrent update conflict, please retry".to_string(),
                )
            }
            ApiError::NotFound(what) => (StatusCode::NOT_FOUND, format!("{what} not found")),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, (*msg).to_string()),
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::Internal(e) => {
                error!(error = %e, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let mut res = (status, Json(json!({ "detail": detail }))).into_response();
        if status == StatusCode::UNAUTHORIZED {
            res.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static("Bearer"),
            );
        }
        res
    }
}

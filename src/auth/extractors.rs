use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use tracing::warn;
use uuid::Uuid;

use super::jwt::{JwtKeys, TokenError};
use crate::{error::ApiError, state::AppState, users::User};

/// Authenticated caller, resolved from the `Authorization: Bearer` header.
/// Every failure along the way (absent header, bad token, unknown subject)
/// rejects with the same 401 body.
pub struct CurrentUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .ok_or(ApiError::TokenInvalid(TokenError::Malformed))?;

        let token = header
            .strip_prefix("Bearer ")
            .or_else(|| header.strip_prefix("bearer "))
            .ok_or(ApiError::TokenInvalid(TokenError::Malformed))?;

        let keys = JwtKeys::from_ref(state);
        let subject = keys.verify(token).map_err(|e| {
            warn!(error = %e, "token rejected");
            ApiError::TokenInvalid(e)
        })?;

        // subjects are user ids; anything else is a token we did not mint
        let user_id = Uuid::parse_str(&subject)
            .map_err(|_| ApiError::TokenInvalid(TokenError::Malformed))?;

        let user = state
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(ApiError::UserNotFound)?;

        Ok(CurrentUser(user))
    }
}

//! Bearer token authentication
//!
//! Provides the `AuthenticatedUser` extractor for Axum handlers. Tokens are
//! validated by the core `TokenHandler`; the `sub` claim names the user.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use keygate_core::{Claims, KeygateError};

use crate::db::User;
use crate::error::ApiError;
use crate::state::AppState;

/// Extract the Bearer token from the Authorization header
fn extract_bearer_token(parts: &Parts) -> Result<&str, ApiError> {
    let auth_header = parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or(KeygateError::InvalidToken)?;

    let auth_value = auth_header
        .to_str()
        .map_err(|_| KeygateError::InvalidToken)?;

    let token = auth_value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(KeygateError::InvalidToken)?;

    Ok(token)
}

/// Authenticated user extractor that validates the bearer token and resolves
/// the user it names.
///
/// Every failure, including a valid token for a user that no longer exists
/// or was deactivated, is a 401 `INVALID_TOKEN`.
pub struct AuthenticatedUser {
    pub user: User,
    pub claims: Claims,
}

impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(parts)?;
        let claims = state.tokens.validate(token)?;

        let user = state
            .users
            .find_by_username(&claims.sub)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to look up token subject");
                ApiError::internal("A database error occurred")
            })?
            .filter(|user| user.is_active)
            .ok_or_else(|| {
                tracing::warn!(user = %claims.sub, "Valid token for unknown or inactive user");
                KeygateError::InvalidToken
            })?;

        Ok(AuthenticatedUser { user, claims })
    }
}

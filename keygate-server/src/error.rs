//! API error handling module
//!
//! Provides a unified error type for all API endpoints. Core errors map to a
//! fixed status and code; clients get a generic message while the internal
//! reason is only logged.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use keygate_core::KeygateError;
use thiserror::Error;

/// API error type with structured variants for different error categories
#[derive(Debug, Error)]
pub enum ApiError {
    /// Request body parsed but failed field validation
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Login with an unknown username or a wrong password
    #[error("Incorrect username or password")]
    BadCredentials,

    /// Username or email already taken
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Internal server error - unexpected server-side failure
    #[error("Internal error: {0}")]
    Internal(String),

    /// Keygate core error - token or ceremony failure
    #[error("Keygate error: {0}")]
    Keygate(#[from] KeygateError),
}

impl ApiError {
    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a conflict error
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Create an internal server error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadCredentials => StatusCode::BAD_REQUEST,
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Keygate(ref e) => match e {
                KeygateError::InvalidToken
                | KeygateError::AuthenticationFailed(_)
                | KeygateError::ReplaySuspected { .. } => StatusCode::UNAUTHORIZED,

                KeygateError::NoChallenge
                | KeygateError::RegistrationFailed(_)
                | KeygateError::MalformedResponse(_) => StatusCode::BAD_REQUEST,

                KeygateError::UnknownCredential | KeygateError::NoCredentialsRegistered => {
                    StatusCode::NOT_FOUND
                }

                KeygateError::CredentialExists => StatusCode::CONFLICT,

                KeygateError::TokenIssue(_)
                | KeygateError::Storage(_)
                | KeygateError::Crypto(_)
                | KeygateError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    /// Get the error code for programmatic error handling
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::BadCredentials => "BAD_CREDENTIALS",
            Self::Conflict(_) => "USER_EXISTS",
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::Keygate(ref e) => match e {
                KeygateError::InvalidToken => "INVALID_TOKEN",
                KeygateError::NoChallenge => "NO_CHALLENGE",
                KeygateError::RegistrationFailed(_) => "REGISTRATION_FAILED",
                KeygateError::AuthenticationFailed(_) | KeygateError::ReplaySuspected { .. } => {
                    "AUTHENTICATION_FAILED"
                }
                KeygateError::UnknownCredential => "INVALID_CREDENTIAL",
                KeygateError::NoCredentialsRegistered => "CREDENTIALS_NOT_FOUND",
                KeygateError::CredentialExists => "CREDENTIAL_EXISTS",
                KeygateError::MalformedResponse(_) => "INVALID_INPUT",
                KeygateError::TokenIssue(_)
                | KeygateError::Storage(_)
                | KeygateError::Crypto(_)
                | KeygateError::Config(_) => "INTERNAL_ERROR",
            },
        }
    }

    /// Get sanitized error message for client response
    fn client_message(&self) -> String {
        match self {
            Self::Keygate(ref e) => match e {
                KeygateError::InvalidToken => "Could not validate credentials",
                KeygateError::NoChallenge => "No ceremony in progress or challenge expired",
                KeygateError::RegistrationFailed(_) => "Credential registration failed",
                KeygateError::AuthenticationFailed(_) | KeygateError::ReplaySuspected { .. } => {
                    "Authentication failed"
                }
                KeygateError::UnknownCredential => "Invalid credential",
                KeygateError::NoCredentialsRegistered => "No credentials registered",
                KeygateError::CredentialExists => "Credential already registered",
                KeygateError::MalformedResponse(_) => "Malformed ceremony response",
                KeygateError::TokenIssue(_)
                | KeygateError::Storage(_)
                | KeygateError::Crypto(_)
                | KeygateError::Config(_) => "Internal server error",
            }
            .to_string(),
            Self::Internal(_) => "Internal server error".to_string(),
            // Validation and conflict reasons describe the caller's own input
            _ => self.to_string(),
        }
    }

    /// Get the error category for logging
    fn error_category(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::BadCredentials => "bad_credentials",
            Self::Conflict(_) => "conflict",
            Self::Internal(_) => "internal",
            Self::Keygate(_) => "keygate",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let category = self.error_category();
        let code = self.error_code();
        let internal_message = self.to_string();
        let client_message = self.client_message();

        // Log based on severity, always including internal details
        if status.is_server_error() {
            tracing::error!(
                status = %status,
                category = category,
                code = code,
                error = %internal_message,
                "Server error"
            );
        } else if status == StatusCode::UNAUTHORIZED {
            tracing::warn!(
                status = %status,
                category = category,
                code = code,
                error = %internal_message,
                "Authentication error"
            );
        } else {
            tracing::warn!(
                status = %status,
                category = category,
                code = code,
                error = %internal_message,
                "Client error"
            );
        }

        // All error responses include a `code` field for programmatic error handling
        let body = serde_json::json!({
            "error": client_message,
            "code": code,
        });

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(err: KeygateError) -> (StatusCode, &'static str) {
        let api = ApiError::from(err);
        (api.status_code(), api.error_code())
    }

    #[test]
    fn test_core_error_mapping() {
        assert_eq!(
            mapping(KeygateError::InvalidToken),
            (StatusCode::UNAUTHORIZED, "INVALID_TOKEN")
        );
        assert_eq!(
            mapping(KeygateError::NoChallenge),
            (StatusCode::BAD_REQUEST, "NO_CHALLENGE")
        );
        assert_eq!(
            mapping(KeygateError::RegistrationFailed("x".into())),
            (StatusCode::BAD_REQUEST, "REGISTRATION_FAILED")
        );
        assert_eq!(
            mapping(KeygateError::AuthenticationFailed("x".into())),
            (StatusCode::UNAUTHORIZED, "AUTHENTICATION_FAILED")
        );
        assert_eq!(
            mapping(KeygateError::ReplaySuspected { stored: 5, reported: 5 }),
            (StatusCode::UNAUTHORIZED, "AUTHENTICATION_FAILED")
        );
        assert_eq!(
            mapping(KeygateError::UnknownCredential),
            (StatusCode::NOT_FOUND, "INVALID_CREDENTIAL")
        );
        assert_eq!(
            mapping(KeygateError::NoCredentialsRegistered),
            (StatusCode::NOT_FOUND, "CREDENTIALS_NOT_FOUND")
        );
        assert_eq!(
            mapping(KeygateError::CredentialExists),
            (StatusCode::CONFLICT, "CREDENTIAL_EXISTS")
        );
        assert_eq!(
            mapping(KeygateError::MalformedResponse("x".into())),
            (StatusCode::BAD_REQUEST, "INVALID_INPUT")
        );
        for err in [
            KeygateError::Storage("db down".into()),
            KeygateError::Crypto("x".into()),
            KeygateError::Config("x".into()),
        ] {
            assert_eq!(mapping(err), (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"));
        }
    }

    #[test]
    fn test_internal_reason_not_exposed() {
        let err = ApiError::from(KeygateError::Storage("connection refused to 10.0.0.5".into()));
        assert_eq!(err.client_message(), "Internal server error");

        let err = ApiError::from(KeygateError::ReplaySuspected { stored: 7, reported: 3 });
        assert_eq!(err.client_message(), "Authentication failed");
    }

    #[test]
    fn test_bad_credentials() {
        let err = ApiError::BadCredentials;
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.client_message(), "Incorrect username or password");
    }
}

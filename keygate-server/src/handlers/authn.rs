//! WebAuthn ceremony handlers
//!
//! Each ceremony runs for the bearer token's user. The `begin` endpoint
//! stores a challenge under the caller's ceremony session cookie and returns
//! the options for `navigator.credentials`; the matching `finish` endpoint
//! decodes the browser's response and verifies it against that challenge.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use keygate_core::{
    AuthenticationCredentialJson, AuthenticationOptions, AuthenticationResponse, KeygateError,
    RegistrationCredentialJson, RegistrationOptions, RegistrationResponse,
};

use crate::auth::AuthenticatedUser;
use crate::error::ApiError;
use crate::handlers::auth::MessageResponse;
use crate::session::CeremonySession;
use crate::state::AppState;

/// Unwrap a JSON body, turning any rejection into a malformed response error
fn ceremony_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    body.map(|Json(value)| value)
        .map_err(|rejection| KeygateError::MalformedResponse(rejection.body_text()).into())
}

/// Start registering a new credential for the current user.
/// Returns `PublicKeyCredentialCreationOptions`.
#[utoipa::path(
    get,
    path = "/api/v1/authn/register/public_key",
    tag = "WebAuthn",
    responses(
        (status = 200, description = "Registration options (PublicKeyCredentialCreationOptions JSON)"),
        (status = 401, description = "Missing or invalid bearer token")
    ),
    security(
        ("bearer_token" = [])
    )
)]
pub async fn register_options_handler(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    session: CeremonySession,
) -> Result<Json<RegistrationOptions>, ApiError> {
    let session_id = session.start().await?;
    let options = state
        .verifier
        .begin_registration(&session_id, &auth.user.identity())
        .await?;
    Ok(Json(options))
}

/// Finish registration.
///
/// Request body is the `PublicKeyCredential` returned by `navigator.credentials.create()`.
#[utoipa::path(
    post,
    path = "/api/v1/authn/register",
    tag = "WebAuthn",
    request_body(content_type = "application/json", description = "WebAuthn registration response from browser"),
    responses(
        (status = 201, description = "Credential registered", body = MessageResponse),
        (status = 400, description = "No outstanding challenge, malformed or rejected response"),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 409, description = "Credential already registered")
    ),
    security(
        ("bearer_token" = [])
    )
)]
pub async fn register_handler(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    session: CeremonySession,
    body: Result<Json<RegistrationCredentialJson>, JsonRejection>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    let session_id = session.resume().await?;
    let response = RegistrationResponse::try_from(ceremony_body(body)?)?;

    let credential = state
        .verifier
        .finish_registration(&session_id, &auth.user.identity(), &response)
        .await?;

    tracing::info!(
        user = %auth.user.username,
        credential_id = %credential.id_base64url(),
        counter = credential.signature_counter,
        "Registered WebAuthn credential"
    );
    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::new("User credential created")),
    ))
}

/// Start authenticating the current user with one of their credentials.
/// Returns `PublicKeyCredentialRequestOptions`.
#[utoipa::path(
    get,
    path = "/api/v1/authn/auth/public_key",
    tag = "WebAuthn",
    responses(
        (status = 200, description = "Authentication options (PublicKeyCredentialRequestOptions JSON)"),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 404, description = "No credentials registered")
    ),
    security(
        ("bearer_token" = [])
    )
)]
pub async fn auth_options_handler(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    session: CeremonySession,
) -> Result<Json<AuthenticationOptions>, ApiError> {
    let session_id = session.start().await?;
    let options = state
        .verifier
        .begin_authentication(&session_id, &auth.user.identity())
        .await?;
    Ok(Json(options))
}

/// Finish authentication.
///
/// Request body is the `PublicKeyCredential` returned by `navigator.credentials.get()`.
#[utoipa::path(
    post,
    path = "/api/v1/authn/auth",
    tag = "WebAuthn",
    request_body(content_type = "application/json", description = "WebAuthn assertion from browser"),
    responses(
        (status = 200, description = "Assertion verified", body = MessageResponse),
        (status = 400, description = "No outstanding challenge or malformed response"),
        (status = 401, description = "Invalid token, bad signature or replayed counter"),
        (status = 404, description = "Unknown credential")
    ),
    security(
        ("bearer_token" = [])
    )
)]
pub async fn auth_handler(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    session: CeremonySession,
    body: Result<Json<AuthenticationCredentialJson>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let session_id = session.resume().await?;
    let response = AuthenticationResponse::try_from(ceremony_body(body)?)?;

    state
        .verifier
        .finish_authentication(&session_id, &auth.user.identity(), &response)
        .await?;

    tracing::info!(user = %auth.user.username, "WebAuthn assertion verified");
    Ok(Json(MessageResponse::new("OK")))
}

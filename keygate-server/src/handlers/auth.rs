//! Password login handlers
//!
//! Account creation, token issuance and the current-user profile.

use axum::{extract::State, http::StatusCode, Form, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::AuthenticatedUser;
use crate::db::{NewUser, UserResponse};
use crate::error::ApiError;
use crate::state::AppState;
use crate::validation::{validate_email, validate_name, validate_password, validate_username};

/// Request for creating an account
#[derive(Debug, Deserialize, ToSchema)]
pub struct SignupRequest {
    #[schema(example = "alice")]
    pub username: String,
    #[schema(example = "alice@example.com")]
    pub email: String,
    #[schema(example = "correct horse battery staple")]
    pub password: String,
    #[serde(default)]
    #[schema(example = "Alice")]
    pub first_name: Option<String>,
    #[serde(default)]
    #[schema(example = "Liddell")]
    pub last_name: Option<String>,
}

/// Plain message response
#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Login form (`application/x-www-form-urlencoded`)
#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

/// Issued bearer token
#[derive(Debug, Serialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    #[schema(example = "bearer")]
    pub token_type: String,
}

/// Create a user account
#[utoipa::path(
    post,
    path = "/api/v1/auth/signup",
    tag = "Auth",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "User created", body = MessageResponse),
        (status = 409, description = "Username or email already registered"),
        (status = 422, description = "Invalid signup data")
    )
)]
pub async fn signup_handler(
    State(state): State<AppState>,
    Json(request): Json<SignupRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    let username = request.username.trim().to_string();
    let email = request.email.trim().to_lowercase();

    validate_username(&username)?;
    validate_email(&email)?;
    validate_password(&request.password)?;
    validate_name("first_name", request.first_name.as_deref())?;
    validate_name("last_name", request.last_name.as_deref())?;

    let passwords = state.passwords.clone();
    let password = request.password;
    let hashed_password = tokio::task::spawn_blocking(move || passwords.hash(&password))
        .await
        .map_err(|e| ApiError::internal(format!("Password hashing task failed: {}", e)))??;

    let created = state
        .users
        .create(NewUser {
            username,
            email,
            hashed_password,
            first_name: request.first_name,
            last_name: request.last_name,
        })
        .await
        .map_err(keygate_core::KeygateError::from)?;

    if created.is_none() {
        return Err(ApiError::conflict("Username or email already registered"));
    }

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::new("Created user successfully!")),
    ))
}

/// Exchange username and password for a bearer token
#[utoipa::path(
    post,
    path = "/api/v1/auth/token",
    tag = "Auth",
    request_body(content = LoginForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Token issued", body = TokenResponse),
        (status = 400, description = "Incorrect username or password")
    )
)]
pub async fn token_handler(
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> Result<Json<TokenResponse>, ApiError> {
    let user = state
        .users
        .find_by_username(&form.username)
        .await
        .map_err(keygate_core::KeygateError::from)?;

    // Unknown users still pay for one Argon2 pass so timing does not reveal them
    let user = user.filter(|u| u.is_active);
    let passwords = state.passwords.clone();
    let stored_hash = user.as_ref().map(|u| u.hashed_password.clone());
    let password = form.password;
    let valid = tokio::task::spawn_blocking(move || match stored_hash {
        Some(stored_hash) => passwords.verify(&password, &stored_hash),
        None => passwords.verify_absent(&password),
    })
    .await
    .map_err(|e| ApiError::internal(format!("Password verification task failed: {}", e)))?;

    let Some(user) = user else {
        tracing::info!(user = %form.username, "Login for unknown or inactive user");
        return Err(ApiError::BadCredentials);
    };
    if !valid {
        tracing::info!(user = %user.username, "Login with wrong password");
        return Err(ApiError::BadCredentials);
    }

    let access_token = state
        .tokens
        .issue(&user.username, state.tokens.default_ttl(), None)?;

    tracing::info!(user = %user.username, "Issued access token");
    Ok(Json(TokenResponse {
        access_token,
        token_type: "bearer".to_string(),
    }))
}

/// Current user profile
#[utoipa::path(
    get,
    path = "/api/v1/auth/me",
    tag = "Auth",
    responses(
        (status = 200, description = "Current user", body = UserResponse),
        (status = 401, description = "Missing or invalid bearer token")
    ),
    security(
        ("bearer_token" = [])
    )
)]
pub async fn me_handler(auth: AuthenticatedUser) -> Json<UserResponse> {
    Json(UserResponse::from(auth.user))
}

//! Router configuration module
//!
//! Configures all routes, middleware layers, and creates the application router.

use std::{sync::Arc, time::Duration};

use axum::{
    http::{header, Method, StatusCode},
    routing::{get, post},
    Router,
};
use keygate_core::KeygateError;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tower_sessions::cookie::SameSite;
use tower_sessions::{Expiry, SessionManagerLayer};

use crate::config::Config;
use crate::handlers::{
    auth_handler, auth_options_handler, health, me_handler, ready, register_handler,
    register_options_handler, signup_handler, token_handler,
};
use crate::openapi::openapi_json;
use crate::session;
use crate::state::AppState;

/// Create the application router with default config and in-memory state (for testing)
pub fn create_router() -> Result<Router, KeygateError> {
    let config = Config::default();
    let state = AppState::in_memory(&config)?;
    create_router_with_state(&config, state)
}

/// Create the application router with custom configuration
pub fn create_router_with_state(config: &Config, state: AppState) -> Result<Router, KeygateError> {
    // Configure CORS based on allowed_origins
    let cors = match &config.allowed_origins {
        Some(origins) if !origins.is_empty() => {
            let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
            tracing::info!("CORS: Restricting to {} origin(s)", origins.len());
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([header::CONTENT_TYPE, header::ACCEPT, header::AUTHORIZATION])
                .allow_credentials(true)
        }
        _ => {
            tracing::warn!("CORS: Allowing all origins (dev mode)");
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    };

    // Request body limit
    let body_limit = RequestBodyLimitLayer::new(config.body_limit_kb * 1024);

    // Request timeout
    let timeout = TimeoutLayer::with_status_code(
        StatusCode::REQUEST_TIMEOUT,
        Duration::from_secs(config.timeout_secs),
    );

    // Ceremony session cookie, signed with a key derived from the server secret
    let session_ttl = i64::try_from(config.challenge_ttl_secs).unwrap_or(i64::MAX);
    let sessions = SessionManagerLayer::new(state.sessions.clone())
        .with_name(config.session_cookie_name.clone())
        .with_same_site(SameSite::Strict)
        .with_secure(true)
        .with_http_only(true)
        .with_expiry(Expiry::OnInactivity(time::Duration::seconds(session_ttl)))
        .with_signed(session::cookie_key(&state.keys)?);

    let api = Router::new()
        .route("/auth/signup", post(signup_handler))
        .route("/auth/token", post(token_handler))
        .route("/auth/me", get(me_handler))
        .route("/authn/register/public_key", get(register_options_handler))
        .route("/authn/register", post(register_handler))
        .route("/authn/auth/public_key", get(auth_options_handler))
        .route("/authn/auth", post(auth_handler));

    // Base router with common layers
    let router = Router::new()
        .nest("/api/v1", api)
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/api-docs/openapi.json", get(openapi_json))
        .with_state(state)
        .layer(sessions)
        .layer(cors)
        .layer(body_limit)
        .layer(timeout);

    // Conditionally apply rate limiting (disabled in tests, enabled in production)
    if config.rate_limit_enabled {
        let governor_conf = GovernorConfigBuilder::default()
            .per_second(config.rate_limit_per_sec)
            .burst_size(config.rate_limit_burst)
            .finish()
            .ok_or_else(|| KeygateError::Config("invalid rate limiter settings".into()))?;

        tracing::info!(
            "Rate limiting: {} req/s (burst: {})",
            config.rate_limit_per_sec,
            config.rate_limit_burst
        );

        Ok(router
            .layer(GovernorLayer::new(Arc::new(governor_conf)))
            .layer(TraceLayer::new_for_http()))
    } else {
        tracing::warn!("Rate limiting: DISABLED");
        Ok(router.layer(TraceLayer::new_for_http()))
    }
}

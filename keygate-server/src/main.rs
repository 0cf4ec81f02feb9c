//! Keygate Server - password login and WebAuthn second factor over HTTP
//!
//! Endpoints:
//! - POST /api/v1/auth/signup, /api/v1/auth/token; GET /api/v1/auth/me
//! - GET /api/v1/authn/register/public_key, POST /api/v1/authn/register
//! - GET /api/v1/authn/auth/public_key, POST /api/v1/authn/auth
//! - GET /health, /ready, /api-docs/openapi.json

use std::net::SocketAddr;
use std::time::Duration;

use keygate_server::{create_router_with_state, AppState, Config};
use tower_sessions::session_store::ExpiredDeletion;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How often abandoned ceremony challenges and sessions are swept
const CHALLENGE_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,keygate_server=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    tracing::info!(?config, "Configuration loaded");

    let state = AppState::new(&config).await?;

    let challenges = state.challenges.clone();
    let sessions = state.sessions.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CHALLENGE_CLEANUP_INTERVAL);
        loop {
            interval.tick().await;
            let removed = challenges.cleanup_expired();
            if removed > 0 {
                tracing::debug!(
                    removed,
                    pending = challenges.pending(),
                    "Expired ceremony challenges removed"
                );
            }
            if let Err(e) = sessions.delete_expired().await {
                tracing::error!(error = %e, "Session cleanup failed");
            }
        }
    });

    let app = create_router_with_state(&config, state)?;

    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Keygate server listening");

    // Peer addresses are needed by the rate limiter's key extractor
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

//! Database module for Keygate Server
//!
//! PostgreSQL connection pool, migrations and the repositories built on it.
//! Without `DATABASE_URL` the server runs on in-memory repositories instead.

pub mod credential;
pub mod user;

pub use credential::PostgresCredentialRepository;
pub use user::{NewUser, User, UserRepository, UserResponse};

use keygate_core::KeygateError;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::config::Config;

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database connection error: {0}")]
    Connection(String),

    #[error("Database migration error: {0}")]
    Migration(String),

    #[error("Query error: {0}")]
    Query(String),
}

impl From<StorageError> for KeygateError {
    fn from(err: StorageError) -> Self {
        KeygateError::Storage(err.to_string())
    }
}

/// Connect to PostgreSQL with the configured pool bounds
pub async fn connect(database_url: &str, config: &Config) -> Result<PgPool, StorageError> {
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .min_connections(config.database_min_connections)
        .connect(database_url)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

    tracing::info!(
        max_connections = config.database_max_connections,
        "Connected to PostgreSQL database"
    );
    Ok(pool)
}

/// Run database migrations
pub async fn migrate(pool: &PgPool) -> Result<(), StorageError> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| StorageError::Migration(e.to_string()))?;

    tracing::info!("Database migrations completed");
    Ok(())
}

/// Check database connection health
pub async fn check_health(pool: &PgPool) -> Result<(), StorageError> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;
    Ok(())
}

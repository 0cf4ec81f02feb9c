//! Keygate Server Library - REST API for password login and WebAuthn ceremonies
//!
//! This library exposes the server components for use in integration tests.
//! The main binary uses these same components.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod openapi;
pub mod routes;
pub mod session;
pub mod state;
pub mod validation;

pub use auth::AuthenticatedUser;
pub use config::{Config, ConfigError};
pub use db::{
    NewUser, PostgresCredentialRepository, StorageError, User, UserRepository, UserResponse,
};
pub use error::ApiError;
pub use openapi::ApiDoc;
pub use routes::{create_router, create_router_with_state};
pub use session::CeremonySession;
pub use state::AppState;

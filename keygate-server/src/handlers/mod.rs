//! HTTP request handlers
//!
//! This module contains all the request handlers for the API endpoints.

pub mod auth;
pub mod authn;
pub mod health;

pub use auth::{
    me_handler, signup_handler, token_handler, LoginForm, MessageResponse, SignupRequest,
    TokenResponse,
};
pub use authn::{auth_handler, auth_options_handler, register_handler, register_options_handler};
pub use health::{health, ready, HealthResponse, ReadyResponse};

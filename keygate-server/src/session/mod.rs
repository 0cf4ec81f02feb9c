//! Ceremony session cookie
//!
//! A signed `tower-sessions` cookie carries a random ceremony session id.
//! The challenge store is keyed by that id, so a `finish_*` call only sees
//! the challenge issued to the same browser.

pub mod store;

pub use store::{MemorySessionStore, SessionBackend};

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use keygate_core::{KeyMaterial, KeygateError};
use tower_sessions::cookie::Key;
use tower_sessions::Session;
use uuid::Uuid;

use crate::error::ApiError;

/// Session key holding the ceremony session id
pub const CEREMONY_SESSION_KEY: &str = "ceremony_sid";

/// Label for deriving the cookie signing key from the server secret
const COOKIE_KEY_LABEL: &str = "keygate/session-cookie";

/// Derive the cookie signing key from the server secret
pub fn cookie_key(keys: &KeyMaterial) -> Result<Key, KeygateError> {
    let derived = keys.derive_key(COOKIE_KEY_LABEL);
    Key::try_from(derived.as_slice())
        .map_err(|e| KeygateError::Crypto(format!("session key derivation failed: {}", e)))
}

/// Access to the ceremony session id of the current request
pub struct CeremonySession {
    session: Session,
}

impl CeremonySession {
    /// Return the caller's ceremony session id, creating one if needed
    pub async fn start(&self) -> Result<String, ApiError> {
        if let Some(id) = self.current_id().await? {
            return Ok(id);
        }

        let id = Uuid::new_v4().simple().to_string();
        self.session
            .insert(CEREMONY_SESSION_KEY, &id)
            .await
            .map_err(|e| ApiError::internal(format!("Session error: {}", e)))?;
        tracing::debug!("Started ceremony session");
        Ok(id)
    }

    /// Return the existing ceremony session id.
    ///
    /// Without one there can be no outstanding challenge.
    pub async fn resume(&self) -> Result<String, ApiError> {
        self.current_id()
            .await?
            .ok_or_else(|| KeygateError::NoChallenge.into())
    }

    async fn current_id(&self) -> Result<Option<String>, ApiError> {
        self.session
            .get::<String>(CEREMONY_SESSION_KEY)
            .await
            .map_err(|e| ApiError::internal(format!("Session error: {}", e)))
    }
}

impl<S> FromRequestParts<S> for CeremonySession
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session = Session::from_request_parts(parts, state)
            .await
            .map_err(|(_, message)| ApiError::internal(message))?;
        Ok(Self { session })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(secret: &[u8]) -> KeyMaterial {
        let algorithm = KeyMaterial::parse_algorithm("HS256").unwrap();
        KeyMaterial::new(secret, algorithm).unwrap()
    }

    #[test]
    fn test_cookie_key_is_deterministic() {
        let a = cookie_key(&keys(&[7u8; 32])).unwrap();
        let b = cookie_key(&keys(&[7u8; 32])).unwrap();
        assert_eq!(a.master(), b.master());
    }

    #[test]
    fn test_cookie_key_depends_on_secret() {
        let a = cookie_key(&keys(&[7u8; 32])).unwrap();
        let b = cookie_key(&keys(&[8u8; 32])).unwrap();
        assert_ne!(a.master(), b.master());
    }
}

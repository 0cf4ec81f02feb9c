//! WebAuthn registration and authentication ceremonies
//!
//! Each ceremony has two halves. `begin_*` stores a fresh challenge for the
//! caller's session and returns the options the browser needs; `finish_*`
//! takes that challenge back and verifies the authenticator's response
//! against it:
//!
//! 1. client data type, challenge and origin
//! 2. relying party id hash and user-present flag
//! 3. attestation statement (registration) or assertion signature
//!    and signature counter (authentication)
//!
//! Verified state is committed through the [`CredentialRepository`].

mod attestation;
mod authentication;
mod authenticator_data;
mod client_data;
pub mod cose;
pub mod options;
mod registration;

use std::sync::Arc;

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use url::Url;

use crate::challenge::{Challenge, ChallengeStore};
use crate::credential::CredentialRepository;
use crate::error::{KeygateError, Result};
use crate::wire;

pub use attestation::AttestationFormat;
pub use options::{AuthenticationOptions, RegistrationOptions, DEFAULT_TIMEOUT_MS};

use authenticator_data::AuthenticatorData;
use client_data::CollectedClientData;

/// The relying party this server acts as.
#[derive(Debug, Clone)]
pub struct RelyingParty {
    pub id: String,
    pub name: String,
    /// Exact origin expected in client data, e.g. `https://example.com`.
    pub origin: String,
    id_hash: [u8; 32],
}

impl RelyingParty {
    pub fn new(id: impl Into<String>, name: impl Into<String>, origin: impl Into<String>) -> Result<Self> {
        let id = id.into();
        let origin = origin.into();

        if id.is_empty() {
            return Err(KeygateError::Config("relying party id must not be empty".into()));
        }

        let url = Url::parse(&origin)
            .map_err(|e| KeygateError::Config(format!("invalid origin '{}': {}", origin, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(KeygateError::Config(format!("origin '{}' must use http or https", origin)));
        }
        if url.origin().ascii_serialization() != origin {
            return Err(KeygateError::Config(format!(
                "origin '{}' must be scheme://host[:port] with no path",
                origin
            )));
        }
        let host = url.host_str().unwrap_or_default();
        if host != id && !host.ends_with(&format!(".{}", id)) {
            return Err(KeygateError::Config(format!(
                "relying party id '{}' is not a suffix of origin host '{}'",
                id, host
            )));
        }

        let id_hash = Sha256::digest(id.as_bytes()).into();
        Ok(Self {
            id,
            name: name.into(),
            origin,
            id_hash,
        })
    }

    pub fn id_hash(&self) -> &[u8; 32] {
        &self.id_hash
    }
}

/// The user a ceremony runs for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    /// Stable identifier; becomes the credential owner and the user handle.
    pub id: String,
    pub name: String,
    pub display_name: String,
}

/// Runs both ceremonies for one relying party.
pub struct CeremonyVerifier {
    rp: RelyingParty,
    challenges: Arc<dyn ChallengeStore>,
    credentials: Arc<dyn CredentialRepository>,
    timeout_ms: u64,
}

impl CeremonyVerifier {
    pub fn new(
        rp: RelyingParty,
        challenges: Arc<dyn ChallengeStore>,
        credentials: Arc<dyn CredentialRepository>,
    ) -> Self {
        Self {
            rp,
            challenges,
            credentials,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn relying_party(&self) -> &RelyingParty {
        &self.rp
    }

    /// Type, challenge and origin binding of the client data.
    fn check_client_data(
        &self,
        client_data: &CollectedClientData,
        expected_type: &str,
        challenge: &Challenge,
    ) -> std::result::Result<(), String> {
        if client_data.ceremony_type != expected_type {
            return Err(format!(
                "client data type is '{}', expected '{}'",
                client_data.ceremony_type, expected_type
            ));
        }

        let echoed = wire::decode("client data challenge", &client_data.challenge)
            .map_err(|e| e.to_string())?;
        if !challenge.matches(&echoed) {
            return Err("challenge mismatch".into());
        }

        if client_data.origin != self.rp.origin {
            return Err(format!("unexpected origin '{}'", client_data.origin));
        }

        if client_data.cross_origin == Some(true) {
            tracing::debug!(origin = %client_data.origin, "Ceremony ran in a cross-origin frame");
        }

        Ok(())
    }

    /// Relying party binding and user presence.
    fn check_authenticator_data(&self, auth_data: &AuthenticatorData<'_>) -> std::result::Result<(), String> {
        if !bool::from(auth_data.rp_id_hash.ct_eq(self.rp.id_hash.as_slice())) {
            return Err("relying party id hash mismatch".into());
        }
        if !auth_data.user_present() {
            return Err("user presence flag not set".into());
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::challenge::MemoryChallengeStore;
    use crate::credential::MemoryCredentialRepository;

    pub const RP_ID: &str = "localhost";
    pub const ORIGIN: &str = "http://localhost:8000";
    pub const SESSION: &str = "session-1";

    pub fn alice() -> UserIdentity {
        UserIdentity {
            id: "6f1c2d3e-0000-4000-8000-000000000001".into(),
            name: "alice".into(),
            display_name: "Alice Liddell".into(),
        }
    }

    pub fn bob() -> UserIdentity {
        UserIdentity {
            id: "6f1c2d3e-0000-4000-8000-000000000002".into(),
            name: "bob".into(),
            display_name: "Bob".into(),
        }
    }

    pub fn verifier_with(
        credentials: Arc<dyn CredentialRepository>,
    ) -> CeremonyVerifier {
        let rp = RelyingParty::new(RP_ID, "Keygate", ORIGIN).unwrap();
        CeremonyVerifier::new(rp, Arc::new(MemoryChallengeStore::new()), credentials)
    }

    pub fn verifier() -> (CeremonyVerifier, Arc<MemoryCredentialRepository>) {
        let repo = Arc::new(MemoryCredentialRepository::new());
        (verifier_with(repo.clone()), repo)
    }
}

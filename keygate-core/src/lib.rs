//! Keygate Core - token and WebAuthn ceremony primitives
//!
//! This crate holds everything that decides whether a caller is who they
//! claim to be, with no HTTP or database code:
//!
//! - Signed bearer tokens (HS256/384/512) with issuer and audience binding
//! - Argon2id password hashing keyed by the server secret
//! - Single-use WebAuthn challenges with expiry
//! - Registration and authentication ceremony verification (ES256, EdDSA;
//!   `none` and self-attested `packed` statements)
//! - Signature counter anti-replay through a pluggable credential repository
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use keygate_core::{
//!     CeremonyVerifier, MemoryChallengeStore, MemoryCredentialRepository, RelyingParty,
//!     UserIdentity,
//! };
//!
//! # async fn example() -> keygate_core::Result<()> {
//! let rp = RelyingParty::new("localhost", "Keygate", "http://localhost:8000")?;
//! let verifier = CeremonyVerifier::new(
//!     rp,
//!     Arc::new(MemoryChallengeStore::new()),
//!     Arc::new(MemoryCredentialRepository::new()),
//! );
//!
//! let user = UserIdentity {
//!     id: "0b6c7a52-1f7e-4d7e-9c55-8d3f2a1b0c9d".into(),
//!     name: "alice".into(),
//!     display_name: "Alice".into(),
//! };
//!
//! // Send these to navigator.credentials.create(), then pass the decoded
//! // response to finish_registration with the same session id.
//! let options = verifier.begin_registration("session-id", &user).await?;
//! # let _ = options;
//! # Ok(())
//! # }
//! ```

pub mod ceremony;
pub mod challenge;
pub mod credential;
pub mod error;
pub mod keys;
pub mod password;
pub mod token;
pub mod wire;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

// Re-export main types for convenience
pub use ceremony::{
    AttestationFormat, AuthenticationOptions, CeremonyVerifier, RegistrationOptions,
    RelyingParty, UserIdentity,
};
pub use challenge::{
    CeremonyPurpose, Challenge, ChallengeStore, MemoryChallengeStore, DEFAULT_CHALLENGE_TTL,
};
pub use credential::{Credential, CredentialRepository, MemoryCredentialRepository};
pub use error::{KeygateError, Result};
pub use keys::KeyMaterial;
pub use password::PasswordHasher;
pub use token::{Claims, TokenContext, TokenHandler};
pub use wire::{
    AuthenticationCredentialJson, AuthenticationResponse, RegistrationCredentialJson,
    RegistrationResponse,
};

//! Password hashing with Argon2id keyed by the server secret.

use std::sync::Arc;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{
    PasswordHash, PasswordHasher as _, PasswordVerifier as _, SaltString,
};
use argon2::{Algorithm, Argon2, Version};

pub use argon2::Params;

use crate::error::{KeygateError, Result};
use crate::keys::KeyMaterial;

/// Fixed salt for the work done on logins without a stored hash.
const ABSENT_USER_SALT: &[u8; 16] = b"keygate-no-user!";

/// Hashes and verifies user passwords.
///
/// Output is a PHC string (`$argon2id$v=19$...`), safe to store as-is.
pub struct PasswordHasher {
    keys: Arc<KeyMaterial>,
    params: Params,
}

impl PasswordHasher {
    pub fn new(keys: Arc<KeyMaterial>) -> Self {
        Self::with_params(keys, Params::default())
    }

    pub fn with_params(keys: Arc<KeyMaterial>, params: Params) -> Self {
        Self { keys, params }
    }

    fn argon2(&self) -> Result<Argon2<'_>> {
        Argon2::new_with_secret(
            self.keys.secret(),
            Algorithm::Argon2id,
            Version::V0x13,
            self.params.clone(),
        )
        .map_err(|e| KeygateError::Crypto(format!("argon2 setup failed: {}", e)))
    }

    pub fn hash(&self, password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()?
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| KeygateError::Crypto(format!("password hashing failed: {}", e)))?;
        Ok(hash.to_string())
    }

    /// Check `password` against a stored PHC string.
    ///
    /// Unparseable hashes count as a mismatch.
    pub fn verify(&self, password: &str, stored_hash: &str) -> bool {
        let parsed = match PasswordHash::new(stored_hash) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(error = %e, "Stored password hash is not a valid PHC string");
                return false;
            }
        };

        match self.argon2() {
            Ok(argon2) => argon2.verify_password(password.as_bytes(), &parsed).is_ok(),
            Err(e) => {
                tracing::error!(error = %e, "Password verifier unavailable");
                false
            }
        }
    }

    /// Stand-in for [`verify`](Self::verify) when there is no stored hash.
    ///
    /// Runs one Argon2id pass with the configured cost so an unknown
    /// username takes as long to reject as a wrong password. Always `false`.
    pub fn verify_absent(&self, password: &str) -> bool {
        if let Err(e) = self.absent_hash(password) {
            tracing::error!(error = %e, "Password verifier unavailable");
        }
        false
    }

    fn absent_hash(&self, password: &str) -> Result<String> {
        let salt = SaltString::encode_b64(ABSENT_USER_SALT)
            .map_err(|e| KeygateError::Crypto(format!("invalid salt: {}", e)))?;
        let hash = self
            .argon2()?
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| KeygateError::Crypto(format!("password hashing failed: {}", e)))?;
        Ok(hash.to_string())
    }
}

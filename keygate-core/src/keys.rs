//! Server key material
//!
//! One secret drives token signing, password hashing and the session cookie
//! key. It is held here and handed out by reference, so the raw bytes never
//! live in module-level state.

use std::fmt;
use std::str::FromStr;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey};
use sha2::{Digest, Sha512};
use zeroize::Zeroizing;

use crate::error::{KeygateError, Result};

/// Minimum accepted secret length in bytes.
pub const MIN_SECRET_LEN: usize = 32;

/// Length of keys produced by [`KeyMaterial::derive_key`].
pub const DERIVED_KEY_LEN: usize = 64;

/// Server secret plus the JWT algorithm it is used with.
///
/// The secret is zeroized on drop.
pub struct KeyMaterial {
    secret: Zeroizing<Vec<u8>>,
    algorithm: Algorithm,
}

impl KeyMaterial {
    /// Wrap a secret for use with an HMAC token algorithm.
    pub fn new(secret: impl Into<Vec<u8>>, algorithm: Algorithm) -> Result<Self> {
        let secret = Zeroizing::new(secret.into());
        if secret.len() < MIN_SECRET_LEN {
            return Err(KeygateError::Config(format!(
                "secret key must be at least {} bytes, got {}",
                MIN_SECRET_LEN,
                secret.len()
            )));
        }

        match algorithm {
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => {}
            other => {
                return Err(KeygateError::Config(format!(
                    "unsupported token algorithm {:?}, expected HS256, HS384 or HS512",
                    other
                )))
            }
        }

        Ok(Self { secret, algorithm })
    }

    /// Parse an algorithm name such as `"HS256"`.
    pub fn parse_algorithm(name: &str) -> Result<Algorithm> {
        Algorithm::from_str(name)
            .map_err(|_| KeygateError::Config(format!("unknown token algorithm '{}'", name)))
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub(crate) fn secret(&self) -> &[u8] {
        &self.secret
    }

    pub(crate) fn encoding_key(&self) -> EncodingKey {
        EncodingKey::from_secret(&self.secret)
    }

    pub(crate) fn decoding_key(&self) -> DecodingKey {
        DecodingKey::from_secret(&self.secret)
    }

    /// Derive a 64-byte key bound to `label`.
    ///
    /// Distinct labels yield unrelated keys, so the same secret can sign
    /// tokens and cookies without one being usable as the other.
    pub fn derive_key(&self, label: &str) -> Zeroizing<[u8; DERIVED_KEY_LEN]> {
        let mut hasher = Sha512::new();
        hasher.update(label.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.secret.as_slice());
        let digest = hasher.finalize();

        let mut out = Zeroizing::new([0u8; DERIVED_KEY_LEN]);
        out.copy_from_slice(&digest);
        out
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("secret", &"[REDACTED]")
            .field("algorithm", &self.algorithm)
            .finish()
    }
}

//! Single-use ceremony challenges
//!
//! A challenge is stored when a ceremony begins and taken (removed) when
//! it finishes, whether or not verification succeeds. Challenges live in
//! memory only and expire after [`DEFAULT_CHALLENGE_TTL`].

use std::fmt;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use rand::rngs::OsRng;
use rand::RngCore;
use subtle::ConstantTimeEq;

use crate::error::{KeygateError, Result};
use crate::wire;

/// Bytes of randomness in a generated challenge.
pub const CHALLENGE_LEN: usize = 32;

/// Maximum age of an outstanding challenge (5 minutes).
pub const DEFAULT_CHALLENGE_TTL: Duration = Duration::from_secs(300);

/// Which ceremony a challenge belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CeremonyPurpose {
    Registration,
    Authentication,
}

impl CeremonyPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            CeremonyPurpose::Registration => "registration",
            CeremonyPurpose::Authentication => "authentication",
        }
    }
}

impl fmt::Display for CeremonyPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Random challenge bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct Challenge(Vec<u8>);

impl Challenge {
    /// Generate a fresh challenge from the OS RNG.
    pub fn generate() -> Self {
        let mut bytes = vec![0u8; CHALLENGE_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_base64url(&self) -> String {
        wire::encode(&self.0)
    }

    /// Constant-time comparison against bytes echoed by a client.
    pub fn matches(&self, echoed: &[u8]) -> bool {
        self.0.as_slice().ct_eq(echoed).into()
    }
}

impl fmt::Debug for Challenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Challenge({} bytes)", self.0.len())
    }
}

/// Storage for outstanding challenges, keyed by session and purpose.
#[async_trait]
pub trait ChallengeStore: Send + Sync {
    /// Store a challenge, replacing any previous one for the same key.
    async fn put(&self, session_id: &str, purpose: CeremonyPurpose, challenge: Challenge) -> Result<()>;

    /// Remove and return the challenge. A second call for the same key
    /// fails with [`KeygateError::NoChallenge`], as does an expired entry.
    async fn take(&self, session_id: &str, purpose: CeremonyPurpose) -> Result<Challenge>;
}

struct ChallengeEntry {
    challenge: Challenge,
    expires_at: Instant,
}

/// In-process challenge store backed by a sharded map.
pub struct MemoryChallengeStore {
    entries: DashMap<(String, CeremonyPurpose), ChallengeEntry>,
    ttl: Duration,
}

impl MemoryChallengeStore {
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_CHALLENGE_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Drop expired entries and return how many were removed.
    pub fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before.saturating_sub(self.entries.len())
    }

    /// Number of outstanding challenges, expired ones included.
    pub fn pending(&self) -> usize {
        self.entries.len()
    }
}

impl Default for MemoryChallengeStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChallengeStore for MemoryChallengeStore {
    async fn put(&self, session_id: &str, purpose: CeremonyPurpose, challenge: Challenge) -> Result<()> {
        let expires_at = Instant::now().checked_add(self.ttl).ok_or_else(|| {
            KeygateError::Config(format!("challenge ttl {:?} is out of range", self.ttl))
        })?;
        self.entries.insert(
            (session_id.to_string(), purpose),
            ChallengeEntry {
                challenge,
                expires_at,
            },
        );
        Ok(())
    }

    async fn take(&self, session_id: &str, purpose: CeremonyPurpose) -> Result<Challenge> {
        let (_, entry) = self
            .entries
            .remove(&(session_id.to_string(), purpose))
            .ok_or(KeygateError::NoChallenge)?;

        if entry.expires_at > Instant::now() {
            Ok(entry.challenge)
        } else {
            tracing::debug!(purpose = %purpose, "Challenge expired before use");
            Err(KeygateError::NoChallenge)
        }
    }
}

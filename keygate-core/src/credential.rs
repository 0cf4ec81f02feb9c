//! Registered credentials and the repository contract that persists them.

use std::fmt;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::error::{KeygateError, Result};
use crate::wire;

/// A public-key credential bound to one user.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    /// Authenticator-assigned id, globally unique.
    pub credential_id: Vec<u8>,
    /// COSE_Key bytes as found in the attested credential data.
    pub public_key: Vec<u8>,
    pub owner_id: String,
    /// Last accepted signature counter. Never decreases.
    pub signature_counter: u32,
}

impl Credential {
    pub fn id_base64url(&self) -> String {
        wire::encode(&self.credential_id)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("credential_id", &hex::encode(&self.credential_id))
            .field("public_key_len", &self.public_key.len())
            .field("owner_id", &self.owner_id)
            .field("signature_counter", &self.signature_counter)
            .finish()
    }
}

/// Durable credential storage.
#[async_trait]
pub trait CredentialRepository: Send + Sync {
    async fn find_by_owner(&self, owner_id: &str) -> Result<Vec<Credential>>;

    async fn find_by_id(&self, credential_id: &[u8]) -> Result<Option<Credential>>;

    /// Insert a new credential. Fails with [`KeygateError::CredentialExists`]
    /// if the id is taken, leaving the existing row untouched.
    async fn insert(&self, credential: Credential) -> Result<()>;

    /// Advance the counter only if `new_counter` is greater than the stored
    /// one. Returns whether the credential was updated.
    async fn update_counter(&self, credential_id: &[u8], new_counter: u32) -> Result<bool>;
}

/// In-memory repository for tests and database-less deployments.
#[derive(Default)]
pub struct MemoryCredentialRepository {
    credentials: DashMap<Vec<u8>, Credential>,
}

impl MemoryCredentialRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }
}

#[async_trait]
impl CredentialRepository for MemoryCredentialRepository {
    async fn find_by_owner(&self, owner_id: &str) -> Result<Vec<Credential>> {
        Ok(self
            .credentials
            .iter()
            .filter(|entry| entry.owner_id == owner_id)
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn find_by_id(&self, credential_id: &[u8]) -> Result<Option<Credential>> {
        Ok(self
            .credentials
            .get(credential_id)
            .map(|entry| entry.value().clone()))
    }

    async fn insert(&self, credential: Credential) -> Result<()> {
        match self.credentials.entry(credential.credential_id.clone()) {
            Entry::Occupied(_) => Err(KeygateError::CredentialExists),
            Entry::Vacant(slot) => {
                slot.insert(credential);
                Ok(())
            }
        }
    }

    async fn update_counter(&self, credential_id: &[u8], new_counter: u32) -> Result<bool> {
        // The shard lock is held for the compare and the write
        match self.credentials.get_mut(credential_id) {
            Some(mut entry) if new_counter > entry.signature_counter => {
                entry.signature_counter = new_counter;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

//! Session record storage
//!
//! Ceremony sessions are stored in PostgreSQL when a database is configured
//! and in a sharded map otherwise. Both backends drop expired records when
//! [`ExpiredDeletion::delete_expired`] runs, which the server does on its
//! cleanup interval.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use sqlx::PgPool;
use time::OffsetDateTime;
use tower_sessions::session::{Id, Record};
use tower_sessions::session_store::{self, ExpiredDeletion, SessionStore};
use tower_sessions_sqlx_store::PostgresStore;

use crate::db::StorageError;

/// In-process session records with expiry sweeping
#[derive(Debug, Clone, Default)]
pub struct MemorySessionStore {
    records: Arc<DashMap<Id, Record>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records, expired ones included
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, record: &mut Record) -> session_store::Result<()> {
        while self.records.contains_key(&record.id) {
            record.id = Id::default();
        }
        self.records.insert(record.id, record.clone());
        Ok(())
    }

    async fn save(&self, record: &Record) -> session_store::Result<()> {
        self.records.insert(record.id, record.clone());
        Ok(())
    }

    async fn load(&self, session_id: &Id) -> session_store::Result<Option<Record>> {
        let now = OffsetDateTime::now_utc();
        // Expired records are removed on sight rather than left for the sweep
        let expired = match self.records.get(session_id) {
            Some(record) if record.expiry_date > now => return Ok(Some(record.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.records
                .remove_if(session_id, |_, record| record.expiry_date <= now);
        }
        Ok(None)
    }

    async fn delete(&self, session_id: &Id) -> session_store::Result<()> {
        self.records.remove(session_id);
        Ok(())
    }
}

#[async_trait]
impl ExpiredDeletion for MemorySessionStore {
    async fn delete_expired(&self) -> session_store::Result<()> {
        let now = OffsetDateTime::now_utc();
        self.records.retain(|_, record| record.expiry_date > now);
        Ok(())
    }
}

/// Session backend selected at startup
#[derive(Debug, Clone)]
pub enum SessionBackend {
    Postgres(PostgresStore),
    Memory(MemorySessionStore),
}

impl SessionBackend {
    /// PostgreSQL-backed sessions; creates the session table if needed
    pub async fn postgres(pool: PgPool) -> Result<Self, StorageError> {
        let store = PostgresStore::new(pool);
        store
            .migrate()
            .await
            .map_err(|e| StorageError::Migration(e.to_string()))?;
        Ok(Self::Postgres(store))
    }

    pub fn in_memory() -> Self {
        Self::Memory(MemorySessionStore::new())
    }
}

#[async_trait]
impl SessionStore for SessionBackend {
    async fn create(&self, record: &mut Record) -> session_store::Result<()> {
        match self {
            Self::Postgres(store) => store.create(record).await,
            Self::Memory(store) => store.create(record).await,
        }
    }

    async fn save(&self, record: &Record) -> session_store::Result<()> {
        match self {
            Self::Postgres(store) => store.save(record).await,
            Self::Memory(store) => store.save(record).await,
        }
    }

    async fn load(&self, session_id: &Id) -> session_store::Result<Option<Record>> {
        match self {
            Self::Postgres(store) => store.load(session_id).await,
            Self::Memory(store) => store.load(session_id).await,
        }
    }

    async fn delete(&self, session_id: &Id) -> session_store::Result<()> {
        match self {
            Self::Postgres(store) => store.delete(session_id).await,
            Self::Memory(store) => store.delete(session_id).await,
        }
    }
}

#[async_trait]
impl ExpiredDeletion for SessionBackend {
    async fn delete_expired(&self) -> session_store::Result<()> {
        match self {
            Self::Postgres(store) => store.delete_expired().await,
            Self::Memory(store) => store.delete_expired().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(expires_in: time::Duration) -> Record {
        Record {
            id: Id::default(),
            data: Default::default(),
            expiry_date: OffsetDateTime::now_utc() + expires_in,
        }
    }

    #[tokio::test]
    async fn test_create_then_load() {
        let store = MemorySessionStore::new();
        let mut live = record(time::Duration::minutes(5));
        store.create(&mut live).await.unwrap();

        let loaded = store.load(&live.id).await.unwrap();
        assert_eq!(loaded.map(|r| r.id), Some(live.id));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_load_removes_expired_record() {
        let store = MemorySessionStore::new();
        let mut expired = record(time::Duration::seconds(-1));
        store.create(&mut expired).await.unwrap();

        assert!(store.load(&expired.id).await.unwrap().is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_delete_expired_sweeps_abandoned_sessions() {
        let store = MemorySessionStore::new();
        for _ in 0..3 {
            store
                .create(&mut record(time::Duration::seconds(-1)))
                .await
                .unwrap();
        }
        let mut live = record(time::Duration::minutes(5));
        store.create(&mut live).await.unwrap();
        assert_eq!(store.len(), 4);

        store.delete_expired().await.unwrap();

        assert_eq!(store.len(), 1);
        assert!(store.load(&live.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete() {
        let backend = SessionBackend::in_memory();
        let mut live = record(time::Duration::minutes(5));
        backend.create(&mut live).await.unwrap();
        backend.delete(&live.id).await.unwrap();
        assert!(backend.load(&live.id).await.unwrap().is_none());
    }
}

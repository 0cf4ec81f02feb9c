//! PostgreSQL storage for WebAuthn credentials

use async_trait::async_trait;
use keygate_core::{Credential, CredentialRepository, KeygateError};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::StorageError;

#[derive(Debug, FromRow)]
struct CredentialRow {
    credential_id: Vec<u8>,
    public_key: Vec<u8>,
    user_id: Uuid,
    sign_count: i64,
}

impl TryFrom<CredentialRow> for Credential {
    type Error = KeygateError;

    fn try_from(row: CredentialRow) -> Result<Self, Self::Error> {
        let signature_counter = u32::try_from(row.sign_count).map_err(|_| {
            KeygateError::Storage(format!("sign_count {} out of range", row.sign_count))
        })?;
        Ok(Credential {
            credential_id: row.credential_id,
            public_key: row.public_key,
            owner_id: row.user_id.to_string(),
            signature_counter,
        })
    }
}

fn parse_owner(owner_id: &str) -> Result<Uuid, KeygateError> {
    Uuid::parse_str(owner_id)
        .map_err(|e| KeygateError::Storage(format!("owner id '{}' is not a UUID: {}", owner_id, e)))
}

/// PostgreSQL-backed credential repository
pub struct PostgresCredentialRepository {
    pool: PgPool,
}

impl PostgresCredentialRepository {
    /// Create from an existing pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialRepository for PostgresCredentialRepository {
    async fn find_by_owner(&self, owner_id: &str) -> keygate_core::Result<Vec<Credential>> {
        let user_id = parse_owner(owner_id)?;

        let rows = sqlx::query_as::<_, CredentialRow>(
            r#"
            SELECT credential_id, public_key, user_id, sign_count
            FROM user_credentials
            WHERE user_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Query(e.to_string()))?;

        rows.into_iter().map(Credential::try_from).collect()
    }

    async fn find_by_id(&self, credential_id: &[u8]) -> keygate_core::Result<Option<Credential>> {
        let row = sqlx::query_as::<_, CredentialRow>(
            r#"
            SELECT credential_id, public_key, user_id, sign_count
            FROM user_credentials
            WHERE credential_id = $1
            "#,
        )
        .bind(credential_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Query(e.to_string()))?;

        row.map(Credential::try_from).transpose()
    }

    async fn insert(&self, credential: Credential) -> keygate_core::Result<()> {
        let user_id = parse_owner(&credential.owner_id)?;

        let result = sqlx::query(
            r#"
            INSERT INTO user_credentials (id, user_id, credential_id, public_key, sign_count)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (credential_id) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(&credential.credential_id)
        .bind(&credential.public_key)
        .bind(i64::from(credential.signature_counter))
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Query(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(KeygateError::CredentialExists);
        }

        tracing::info!(
            credential_id = %credential.id_base64url(),
            user_id = %user_id,
            "Credential stored in database"
        );
        Ok(())
    }

    async fn update_counter(&self, credential_id: &[u8], new_counter: u32) -> keygate_core::Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE user_credentials
            SET sign_count = $2
            WHERE credential_id = $1 AND sign_count < $2
            "#,
        )
        .bind(credential_id)
        .bind(i64::from(new_counter))
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Query(e.to_string()))?;

        Ok(result.rows_affected() == 1)
    }
}

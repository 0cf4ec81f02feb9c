//! User entity and repository
//!
//! Password-login accounts. A user's id is the owner of their WebAuthn
//! credentials and the bearer token subject is their username.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use keygate_core::UserIdentity;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use tokio::sync::RwLock;
use utoipa::ToSchema;
use uuid::Uuid;

use super::StorageError;

/// User entity from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub hashed_password: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub is_active: bool,
    pub is_superuser: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Identity handed to the WebAuthn ceremonies
    pub fn identity(&self) -> UserIdentity {
        let display_name = match (&self.first_name, &self.last_name) {
            (Some(first), Some(last)) => format!("{} {}", first, last),
            (Some(first), None) => first.clone(),
            (None, Some(last)) => last.clone(),
            (None, None) => self.username.clone(),
        };
        UserIdentity {
            id: self.id.to_string(),
            name: self.username.clone(),
            display_name,
        }
    }
}

/// DTO for creating a new user
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub hashed_password: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// User response DTO (excludes internal fields)
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UserResponse {
    /// User unique identifier
    #[schema(value_type = String, example = "550e8400-e29b-41d4-a716-446655440000")]
    pub id: Uuid,
    /// Login name
    #[schema(example = "alice")]
    pub username: String,
    /// User email address
    #[schema(example = "alice@example.com")]
    pub email: String,
    #[schema(example = "Alice")]
    pub first_name: Option<String>,
    #[schema(example = "Liddell")]
    pub last_name: Option<String>,
    pub is_active: bool,
    pub is_superuser: bool,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            is_active: user.is_active,
            is_superuser: user.is_superuser,
        }
    }
}

enum UserBackend {
    /// PostgreSQL storage (production)
    Postgres(PgPool),
    /// In-memory storage (development fallback)
    Memory(RwLock<HashMap<Uuid, User>>),
}

/// Repository for user database operations
pub struct UserRepository {
    backend: UserBackend,
}

impl UserRepository {
    /// Create a new user repository over a PostgreSQL pool
    pub fn new(pool: PgPool) -> Self {
        Self {
            backend: UserBackend::Postgres(pool),
        }
    }

    /// Create an in-memory repository (development only)
    pub fn in_memory() -> Self {
        Self {
            backend: UserBackend::Memory(RwLock::new(HashMap::new())),
        }
    }

    /// Find user by username
    pub async fn find_by_username(&self, username: &str) -> Result<Option<User>, StorageError> {
        match &self.backend {
            UserBackend::Postgres(pool) => sqlx::query_as::<_, User>(
                r#"
                SELECT id, username, email, hashed_password, first_name, last_name,
                       is_active, is_superuser, created_at
                FROM users
                WHERE username = $1
                "#,
            )
            .bind(username)
            .fetch_optional(pool)
            .await
            .map_err(|e| StorageError::Query(e.to_string())),
            UserBackend::Memory(users) => Ok(users
                .read()
                .await
                .values()
                .find(|u| u.username == username)
                .cloned()),
        }
    }

    /// Insert a user unless the username or email is taken.
    ///
    /// Returns `None` when either is already in use.
    pub async fn create(&self, new_user: NewUser) -> Result<Option<User>, StorageError> {
        let id = Uuid::new_v4();

        match &self.backend {
            UserBackend::Postgres(pool) => {
                let user = sqlx::query_as::<_, User>(
                    r#"
                    INSERT INTO users (id, username, email, hashed_password, first_name, last_name)
                    VALUES ($1, $2, $3, $4, $5, $6)
                    ON CONFLICT DO NOTHING
                    RETURNING id, username, email, hashed_password, first_name, last_name,
                              is_active, is_superuser, created_at
                    "#,
                )
                .bind(id)
                .bind(&new_user.username)
                .bind(&new_user.email)
                .bind(&new_user.hashed_password)
                .bind(&new_user.first_name)
                .bind(&new_user.last_name)
                .fetch_optional(pool)
                .await
                .map_err(|e| StorageError::Query(e.to_string()))?;

                if let Some(ref user) = user {
                    tracing::info!(user_id = %user.id, user = %user.username, "Created user");
                }
                Ok(user)
            }
            UserBackend::Memory(users) => {
                let mut users = users.write().await;
                let taken = users.values().any(|u| {
                    u.username == new_user.username || u.email.eq_ignore_ascii_case(&new_user.email)
                });
                if taken {
                    return Ok(None);
                }

                let user = User {
                    id,
                    username: new_user.username,
                    email: new_user.email,
                    hashed_password: new_user.hashed_password,
                    first_name: new_user.first_name,
                    last_name: new_user.last_name,
                    is_active: true,
                    is_superuser: false,
                    created_at: Utc::now(),
                };
                users.insert(id, user.clone());
                tracing::info!(user_id = %user.id, user = %user.username, "Created user");
                Ok(Some(user))
            }
        }
    }
}

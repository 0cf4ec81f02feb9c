//! Application state module
//!
//! Defines shared state accessible across all request handlers.

use std::sync::Arc;

use keygate_core::{
    CeremonyVerifier, CredentialRepository, KeyMaterial, KeygateError, MemoryChallengeStore,
    MemoryCredentialRepository, PasswordHasher, RelyingParty, TokenHandler,
};
use sqlx::PgPool;

use crate::config::Config;
use crate::db::{self, PostgresCredentialRepository, UserRepository};
use crate::session::SessionBackend;

/// Application state containing shared resources.
#[derive(Clone)]
pub struct AppState {
    /// Server secret and token algorithm
    pub keys: Arc<KeyMaterial>,
    /// Bearer token issuance and validation
    pub tokens: Arc<TokenHandler>,
    /// Argon2id password hashing
    pub passwords: Arc<PasswordHasher>,
    /// Outstanding ceremony challenges, swept by the cleanup task
    pub challenges: Arc<MemoryChallengeStore>,
    /// WebAuthn ceremonies for the configured relying party
    pub verifier: Arc<CeremonyVerifier>,
    /// User accounts
    pub users: Arc<UserRepository>,
    /// Ceremony session records, swept by the cleanup task
    pub sessions: SessionBackend,
    /// Database pool when running against PostgreSQL
    pub db: Option<PgPool>,
}

impl AppState {
    /// Create state from configuration
    ///
    /// Uses PostgreSQL if `DATABASE_URL` is set, otherwise falls back to in-memory.
    pub async fn new(config: &Config) -> Result<Self, KeygateError> {
        match &config.database_url {
            Some(url) => {
                tracing::info!("Using PostgreSQL storage");
                let pool = db::connect(url, config).await?;
                db::migrate(&pool).await?;
                let sessions = SessionBackend::postgres(pool.clone()).await?;
                Self::build(
                    config,
                    UserRepository::new(pool.clone()),
                    Arc::new(PostgresCredentialRepository::from_pool(pool.clone())),
                    sessions,
                    Some(pool),
                )
            }
            None => {
                tracing::warn!("DATABASE_URL not set, using in-memory storage - data will be lost on restart!");
                Self::in_memory(config)
            }
        }
    }

    /// Create state backed entirely by memory (development and tests)
    pub fn in_memory(config: &Config) -> Result<Self, KeygateError> {
        Self::build(
            config,
            UserRepository::in_memory(),
            Arc::new(MemoryCredentialRepository::new()),
            SessionBackend::in_memory(),
            None,
        )
    }

    fn build(
        config: &Config,
        users: UserRepository,
        credentials: Arc<dyn CredentialRepository>,
        sessions: SessionBackend,
        db: Option<PgPool>,
    ) -> Result<Self, KeygateError> {
        config.validate()?;
        let keys = Arc::new(config.key_material()?);

        let tokens = TokenHandler::new(
            keys.clone(),
            config.issuer.clone(),
            config.audience.clone(),
            config.access_token_ttl()?,
        );

        let rp = RelyingParty::new(
            config.rp_id.clone(),
            config.rp_name.clone(),
            config.expected_origin.clone(),
        )?;
        let challenges = Arc::new(MemoryChallengeStore::with_ttl(config.challenge_ttl()));
        let verifier = CeremonyVerifier::new(rp, challenges.clone(), credentials)
            .with_timeout_ms(config.ceremony_timeout_ms);

        Ok(Self {
            passwords: Arc::new(PasswordHasher::new(keys.clone())),
            tokens: Arc::new(tokens),
            keys,
            challenges,
            verifier: Arc::new(verifier),
            users: Arc::new(users),
            sessions,
            db,
        })
    }

    /// Replace the password hasher, e.g. with cheaper parameters in tests
    pub fn with_password_hasher(mut self, passwords: PasswordHasher) -> Self {
        self.passwords = Arc::new(passwords);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_state() {
        let state = AppState::in_memory(&Config::default()).unwrap();
        assert!(state.db.is_none());
        assert!(matches!(state.sessions, SessionBackend::Memory(_)));
        assert_eq!(state.verifier.relying_party().id, "localhost");
        assert_eq!(state.tokens.default_ttl(), chrono::Duration::minutes(30));
    }

    #[tokio::test]
    async fn test_ceremony_timeout_from_config() {
        let config = Config {
            ceremony_timeout_ms: 120_000,
            ..Config::default()
        };
        let state = AppState::in_memory(&config).unwrap();
        let user = keygate_core::UserIdentity {
            id: "1".into(),
            name: "alice".into(),
            display_name: "alice".into(),
        };

        let options = state.verifier.begin_registration("s1", &user).await.unwrap();
        assert_eq!(options.timeout, 120_000);
    }

    #[test]
    fn test_mismatched_origin_rejected() {
        let config = Config {
            rp_id: "example.com".into(),
            expected_origin: "https://evil.test".into(),
            ..Config::default()
        };
        assert!(matches!(
            AppState::in_memory(&config),
            Err(KeygateError::Config(_))
        ));
    }
}

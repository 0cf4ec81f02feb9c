//! Server configuration module
//!
//! Handles loading configuration from environment variables with sensible defaults.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use keygate_core::ceremony::DEFAULT_TIMEOUT_MS;
use keygate_core::keys::MIN_SECRET_LEN;
use keygate_core::{KeyMaterial, KeygateError};
use thiserror::Error;

/// Longest accepted access token lifetime (30 days)
pub const MAX_ACCESS_TOKEN_EXPIRE_MINUTES: i64 = 60 * 24 * 30;

/// Longest accepted challenge lifetime (1 hour)
pub const MAX_CHALLENGE_TTL_SECS: u64 = 60 * 60;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

impl From<ConfigError> for KeygateError {
    fn from(err: ConfigError) -> Self {
        KeygateError::Config(err.to_string())
    }
}

/// Server configuration loaded from environment variables
#[derive(Clone)]
pub struct Config {
    /// Server port (default: 8000)
    pub port: u16,
    /// Server host (default: 127.0.0.1)
    pub host: IpAddr,
    /// Allowed CORS origins, comma-separated (default: allow all in dev)
    pub allowed_origins: Option<Vec<String>>,
    /// Request body limit in KB (default: 64)
    pub body_limit_kb: usize,
    /// Request timeout in seconds (default: 30)
    pub timeout_secs: u64,
    /// Enable rate limiting (default: false for tests, true when loaded from env)
    pub rate_limit_enabled: bool,
    /// Rate limit: requests per second (default: 10)
    pub rate_limit_per_sec: u64,
    /// Rate limit: burst size (default: 20)
    pub rate_limit_burst: u32,
    /// PostgreSQL URL; in-memory repositories when unset
    pub database_url: Option<String>,
    /// Database connection pool maximum connections (default: 20)
    pub database_max_connections: u32,
    /// Database connection pool minimum connections (default: 2)
    pub database_min_connections: u32,
    /// Token signing secret, at least 32 bytes
    pub secret_key: String,
    /// JWT algorithm name (default: HS256)
    pub algorithm: String,
    /// Access token lifetime in minutes (default: 30)
    pub access_token_expire_minutes: i64,
    /// Token issuer (default: Keygate)
    pub issuer: String,
    /// Token audience (default: Keygate)
    pub audience: String,
    /// WebAuthn relying party id (default: localhost)
    pub rp_id: String,
    /// WebAuthn relying party display name (default: Keygate)
    pub rp_name: String,
    /// Origin expected in client data (default: http://localhost:8000)
    pub expected_origin: String,
    /// Name of the ceremony session cookie (default: keygate_session)
    pub session_cookie_name: String,
    /// Challenge lifetime in seconds (default: 300)
    pub challenge_ttl_secs: u64,
    /// Ceremony timeout advertised to the browser in milliseconds (default: 60000)
    pub ceremony_timeout_ms: u64,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("socket_addr", &self.socket_addr())
            .field("allowed_origins", &self.allowed_origins)
            .field("rate_limit_enabled", &self.rate_limit_enabled)
            .field("database", &self.database_url.as_ref().map(|_| "<set>"))
            .field("secret_key", &"<redacted>")
            .field("algorithm", &self.algorithm)
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("rp_id", &self.rp_id)
            .field("expected_origin", &self.expected_origin)
            .field("challenge_ttl_secs", &self.challenge_ttl_secs)
            .field("ceremony_timeout_ms", &self.ceremony_timeout_ms)
            .finish_non_exhaustive()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8000,
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            allowed_origins: None, // None = allow all (dev mode)
            body_limit_kb: 64,
            timeout_secs: 30,
            rate_limit_enabled: false, // Disabled by default (for tests)
            rate_limit_per_sec: 10,
            rate_limit_burst: 20,
            database_url: None,
            database_max_connections: 20,
            database_min_connections: 2,
            secret_key: "keygate-test-secret-key-not-for-production-use".to_string(),
            algorithm: "HS256".to_string(),
            access_token_expire_minutes: 30,
            issuer: "Keygate".to_string(),
            audience: "Keygate".to_string(),
            rp_id: "localhost".to_string(),
            rp_name: "Keygate".to_string(),
            expected_origin: "http://localhost:8000".to_string(),
            session_cookie_name: "keygate_session".to_string(),
            challenge_ttl_secs: 300,
            ceremony_timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let secret_key = std::env::var("SECRET_KEY")
            .ok()
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::Missing("SECRET_KEY"))?;

        let allowed_origins = std::env::var("ALLOWED_ORIGINS").ok().map(|origins| {
            origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        });

        // Rate limiting enabled by default in production, can be disabled with RATE_LIMIT_ENABLED=false
        let rate_limit_enabled = std::env::var("RATE_LIMIT_ENABLED")
            .map(|v| v.to_lowercase() != "false")
            .unwrap_or(true);

        let config = Self {
            port: parse_var("PORT", defaults.port)?,
            host: parse_var("HOST", defaults.host)?,
            allowed_origins,
            body_limit_kb: parse_var("BODY_LIMIT_KB", defaults.body_limit_kb)?,
            timeout_secs: parse_var("REQUEST_TIMEOUT_SECS", defaults.timeout_secs)?,
            rate_limit_enabled,
            rate_limit_per_sec: parse_var("RATE_LIMIT_PER_SEC", defaults.rate_limit_per_sec)?,
            rate_limit_burst: parse_var("RATE_LIMIT_BURST", defaults.rate_limit_burst)?,
            database_url: std::env::var("DATABASE_URL").ok().filter(|s| !s.is_empty()),
            database_max_connections: parse_var(
                "DATABASE_MAX_CONNECTIONS",
                defaults.database_max_connections,
            )?,
            database_min_connections: parse_var(
                "DATABASE_MIN_CONNECTIONS",
                defaults.database_min_connections,
            )?,
            secret_key,
            algorithm: string_var("ALGORITHM", defaults.algorithm),
            access_token_expire_minutes: parse_var(
                "ACCESS_TOKEN_EXPIRE_MINUTES",
                defaults.access_token_expire_minutes,
            )?,
            issuer: string_var("ISSUER", defaults.issuer),
            audience: string_var("AUDIENCE", defaults.audience),
            rp_id: string_var("RP_ID", defaults.rp_id),
            rp_name: string_var("RP_NAME", defaults.rp_name),
            expected_origin: string_var("EXPECTED_ORIGIN", defaults.expected_origin),
            session_cookie_name: string_var("SESSION_COOKIE_NAME", defaults.session_cookie_name),
            challenge_ttl_secs: parse_var("CHALLENGE_TTL_SECS", defaults.challenge_ttl_secs)?,
            ceremony_timeout_ms: parse_var("CEREMONY_TIMEOUT_MS", defaults.ceremony_timeout_ms)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Check values that parse but cannot be used
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.secret_key.len() < MIN_SECRET_LEN {
            return Err(ConfigError::Invalid {
                name: "SECRET_KEY",
                reason: format!("must be at least {} bytes", MIN_SECRET_LEN),
            });
        }
        self.key_material()?;
        if !(1..=MAX_ACCESS_TOKEN_EXPIRE_MINUTES).contains(&self.access_token_expire_minutes) {
            return Err(ConfigError::Invalid {
                name: "ACCESS_TOKEN_EXPIRE_MINUTES",
                reason: format!("must be between 1 and {}", MAX_ACCESS_TOKEN_EXPIRE_MINUTES),
            });
        }
        if !(1..=MAX_CHALLENGE_TTL_SECS).contains(&self.challenge_ttl_secs) {
            return Err(ConfigError::Invalid {
                name: "CHALLENGE_TTL_SECS",
                reason: format!("must be between 1 and {}", MAX_CHALLENGE_TTL_SECS),
            });
        }
        if self.ceremony_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                name: "CEREMONY_TIMEOUT_MS",
                reason: "must be positive".into(),
            });
        }
        if self.database_min_connections > self.database_max_connections {
            return Err(ConfigError::Invalid {
                name: "DATABASE_MIN_CONNECTIONS",
                reason: "exceeds DATABASE_MAX_CONNECTIONS".into(),
            });
        }
        Ok(())
    }

    /// Build the key material for the configured secret and algorithm
    pub fn key_material(&self) -> Result<KeyMaterial, ConfigError> {
        let algorithm = KeyMaterial::parse_algorithm(&self.algorithm).map_err(|e| {
            ConfigError::Invalid {
                name: "ALGORITHM",
                reason: e.to_string(),
            }
        })?;
        KeyMaterial::new(self.secret_key.as_bytes(), algorithm).map_err(|e| ConfigError::Invalid {
            name: "ALGORITHM",
            reason: e.to_string(),
        })
    }

    /// Get socket address from config
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn challenge_ttl(&self) -> Duration {
        Duration::from_secs(self.challenge_ttl_secs)
    }

    pub fn access_token_ttl(&self) -> Result<chrono::TimeDelta, ConfigError> {
        chrono::TimeDelta::try_minutes(self.access_token_expire_minutes).ok_or(
            ConfigError::Invalid {
                name: "ACCESS_TOKEN_EXPIRE_MINUTES",
                reason: "out of range".into(),
            },
        )
    }
}

fn string_var(name: &str, default: String) -> String {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or(default)
}

fn parse_var<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => {
            value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
                name,
                reason: e.to_string(),
            })
        }
        _ => Ok(default),
    }
}

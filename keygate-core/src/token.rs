//! Signed bearer tokens
//!
//! Tokens are JWTs signed with the server secret. They carry the user's
//! identity and, optionally, an opaque ceremony state string.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{KeygateError, Result};
use crate::keys::KeyMaterial;

/// Optional ceremony context embedded in a token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenContext {
    pub state: String,
}

/// Claims carried by every token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (the user identifier)
    pub sub: String,
    /// Issued at (unix seconds)
    pub iat: i64,
    /// Expiry (unix seconds)
    pub exp: i64,
    pub iss: String,
    pub aud: String,
    /// Unique token id
    pub jti: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<TokenContext>,
}

/// Issues and validates tokens for one issuer/audience pair.
pub struct TokenHandler {
    keys: Arc<KeyMaterial>,
    issuer: String,
    audience: String,
    default_ttl: Duration,
}

impl TokenHandler {
    pub fn new(
        keys: Arc<KeyMaterial>,
        issuer: impl Into<String>,
        audience: impl Into<String>,
        default_ttl: Duration,
    ) -> Self {
        Self {
            keys,
            issuer: issuer.into(),
            audience: audience.into(),
            default_ttl,
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Issue a token for `subject` valid for `ttl`.
    pub fn issue(&self, subject: &str, ttl: Duration, ceremony_state: Option<&str>) -> Result<String> {
        self.issue_at(subject, Utc::now(), ttl, ceremony_state)
    }

    pub(crate) fn issue_at(
        &self,
        subject: &str,
        now: DateTime<Utc>,
        ttl: Duration,
        ceremony_state: Option<&str>,
    ) -> Result<String> {
        if subject.is_empty() {
            return Err(KeygateError::TokenIssue("subject must not be empty".into()));
        }
        // Claims are whole seconds, so anything shorter would give exp == iat.
        if ttl < Duration::seconds(1) {
            return Err(KeygateError::TokenIssue(format!(
                "ttl must be at least one second, got {}",
                ttl
            )));
        }

        let expires = now
            .checked_add_signed(ttl)
            .ok_or_else(|| KeygateError::TokenIssue(format!("ttl {} is out of range", ttl)))?;

        let claims = Claims {
            sub: subject.to_string(),
            iat: now.timestamp(),
            exp: expires.timestamp(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            jti: Uuid::new_v4().to_string(),
            context: ceremony_state.map(|state| TokenContext {
                state: state.to_string(),
            }),
        };

        encode(
            &Header::new(self.keys.algorithm()),
            &claims,
            &self.keys.encoding_key(),
        )
        .map_err(|e| KeygateError::TokenIssue(e.to_string()))
    }

    /// Validate a token and return its claims.
    ///
    /// Every failure is reported as [`KeygateError::InvalidToken`]; the
    /// cause is only logged at debug level.
    pub fn validate(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::new(self.keys.algorithm());
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        validation.set_required_spec_claims(&["exp", "iss", "sub", "aud"]);
        validation.leeway = 0;

        let data = decode::<Claims>(token, &self.keys.decoding_key(), &validation).map_err(|e| {
            tracing::debug!(error = %e, "Token rejected");
            KeygateError::InvalidToken
        })?;

        if data.claims.sub.is_empty() {
            tracing::debug!("Token rejected: empty subject");
            return Err(KeygateError::InvalidToken);
        }

        Ok(data.claims)
    }

    /// Validate a token and return its ceremony state.
    pub fn extract_ceremony_state(&self, token: &str) -> Result<String> {
        let claims = self.validate(token)?;
        match claims.context {
            Some(context) => Ok(context.state),
            None => {
                tracing::debug!(sub = %claims.sub, "Token carries no ceremony state");
                Err(KeygateError::InvalidToken)
            }
        }
    }
}

impl std::fmt::Debug for TokenHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenHandler")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("default_ttl", &self.default_ttl)
            .finish_non_exhaustive()
    }
}

use thiserror::Error;

/// Errors raised by token handling, password hashing and the WebAuthn
/// ceremonies.
///
/// The `String` reasons are meant for logs. Anything facing a client must
/// map each variant to a fixed, generic message.
#[derive(Error, Debug)]
pub enum KeygateError {
    #[error("Invalid token")]
    InvalidToken,

    #[error("Token issuance failed: {0}")]
    TokenIssue(String),

    #[error("No outstanding challenge for this ceremony")]
    NoChallenge,

    #[error("Registration failed: {0}")]
    RegistrationFailed(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Credential is unknown or not owned by the caller")]
    UnknownCredential,

    #[error("No credentials registered for user")]
    NoCredentialsRegistered,

    #[error("Signature counter did not advance: stored={stored}, reported={reported}")]
    ReplaySuspected { stored: u32, reported: u32 },

    #[error("Credential id already registered")]
    CredentialExists,

    #[error("Malformed ceremony response: {0}")]
    MalformedResponse(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, KeygateError>;

//! Signup validation module
//!
//! Field checks for new accounts. Failures are 422 validation errors naming
//! the offending field.

use crate::error::ApiError;

pub const USERNAME_MIN_LEN: usize = 3;
pub const USERNAME_MAX_LEN: usize = 50;
pub const EMAIL_MAX_LEN: usize = 254;
pub const PASSWORD_MIN_LEN: usize = 8;
pub const PASSWORD_MAX_LEN: usize = 128;
pub const NAME_MAX_LEN: usize = 100;

/// Validates a username
///
/// Accepts ASCII letters, digits, `_`, `-` and `.`.
pub fn validate_username(username: &str) -> Result<(), ApiError> {
    let len = username.chars().count();
    if !(USERNAME_MIN_LEN..=USERNAME_MAX_LEN).contains(&len) {
        return Err(ApiError::validation(format!(
            "username: must be between {} and {} characters",
            USERNAME_MIN_LEN, USERNAME_MAX_LEN
        )));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
    {
        return Err(ApiError::validation(
            "username: may only contain letters, digits, '_', '-' and '.'",
        ));
    }
    Ok(())
}

/// Validates an email address
///
/// A structural check only: one `@`, a non-empty local part and a dotted domain.
pub fn validate_email(email: &str) -> Result<(), ApiError> {
    let invalid = || ApiError::validation("email: value is not a valid email address");

    if email.len() > EMAIL_MAX_LEN || email.chars().any(char::is_whitespace) {
        return Err(invalid());
    }

    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty() || domain.contains('@') {
        return Err(invalid());
    }

    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 || labels.iter().any(|label| label.is_empty()) {
        return Err(invalid());
    }
    Ok(())
}

/// Validates a password's length
pub fn validate_password(password: &str) -> Result<(), ApiError> {
    let len = password.chars().count();
    if len < PASSWORD_MIN_LEN {
        return Err(ApiError::validation(format!(
            "password: must be at least {} characters",
            PASSWORD_MIN_LEN
        )));
    }
    if len > PASSWORD_MAX_LEN {
        return Err(ApiError::validation(format!(
            "password: must be at most {} characters",
            PASSWORD_MAX_LEN
        )));
    }
    Ok(())
}

/// Validates an optional first or last name
pub fn validate_name(field: &str, name: Option<&str>) -> Result<(), ApiError> {
    match name {
        Some(n) if n.chars().count() > NAME_MAX_LEN => Err(ApiError::validation(format!(
            "{}: must be at most {} characters",
            field, NAME_MAX_LEN
        ))),
        _ => Ok(()),
    }
}

use once_cell::sync::Lazy;
use regex::Regex;

use crate::constants::{EMAIL_MAX_LEN, PASSWORD_MAX_LEN, PASSWORD_MIN_LEN, USERNAME_MAX_LEN};

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("username must be between 1 and {} characters", USERNAME_MAX_LEN)]
    Username,
    #[error("email must be a valid address of at most {} characters", EMAIL_MAX_LEN)]
    Email,
    #[error("password must be between {} and {} characters", PASSWORD_MIN_LEN, PASSWORD_MAX_LEN)]
    Password,
}

pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    let len = username.chars().count();
    if username.trim().is_empty() || len > USERNAME_MAX_LEN {
        return Err(ValidationError::Username);
    }
    Ok(())
}

pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    if email.len() > EMAIL_MAX_LEN || !EMAIL_RE.is_match(email) {
        return Err(ValidationError::Email);
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    let len = password.chars().count();
    if !(PASSWORD_MIN_LEN..=PASSWORD_MAX_LEN).contains(&len) {
        return Err(ValidationError::Password);
    }
    Ok(())
}

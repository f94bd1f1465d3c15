/// Request input validators
///
/// Shape checks applied at the HTTP boundary before anything reaches the
/// token core: length limits, email format, control characters.

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::ValidationError;

const MAX_EMAIL_LENGTH: usize = 254; // RFC 5321
const MIN_EMAIL_LENGTH: usize = 5;
const MAX_NAME_LENGTH: usize = 256;
/// Signed access tokens stay well below this; anything larger is not ours.
const MAX_TOKEN_LENGTH: usize = 4096;

lazy_static! {
    // RFC 5322 simplified
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$"
    ).expect("email regex is valid");
}

/// Validates an email address and returns it trimmed.
pub fn is_valid_email(email: &str) -> Result<String, ValidationError> {
    let trimmed = email.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField("email".to_string()));
    }

    if trimmed.len() < MIN_EMAIL_LENGTH {
        return Err(ValidationError::TooShort("email".to_string(), MIN_EMAIL_LENGTH));
    }

    if trimmed.len() > MAX_EMAIL_LENGTH {
        return Err(ValidationError::TooLong("email".to_string(), MAX_EMAIL_LENGTH));
    }

    if !EMAIL_REGEX.is_match(trimmed) {
        return Err(ValidationError::InvalidFormat("email".to_string()));
    }

    // Local part over 64 chars is not deliverable (RFC 5321)
    if trimmed.split('@').next().map_or(true, |local| local.len() > 64) {
        return Err(ValidationError::SuspiciousContent("email".to_string()));
    }

    Ok(trimmed.to_string())
}

/// Validates a display name and returns it trimmed.
pub fn is_valid_name(name: &str) -> Result<String, ValidationError> {
    let trimmed = name.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField("name".to_string()));
    }

    if trimmed.len() > MAX_NAME_LENGTH {
        return Err(ValidationError::TooLong("name".to_string(), MAX_NAME_LENGTH));
    }

    if trimmed.chars().any(|c| c.is_control()) {
        return Err(ValidationError::SuspiciousContent("name".to_string()));
    }

    Ok(trimmed.to_string())
}

/// Presence and size check for a token field; contents stay opaque.
pub fn require_token<'a>(field: &str, token: &'a str) -> Result<&'a str, ValidationError> {
    let trimmed = token.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField(field.to_string()));
    }

    if trimmed.len() > MAX_TOKEN_LENGTH {
        return Err(ValidationError::TooLong(field.to_string(), MAX_TOKEN_LENGTH));
    }

    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_email() {
        assert!(is_valid_email("user@example.com").is_ok());
        assert!(is_valid_email("test.email@domain.co.uk").is_ok());
        assert!(is_valid_email("user+tag@example.com").is_ok());
        assert_eq!(is_valid_email("  user@example.com ").unwrap(), "user@example.com");
    }

    #[test]
    fn test_invalid_email_format() {
        assert!(is_valid_email("invalid").is_err());
        assert!(is_valid_email("user@").is_err());
        assert!(is_valid_email("@example.com").is_err());
        assert!(is_valid_email("user@@example.com").is_err());
        assert!(is_valid_email("").is_err());
    }

    #[test]
    fn test_email_length_limits() {
        let too_long = format!("{}@example.com", "a".repeat(250));
        assert!(is_valid_email(&too_long).is_err());

        let long_local = format!("{}@example.com", "a".repeat(65));
        assert!(is_valid_email(&long_local).is_err());
    }

    #[test]
    fn test_names() {
        assert!(is_valid_name("John Doe").is_ok());
        assert!(is_valid_name("O'Brien").is_ok());
        assert!(is_valid_name("   ").is_err());
        assert!(is_valid_name(&"a".repeat(257)).is_err());
        assert!(is_valid_name("Name\0with\0null").is_err());
    }

    #[test]
    fn test_token_fields() {
        assert_eq!(require_token("refresh_token", " abc ").unwrap(), "abc");
        assert_eq!(
            require_token("refresh_token", "").unwrap_err(),
            ValidationError::EmptyField("refresh_token".to_string())
        );
        assert!(require_token("access_token", &"x".repeat(5000)).is_err());
    }
}

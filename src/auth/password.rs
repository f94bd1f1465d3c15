/// Password Hashing and Verification
///
/// bcrypt with a configurable work factor, plus a strength policy applied
/// before anything is hashed.

use crate::error::{AppError, ValidationError};

const MIN_PASSWORD_LENGTH: usize = 8;
const MAX_PASSWORD_LENGTH: usize = 128;

#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    cost: u32,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self {
            cost: bcrypt::DEFAULT_COST,
        }
    }
}

impl PasswordHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    /// Check the policy, then hash.
    ///
    /// # Errors
    /// - `ValidationError` when the password breaks the policy
    /// - `AppError::Internal` when bcrypt fails (e.g. cost out of range)
    pub fn hash(&self, password: &str) -> Result<String, AppError> {
        validate_password_strength(password)?;

        bcrypt::hash(password, self.cost)
            .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
    }

    /// Constant-time comparison handled by bcrypt.
    pub fn verify(&self, password: &str, hash: &str) -> Result<bool, AppError> {
        bcrypt::verify(password, hash)
            .map_err(|e| AppError::Internal(format!("Password verification failed: {}", e)))
    }

    /// [`hash`](Self::hash) on the blocking pool, off the async workers.
    pub async fn hash_blocking(&self, password: String) -> Result<String, AppError> {
        let hasher = *self;
        run_blocking(move || hasher.hash(&password)).await
    }

    /// Check a login attempt against the stored hash of the matching account.
    ///
    /// `stored` is `None` when no account matched; a throwaway hash at the
    /// same cost is computed instead, so an unknown email takes as long as a
    /// wrong password.
    pub async fn verify_blocking(
        &self,
        password: String,
        stored: Option<String>,
    ) -> Result<bool, AppError> {
        let hasher = *self;
        run_blocking(move || match stored {
            Some(hash) => hasher.verify(&password, &hash),
            None => bcrypt::hash(&password, hasher.cost)
                .map(|_| false)
                .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e))),
        })
        .await
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T, AppError>
where
    F: FnOnce() -> Result<T, AppError> + Send + 'static,
    T: Send + 'static,
{
    actix_web::web::block(f)
        .await
        .map_err(|e| AppError::Internal(format!("Password task failed: {}", e)))?
}

/// Requirements:
/// - 8 to 128 characters (bcrypt truncates long input; the cap also bounds work)
/// - At least one digit, one lowercase letter and one uppercase letter
pub fn validate_password_strength(password: &str) -> Result<(), ValidationError> {
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(ValidationError::TooShort(
            "password".to_string(),
            MIN_PASSWORD_LENGTH,
        ));
    }

    if password.len() > MAX_PASSWORD_LENGTH {
        return Err(ValidationError::TooLong(
            "password".to_string(),
            MAX_PASSWORD_LENGTH,
        ));
    }

    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_lowercase = password.chars().any(|c| c.is_lowercase());
    let has_uppercase = password.chars().any(|c| c.is_uppercase());

    if !has_digit || !has_lowercase || !has_uppercase {
        return Err(ValidationError::WeakPassword);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    // Minimum bcrypt cost keeps the suite fast
    fn hasher() -> PasswordHasher {
        PasswordHasher::new(4)
    }

    #[test]
    fn test_hash_and_verify() {
        let hash = hasher().hash("ValidPassword123").expect("Failed to hash password");

        assert!(hash.starts_with("$2"));
        assert!(hasher().verify("ValidPassword123", &hash).unwrap());
        assert!(!hasher().verify("WrongPassword123", &hash).unwrap());
    }

    #[test]
    fn test_policy_rejections() {
        let too_long = "a".repeat(MAX_PASSWORD_LENGTH + 1) + "A1";
        let cases = [
            ("Short1", "too short"),
            (too_long.as_str(), "too long"),
            ("NoDigitsPassword", "no digit"),
            ("NOLOWERCASE1", "no lowercase"),
            ("nouppercase1", "no uppercase"),
        ];

        for (password, reason) in cases {
            assert!(
                validate_password_strength(password).is_err(),
                "should reject password with {}",
                reason
            );
        }
    }

    #[tokio::test]
    async fn test_blocking_verify() {
        let hash = hasher()
            .hash_blocking("ValidPassword123".to_string())
            .await
            .expect("Failed to hash password");

        assert!(hasher()
            .verify_blocking("ValidPassword123".to_string(), Some(hash.clone()))
            .await
            .unwrap());
        assert!(!hasher()
            .verify_blocking("WrongPassword123".to_string(), Some(hash))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_unknown_account_still_pays_for_a_hash() {
        let started = std::time::Instant::now();
        let matched = PasswordHasher::new(10)
            .verify_blocking("ValidPassword123".to_string(), None)
            .await
            .unwrap();

        assert!(!matched);
        // cost 10 is tens of milliseconds on any machine; an early return is microseconds
        assert!(started.elapsed() > std::time::Duration::from_millis(5));
    }

    #[test]
    fn test_verify_against_garbage_hash_is_error() {
        assert!(hasher().verify("ValidPassword123", "not-a-bcrypt-hash").is_err());
    }
}

/// Refresh token values and records
///
/// Refresh tokens are:
/// - 64 random alphanumeric characters, opaque to clients
/// - Persisted only as their SHA-256 digest
/// - Grouped into families; at most one record per family is valid at a time

use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

const REFRESH_TOKEN_LENGTH: usize = 64;

/// Generate a new refresh token value
pub fn generate_refresh_token() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(REFRESH_TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

/// SHA-256 hex digest of a refresh token value; the only form stores keep.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Stored refresh token
///
/// `value_hash` never changes after creation; only `valid` transitions,
/// and only from true to false.
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshTokenRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub family_id: Uuid,
    pub value_hash: String,
    pub valid: bool,
    pub expire_at: DateTime<Utc>,
}

impl RefreshTokenRecord {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expire_at < now
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

/// A freshly created record together with its plaintext value.
///
/// The plaintext exists only here; it goes to the client and nowhere else.
#[derive(Debug, Clone)]
pub struct IssuedRefreshToken {
    pub record: RefreshTokenRecord,
    pub value: String,
}

impl IssuedRefreshToken {
    pub fn new(user_id: Uuid, family_id: Uuid, expire_at: DateTime<Utc>) -> Self {
        let value = generate_refresh_token();
        let record = RefreshTokenRecord {
            id: Uuid::new_v4(),
            user_id,
            family_id,
            value_hash: hash_token(&value),
            valid: true,
            expire_at,
        };
        Self { record, value }
    }
}

/// What callers get back from login and refresh. Nothing else is exposed.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_refresh_token() {
        let token = generate_refresh_token();

        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_token_hashing() {
        let token = generate_refresh_token();
        let hash1 = hash_token(&token);
        let hash2 = hash_token(&token);

        assert_eq!(hash1, hash2);
        assert_ne!(token, hash1);
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_issued_token_matches_its_record() {
        let user_id = Uuid::new_v4();
        let family_id = Uuid::new_v4();
        let issued = IssuedRefreshToken::new(user_id, family_id, Utc::now());

        assert_eq!(issued.record.value_hash, hash_token(&issued.value));
        assert_eq!(issued.record.user_id, user_id);
        assert_eq!(issued.record.family_id, family_id);
        assert!(issued.record.valid);
    }

    #[test]
    fn test_expiry() {
        let past = IssuedRefreshToken::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Utc::now() - chrono::Duration::seconds(1),
        );
        let future = IssuedRefreshToken::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Utc::now() + chrono::Duration::seconds(60),
        );

        assert!(past.record.is_expired());
        assert!(!future.record.is_expired());
    }
}

/// JWT Claims structure
///
/// Payload of an access token. `jti` carries the refresh family id, which is
/// how a presented access token proves which rotation chain it belongs to.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AuthError};
use crate::users::User;

/// JWT Claims for access tokens
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Claims {
    /// Subject (user ID as UUID string)
    pub sub: String,
    pub email: String,
    /// Display name
    pub name: String,
    /// Refresh family id
    pub jti: String,
    /// Zero or more roles
    #[serde(default)]
    pub role: Vec<String>,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    pub iss: String,
    pub aud: String,
}

impl Claims {
    /// Build claims for `user` bound to `family_id`.
    ///
    /// # Arguments
    /// * `user` - Authenticated user
    /// * `family_id` - Refresh family this access token belongs to
    /// * `expiry_seconds` - Token lifetime from now
    /// * `issuer` / `audience` - Values checked on verification
    pub fn new(
        user: &User,
        family_id: Uuid,
        expiry_seconds: i64,
        issuer: &str,
        audience: &str,
    ) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            sub: user.id.to_string(),
            email: user.email.clone(),
            name: user.name.clone(),
            jti: family_id.to_string(),
            role: user.roles.clone(),
            exp: now + expiry_seconds,
            iat: now,
            iss: issuer.to_string(),
            aud: audience.to_string(),
        }
    }

    /// Extract user ID from claims
    ///
    /// # Errors
    /// Returns error if `sub` is not a valid UUID
    pub fn user_id(&self) -> Result<Uuid, AppError> {
        Uuid::parse_str(&self.sub).map_err(|_| AppError::Auth(AuthError::TokenInvalid))
    }

    /// True when these claims were issued for `user_id` within `family_id`.
    pub fn is_bound_to(&self, user_id: Uuid, family_id: Uuid) -> bool {
        // Compare parsed ids so casing differences in the string form don't matter
        let sub_matches = Uuid::parse_str(&self.sub).map_or(false, |sub| sub == user_id);
        let jti_matches = Uuid::parse_str(&self.jti).map_or(false, |jti| jti == family_id);
        sub_matches && jti_matches
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User {
            id: Uuid::new_v4(),
            email: "test@example.com".to_string(),
            name: "Test User".to_string(),
            roles: vec!["admin".to_string(), "user".to_string()],
        }
    }

    #[test]
    fn test_claims_creation() {
        let user = user();
        let family = Uuid::new_v4();
        let claims = Claims::new(&user, family, 60, "iss", "aud");

        assert_eq!(claims.sub, user.id.to_string());
        assert_eq!(claims.email, user.email);
        assert_eq!(claims.name, user.name);
        assert_eq!(claims.jti, family.to_string());
        assert_eq!(claims.role, user.roles);
        assert_eq!(claims.exp - claims.iat, 60);
        assert!(claims.exp > chrono::Utc::now().timestamp());
    }

    #[test]
    fn test_binding() {
        let user = user();
        let family = Uuid::new_v4();
        let claims = Claims::new(&user, family, 60, "iss", "aud");

        assert!(claims.is_bound_to(user.id, family));
        assert!(!claims.is_bound_to(user.id, Uuid::new_v4()));
        assert!(!claims.is_bound_to(Uuid::new_v4(), family));
    }

    #[test]
    fn test_garbage_ids_never_bind() {
        let user = user();
        let family = Uuid::new_v4();
        let mut claims = Claims::new(&user, family, 60, "iss", "aud");
        claims.jti = "JTI-not-a-uuid".to_string();

        assert!(!claims.is_bound_to(user.id, family));
    }

    #[test]
    fn test_role_claim_defaults_to_empty() {
        let json = serde_json::json!({
            "sub": Uuid::new_v4().to_string(),
            "email": "a@b.com",
            "name": "A",
            "jti": Uuid::new_v4().to_string(),
            "exp": 1,
            "iat": 0,
            "iss": "iss",
            "aud": "aud"
        });
        let claims: Claims = serde_json::from_value(json).unwrap();
        assert!(claims.role.is_empty());
    }

    #[test]
    fn test_invalid_user_id() {
        let mut claims = Claims::new(&user(), Uuid::new_v4(), 60, "iss", "aud");
        claims.sub = "invalid-uuid".to_string();

        assert!(claims.user_id().is_err());
    }
}

/// Access token issuance
///
/// Builds the claim set for a user and family and hands it to the signer.

use uuid::Uuid;

use crate::auth::claims::Claims;
use crate::auth::jwt::JwtSigner;
use crate::configuration::JwtSettings;
use crate::error::{AppError, ConfigError};
use crate::users::User;

#[derive(Debug, Clone)]
pub struct AccessTokenIssuer {
    signer: JwtSigner,
    access_token_expiry: i64,
}

impl AccessTokenIssuer {
    /// # Errors
    /// Fails when the signing settings are unusable; callers treat this as fatal.
    pub fn new(config: &JwtSettings) -> Result<Self, ConfigError> {
        Ok(Self {
            signer: JwtSigner::new(config)?,
            access_token_expiry: config.access_token_expiry,
        })
    }

    /// Signed access token for `user` whose `jti` is `family_id`.
    pub fn issue(&self, user: &User, family_id: Uuid) -> Result<String, AppError> {
        let claims = Claims::new(
            user,
            family_id,
            self.access_token_expiry,
            self.signer.issuer(),
            self.signer.audience(),
        );
        self.signer.sign(&claims)
    }

    pub fn signer(&self) -> &JwtSigner {
        &self.signer
    }
}

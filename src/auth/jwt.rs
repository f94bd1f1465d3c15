/// JWT signing and verification
///
/// HS256 over a server-held secret. Holds only key material; no state
/// changes between calls.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};

use crate::auth::claims::Claims;
use crate::configuration::JwtSettings;
use crate::error::{AppError, AuthError, ConfigError};

const ALGORITHM: Algorithm = Algorithm::HS256;

#[derive(Clone)]
pub struct JwtSigner {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    audience: String,
}

impl std::fmt::Debug for JwtSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtSigner")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .finish_non_exhaustive()
    }
}

impl JwtSigner {
    /// Build a signer from settings.
    ///
    /// # Errors
    /// `ConfigError::SigningKey` when the secret, issuer or audience is unusable.
    pub fn new(config: &JwtSettings) -> Result<Self, ConfigError> {
        config.validate()?;
        let secret = config.secret.as_bytes();
        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
        })
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn audience(&self) -> &str {
        &self.audience
    }

    pub fn sign(&self, claims: &Claims) -> Result<String, AppError> {
        encode(&Header::new(ALGORITHM), claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))
    }

    /// Verify signature, issuer, audience and expiry.
    ///
    /// # Errors
    /// `AuthError::TokenInvalid` for anything that fails verification
    pub fn verify(&self, token: &str) -> Result<Claims, AppError> {
        self.decode_with(token, self.validation(true))
    }

    /// Verify signature, issuer and audience but accept an expired token.
    ///
    /// Only for the refresh binding check: the access token presented
    /// alongside a refresh token has normally expired already.
    pub fn verify_allow_expired(&self, token: &str) -> Result<Claims, AppError> {
        self.decode_with(token, self.validation(false))
    }

    fn validation(&self, check_expiry: bool) -> Validation {
        let mut validation = Validation::new(ALGORITHM);
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        validation.validate_exp = check_expiry;
        validation.leeway = 0;
        validation
    }

    fn decode_with(&self, token: &str, validation: Validation) -> Result<Claims, AppError> {
        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(error = %e, "JWT validation error");
                AppError::Auth(AuthError::TokenInvalid)
            })
    }
}

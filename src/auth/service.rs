/// Authentication service
///
/// Entry point used by the HTTP layer: registration and login go to the user
/// directory, refresh and revoke go to the rotation and revocation engines.

use std::sync::Arc;

use uuid::Uuid;

use crate::auth::issuer::AccessTokenIssuer;
use crate::auth::jwt::JwtSigner;
use crate::auth::refresh_token::TokenPair;
use crate::auth::revocation::RevocationEngine;
use crate::auth::rotation::RotationEngine;
use crate::error::{AppError, AuthError};
use crate::store::TokenStore;
use crate::users::{NewUser, User, UserDirectory};

#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn TokenStore>,
    users: Arc<dyn UserDirectory>,
    issuer: Arc<AccessTokenIssuer>,
    rotation: RotationEngine,
    revocation: RevocationEngine,
}

impl AuthService {
    pub fn new(
        store: Arc<dyn TokenStore>,
        users: Arc<dyn UserDirectory>,
        issuer: AccessTokenIssuer,
    ) -> Self {
        let issuer = Arc::new(issuer);
        Self {
            rotation: RotationEngine::new(store.clone(), users.clone(), issuer.clone()),
            revocation: RevocationEngine::new(store.clone(), issuer.clone()),
            store,
            users,
            issuer,
        }
    }

    pub async fn register(&self, new_user: NewUser) -> Result<User, AppError> {
        let user = self.users.register(new_user).await?;
        tracing::info!(user_id = %user.id, "User registered");
        Ok(user)
    }

    /// Check credentials and start a new refresh family.
    ///
    /// # Errors
    /// `AuthError::InvalidCredentials` without saying which part was wrong
    pub async fn login(&self, email: &str, password: &str) -> Result<TokenPair, AppError> {
        let user = self
            .users
            .verify_credentials(email, password)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        let family_id = Uuid::new_v4();
        let issued = self.store.create(user.id, family_id).await?;
        let access_token = self.issuer.issue(&user, family_id)?;

        tracing::info!(
            user_id = %user.id,
            family_id = %family_id,
            "User logged in, refresh family started"
        );

        Ok(TokenPair {
            access_token,
            refresh_token: issued.value,
        })
    }

    pub async fn refresh(&self, access_token: &str, refresh_token: &str) -> Result<TokenPair, AppError> {
        self.rotation.rotate(access_token, refresh_token).await
    }

    pub async fn revoke(&self, access_token: &str, refresh_token: &str) -> Result<(), AppError> {
        self.revocation.revoke(access_token, refresh_token).await
    }

    /// Signer for full access token verification on protected routes.
    pub fn signer(&self) -> &JwtSigner {
        self.issuer.signer()
    }
}

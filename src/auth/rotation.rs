/// Refresh token rotation
///
/// Checks run in a fixed order: lookup, binding, reuse, expiry, rotate.
/// Reuse is checked before expiry so that replaying a consumed token after it
/// expired still revokes the whole family.

use std::sync::Arc;

use crate::auth::issuer::AccessTokenIssuer;
use crate::auth::refresh_token::{RefreshTokenRecord, TokenPair};
use crate::auth::revocation::{RevocationEngine, RevocationReason};
use crate::error::{AppError, TokenError};
use crate::store::{RotateOutcome, TokenStore};
use crate::users::UserDirectory;

/// Look up the presented refresh value and bind it to the presented access token.
///
/// The access token may be expired but must carry a valid signature, issuer
/// and audience, and its `sub`/`jti` must equal the record's user and family.
/// On mismatch only this record is invalidated; a mismatch can be a confused
/// client rather than theft.
///
/// # Errors
/// - `TokenError::NotFound` when no record has this value
/// - `TokenError::Mismatch` when the access token does not bind
pub(crate) async fn resolve_bound_record(
    store: &dyn TokenStore,
    issuer: &AccessTokenIssuer,
    access_token: &str,
    refresh_token: &str,
) -> Result<RefreshTokenRecord, AppError> {
    let record = store
        .find_by_value(refresh_token)
        .await?
        .ok_or(TokenError::NotFound)?;

    let bound = issuer
        .signer()
        .verify_allow_expired(access_token)
        .map(|claims| claims.is_bound_to(record.user_id, record.family_id))
        .unwrap_or(false);

    if !bound {
        tracing::warn!(
            user_id = %record.user_id,
            record_id = %record.id,
            "Access token does not match refresh token"
        );
        store.invalidate(record.id).await?;
        return Err(TokenError::Mismatch.into());
    }

    Ok(record)
}

#[derive(Clone)]
pub struct RotationEngine {
    store: Arc<dyn TokenStore>,
    users: Arc<dyn UserDirectory>,
    issuer: Arc<AccessTokenIssuer>,
    revocation: RevocationEngine,
}

impl RotationEngine {
    pub fn new(
        store: Arc<dyn TokenStore>,
        users: Arc<dyn UserDirectory>,
        issuer: Arc<AccessTokenIssuer>,
    ) -> Self {
        let revocation = RevocationEngine::new(store.clone(), issuer.clone());
        Self {
            store,
            users,
            issuer,
            revocation,
        }
    }

    /// Exchange a (possibly expired) access token and its refresh token for a
    /// new pair in the same family.
    ///
    /// # Errors
    /// - `TokenError::*` for every rejected pair; see module docs for order
    /// - `DatabaseError` when the store is unavailable
    pub async fn rotate(
        &self,
        access_token: &str,
        refresh_token: &str,
    ) -> Result<TokenPair, AppError> {
        let record =
            resolve_bound_record(self.store.as_ref(), &self.issuer, access_token, refresh_token)
                .await?;

        if !record.valid {
            return Err(self.contain_reuse(&record).await);
        }

        if record.is_expired() {
            self.store.invalidate(record.id).await?;
            tracing::warn!(
                user_id = %record.user_id,
                record_id = %record.id,
                "Refresh token expired"
            );
            return Err(TokenError::Expired.into());
        }

        let Some(user) = self.users.find_by_id(record.user_id).await? else {
            // Deleted or deactivated account: nothing in this chain may be redeemed again
            self.revocation
                .revoke_family(record.user_id, record.family_id, RevocationReason::UserUnavailable)
                .await?;
            return Err(TokenError::NotFound.into());
        };

        let successor = match self.store.rotate(&record).await? {
            RotateOutcome::Rotated(successor) => successor,
            // A concurrent request consumed this record between lookup and swap
            RotateOutcome::AlreadyConsumed => return Err(self.contain_reuse(&record).await),
        };

        let access_token = self.issuer.issue(&user, record.family_id)?;

        tracing::info!(
            user_id = %record.user_id,
            family_id = %record.family_id,
            record_id = %successor.record.id,
            "Refresh token rotated"
        );

        Ok(TokenPair {
            access_token,
            refresh_token: successor.value,
        })
    }

    /// Replay of a consumed token: revoke the whole family, then report reuse.
    ///
    /// If the revocation itself fails the store error is returned instead, so
    /// the caller sees a retryable failure and not a completed rejection.
    async fn contain_reuse(&self, record: &RefreshTokenRecord) -> AppError {
        tracing::error!(
            user_id = %record.user_id,
            family_id = %record.family_id,
            record_id = %record.id,
            "Refresh token reuse detected, revoking family"
        );

        match self
            .revocation
            .revoke_family(record.user_id, record.family_id, RevocationReason::ReuseDetected)
            .await
        {
            Ok(_) => TokenError::Reused.into(),
            Err(e) => e,
        }
    }
}

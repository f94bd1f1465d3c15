/// Family revocation
///
/// Ends a rotation chain: every record of the family becomes invalid. Used
/// for logout and, internally, to contain a replayed refresh token.

use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

use crate::auth::issuer::AccessTokenIssuer;
use crate::auth::rotation::resolve_bound_record;
use crate::error::AppError;
use crate::store::TokenStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevocationReason {
    Logout,
    ReuseDetected,
    UserUnavailable,
}

impl fmt::Display for RevocationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RevocationReason::Logout => write!(f, "logout"),
            RevocationReason::ReuseDetected => write!(f, "reuse_detected"),
            RevocationReason::UserUnavailable => write!(f, "user_unavailable"),
        }
    }
}

#[derive(Clone)]
pub struct RevocationEngine {
    store: Arc<dyn TokenStore>,
    issuer: Arc<AccessTokenIssuer>,
}

impl RevocationEngine {
    pub fn new(store: Arc<dyn TokenStore>, issuer: Arc<AccessTokenIssuer>) -> Self {
        Self { store, issuer }
    }

    /// Revoke the family of a presented pair.
    ///
    /// The pair must pass the same lookup and binding check as a refresh, so
    /// only a holder of a matching pair can end the chain. The current record's
    /// validity and expiry do not matter.
    pub async fn revoke(&self, access_token: &str, refresh_token: &str) -> Result<(), AppError> {
        let record =
            resolve_bound_record(self.store.as_ref(), &self.issuer, access_token, refresh_token)
                .await?;

        self.revoke_family(record.user_id, record.family_id, RevocationReason::Logout)
            .await?;
        Ok(())
    }

    /// Invalidate every record of `family_id`. Completes before returning.
    pub async fn revoke_family(
        &self,
        user_id: Uuid,
        family_id: Uuid,
        reason: RevocationReason,
    ) -> Result<u64, AppError> {
        let revoked = self.store.invalidate_family(user_id, family_id).await?;

        tracing::info!(
            user_id = %user_id,
            family_id = %family_id,
            reason = %reason,
            revoked,
            "Refresh token family revoked"
        );
        Ok(revoked)
    }
}

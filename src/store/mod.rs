/// Refresh token persistence
///
/// The only storage abstraction the rotation protocol depends on. Every
/// mutating call is atomic on its own; `rotate` is the compound
/// "invalidate current, insert successor" unit and succeeds for at most
/// one caller per record.

mod memory;
mod postgres;

pub use memory::InMemoryTokenStore;
pub use postgres::PgTokenStore;

use uuid::Uuid;

use crate::auth::{IssuedRefreshToken, RefreshTokenRecord};
use crate::error::DatabaseError;

/// Result of [`TokenStore::rotate`]
#[derive(Debug)]
pub enum RotateOutcome {
    /// The presented record was still valid; it is now invalid and this is its successor.
    Rotated(IssuedRefreshToken),
    /// Another caller invalidated the record first. Nothing was written.
    AlreadyConsumed,
}

#[async_trait::async_trait]
pub trait TokenStore: Send + Sync {
    /// Insert a new valid record for `family_id`, expiring one refresh
    /// lifetime from now.
    ///
    /// # Errors
    /// `UniqueConstraintViolation` if the generated value collides.
    async fn create(&self, user_id: Uuid, family_id: Uuid)
        -> Result<IssuedRefreshToken, DatabaseError>;

    async fn find_by_value(&self, value: &str)
        -> Result<Option<RefreshTokenRecord>, DatabaseError>;

    /// Mark one record invalid. Idempotent.
    async fn invalidate(&self, record_id: Uuid) -> Result<(), DatabaseError>;

    /// Mark every record of the family invalid. Returns how many changed;
    /// zero is not an error.
    async fn invalidate_family(&self, user_id: Uuid, family_id: Uuid)
        -> Result<u64, DatabaseError>;

    /// Compare-and-swap `current.valid` from true to false and insert its
    /// successor (same user, same family, new value) in one atomic unit.
    async fn rotate(&self, current: &RefreshTokenRecord) -> Result<RotateOutcome, DatabaseError>;

    /// All records of a family, oldest first.
    async fn list_family(&self, family_id: Uuid) -> Result<Vec<RefreshTokenRecord>, DatabaseError>;
}

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{Duration, Utc};
use uuid::Uuid;

use super::{RotateOutcome, TokenStore};
use crate::auth::{hash_token, IssuedRefreshToken, RefreshTokenRecord};
use crate::error::DatabaseError;

type Chain = Arc<Mutex<Vec<RefreshTokenRecord>>>;

/// In-process token store.
///
/// Each family has its own mutex, so operations on different families never
/// wait on each other. The index maps are only held for short lookups and
/// never while acquiring a family lock, except by writers that already hold
/// the family lock (lock order: family, then index).
pub struct InMemoryTokenStore {
    refresh_ttl: Duration,
    families: RwLock<HashMap<Uuid, Chain>>,
    /// value digest -> (family id, record id)
    by_hash: RwLock<HashMap<String, (Uuid, Uuid)>>,
    /// record id -> family id
    by_id: RwLock<HashMap<Uuid, Uuid>>,
}

fn poisoned<T>(_: PoisonError<T>) -> DatabaseError {
    DatabaseError::ConnectionPool("token store lock poisoned".to_string())
}

impl InMemoryTokenStore {
    pub fn new(refresh_ttl: Duration) -> Self {
        Self {
            refresh_ttl,
            families: RwLock::new(HashMap::new()),
            by_hash: RwLock::new(HashMap::new()),
            by_id: RwLock::new(HashMap::new()),
        }
    }

    fn chain(&self, family_id: Uuid) -> Result<Option<Chain>, DatabaseError> {
        let families = self.families.read().map_err(poisoned)?;
        Ok(families.get(&family_id).cloned())
    }

    fn chain_or_insert(&self, family_id: Uuid) -> Result<Chain, DatabaseError> {
        if let Some(chain) = self.chain(family_id)? {
            return Ok(chain);
        }
        let mut families = self.families.write().map_err(poisoned)?;
        Ok(families.entry(family_id).or_default().clone())
    }

    /// Index and append `issued` to a chain whose lock the caller holds.
    fn append(
        &self,
        records: &mut Vec<RefreshTokenRecord>,
        issued: &IssuedRefreshToken,
    ) -> Result<(), DatabaseError> {
        let record = &issued.record;
        {
            let mut by_hash = self.by_hash.write().map_err(poisoned)?;
            if by_hash.contains_key(&record.value_hash) {
                return Err(DatabaseError::UniqueConstraintViolation(
                    "refresh token value already exists".to_string(),
                ));
            }
            by_hash.insert(record.value_hash.clone(), (record.family_id, record.id));
        }
        self.by_id
            .write()
            .map_err(poisoned)?
            .insert(record.id, record.family_id);
        records.push(record.clone());
        Ok(())
    }

    fn create_sync(&self, user_id: Uuid, family_id: Uuid) -> Result<IssuedRefreshToken, DatabaseError> {
        let chain = self.chain_or_insert(family_id)?;
        let mut records = chain.lock().map_err(poisoned)?;
        let issued = IssuedRefreshToken::new(user_id, family_id, Utc::now() + self.refresh_ttl);
        self.append(&mut records, &issued)?;
        Ok(issued)
    }

    fn find_sync(&self, value: &str) -> Result<Option<RefreshTokenRecord>, DatabaseError> {
        let located = self
            .by_hash
            .read()
            .map_err(poisoned)?
            .get(&hash_token(value))
            .copied();
        let Some((family_id, record_id)) = located else {
            return Ok(None);
        };
        let Some(chain) = self.chain(family_id)? else {
            return Ok(None);
        };
        let records = chain.lock().map_err(poisoned)?;
        Ok(records.iter().find(|r| r.id == record_id).cloned())
    }

    fn invalidate_sync(&self, record_id: Uuid) -> Result<(), DatabaseError> {
        let family_id = self.by_id.read().map_err(poisoned)?.get(&record_id).copied();
        let Some(chain) = family_id.map(|f| self.chain(f)).transpose()?.flatten() else {
            return Ok(());
        };
        let mut records = chain.lock().map_err(poisoned)?;
        if let Some(record) = records.iter_mut().find(|r| r.id == record_id) {
            record.valid = false;
        }
        Ok(())
    }

    fn invalidate_family_sync(&self, user_id: Uuid, family_id: Uuid) -> Result<u64, DatabaseError> {
        let Some(chain) = self.chain(family_id)? else {
            return Ok(0);
        };
        let mut records = chain.lock().map_err(poisoned)?;
        let mut changed = 0;
        for record in records
            .iter_mut()
            .filter(|r| r.user_id == user_id && r.valid)
        {
            record.valid = false;
            changed += 1;
        }
        Ok(changed)
    }

    fn rotate_sync(&self, current: &RefreshTokenRecord) -> Result<RotateOutcome, DatabaseError> {
        let Some(chain) = self.chain(current.family_id)? else {
            return Ok(RotateOutcome::AlreadyConsumed);
        };
        let mut records = chain.lock().map_err(poisoned)?;

        match records.iter_mut().find(|r| r.id == current.id) {
            Some(record) if record.valid => record.valid = false,
            _ => return Ok(RotateOutcome::AlreadyConsumed),
        }

        let successor = IssuedRefreshToken::new(
            current.user_id,
            current.family_id,
            Utc::now() + self.refresh_ttl,
        );
        if let Err(e) = self.append(&mut records, &successor) {
            // Undo the swap so a failed insert leaves the chain as it was
            if let Some(record) = records.iter_mut().find(|r| r.id == current.id) {
                record.valid = true;
            }
            return Err(e);
        }
        Ok(RotateOutcome::Rotated(successor))
    }

    fn list_family_sync(&self, family_id: Uuid) -> Result<Vec<RefreshTokenRecord>, DatabaseError> {
        let Some(chain) = self.chain(family_id)? else {
            return Ok(Vec::new());
        };
        let records = chain.lock().map_err(poisoned)?;
        Ok(records.clone())
    }
}

#[async_trait::async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn create(
        &self,
        user_id: Uuid,
        family_id: Uuid,
    ) -> Result<IssuedRefreshToken, DatabaseError> {
        self.create_sync(user_id, family_id)
    }

    async fn find_by_value(&self, value: &str) -> Result<Option<RefreshTokenRecord>, DatabaseError> {
        self.find_sync(value)
    }

    async fn invalidate(&self, record_id: Uuid) -> Result<(), DatabaseError> {
        self.invalidate_sync(record_id)
    }

    async fn invalidate_family(&self, user_id: Uuid, family_id: Uuid) -> Result<u64, DatabaseError> {
        self.invalidate_family_sync(user_id, family_id)
    }

    async fn rotate(&self, current: &RefreshTokenRecord) -> Result<RotateOutcome, DatabaseError> {
        self.rotate_sync(current)
    }

    async fn list_family(&self, family_id: Uuid) -> Result<Vec<RefreshTokenRecord>, DatabaseError> {
        self.list_family_sync(family_id)
    }
}

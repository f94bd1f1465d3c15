use chrono::{DateTime, Duration, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{RotateOutcome, TokenStore};
use crate::auth::{hash_token, IssuedRefreshToken, RefreshTokenRecord};
use crate::error::DatabaseError;

type RecordRow = (Uuid, Uuid, Uuid, String, bool, DateTime<Utc>);

fn into_record(row: RecordRow) -> RefreshTokenRecord {
    let (id, user_id, family_id, value_hash, valid, expire_at) = row;
    RefreshTokenRecord {
        id,
        user_id,
        family_id,
        value_hash,
        valid,
        expire_at,
    }
}

/// Postgres-backed token store
///
/// Uniqueness of values comes from the unique index on `token_hash`.
/// Every mutation of an existing family runs in a transaction holding that
/// family's advisory lock, so rotation and revocation of one family are
/// serialized while different families never wait on each other. The
/// `is_valid = true` guard on the invalidating UPDATE makes rotation
/// single-winner.
#[derive(Clone)]
pub struct PgTokenStore {
    pool: PgPool,
    refresh_ttl: Duration,
}

impl PgTokenStore {
    pub fn new(pool: PgPool, refresh_ttl: Duration) -> Self {
        Self { pool, refresh_ttl }
    }
}

async fn insert_record<'e, E>(executor: E, record: &RefreshTokenRecord) -> Result<(), DatabaseError>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    sqlx::query(
        r#"
        INSERT INTO refresh_tokens (id, user_id, family_id, token_hash, is_valid, expires_at, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(record.id)
    .bind(record.user_id)
    .bind(record.family_id)
    .bind(&record.value_hash)
    .bind(record.valid)
    .bind(record.expire_at)
    .bind(Utc::now())
    .execute(executor)
    .await?;

    Ok(())
}

/// Serialize every writer of one family until the transaction ends.
///
/// Row locks alone are not enough: a successor inserted by a concurrent
/// rotation is invisible to an UPDATE that started before it committed.
async fn lock_family(
    tx: &mut Transaction<'_, Postgres>,
    family_id: Uuid,
) -> Result<(), DatabaseError> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1::text))")
        .bind(family_id)
        .execute(&mut *tx)
        .await?;
    Ok(())
}

#[async_trait::async_trait]
impl TokenStore for PgTokenStore {
    async fn create(
        &self,
        user_id: Uuid,
        family_id: Uuid,
    ) -> Result<IssuedRefreshToken, DatabaseError> {
        let issued = IssuedRefreshToken::new(user_id, family_id, Utc::now() + self.refresh_ttl);
        insert_record(&self.pool, &issued.record).await?;
        Ok(issued)
    }

    async fn find_by_value(&self, value: &str) -> Result<Option<RefreshTokenRecord>, DatabaseError> {
        let row = sqlx::query_as::<_, RecordRow>(
            r#"
            SELECT id, user_id, family_id, token_hash, is_valid, expires_at
            FROM refresh_tokens
            WHERE token_hash = $1
            "#,
        )
        .bind(hash_token(value))
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(into_record))
    }

    async fn invalidate(&self, record_id: Uuid) -> Result<(), DatabaseError> {
        let mut tx = self.pool.begin().await?;

        let family = sqlx::query_as::<_, (Uuid,)>(
            "SELECT family_id FROM refresh_tokens WHERE id = $1",
        )
        .bind(record_id)
        .fetch_optional(&mut tx)
        .await?;
        let Some((family_id,)) = family else {
            tx.rollback().await?;
            return Ok(());
        };

        lock_family(&mut tx, family_id).await?;
        sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET is_valid = false, invalidated_at = $1
            WHERE id = $2 AND is_valid = true
            "#,
        )
        .bind(Utc::now())
        .bind(record_id)
        .execute(&mut tx)
        .await?;
        tx.commit().await?;

        Ok(())
    }

    async fn invalidate_family(&self, user_id: Uuid, family_id: Uuid) -> Result<u64, DatabaseError> {
        let mut tx = self.pool.begin().await?;
        lock_family(&mut tx, family_id).await?;

        // Runs after the lock, so it sees any successor committed by a rotation
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET is_valid = false, invalidated_at = $1
            WHERE user_id = $2 AND family_id = $3 AND is_valid = true
            "#,
        )
        .bind(Utc::now())
        .bind(user_id)
        .bind(family_id)
        .execute(&mut tx)
        .await?;
        tx.commit().await?;

        Ok(result.rows_affected())
    }

    async fn rotate(&self, current: &RefreshTokenRecord) -> Result<RotateOutcome, DatabaseError> {
        let mut tx = self.pool.begin().await?;
        lock_family(&mut tx, current.family_id).await?;

        let swapped = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET is_valid = false, invalidated_at = $1
            WHERE id = $2 AND is_valid = true
            "#,
        )
        .bind(Utc::now())
        .bind(current.id)
        .execute(&mut tx)
        .await?;

        if swapped.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(RotateOutcome::AlreadyConsumed);
        }

        let successor = IssuedRefreshToken::new(
            current.user_id,
            current.family_id,
            Utc::now() + self.refresh_ttl,
        );
        insert_record(&mut tx, &successor.record).await?;
        tx.commit().await?;

        Ok(RotateOutcome::Rotated(successor))
    }

    async fn list_family(&self, family_id: Uuid) -> Result<Vec<RefreshTokenRecord>, DatabaseError> {
        let rows = sqlx::query_as::<_, RecordRow>(
            r#"
            SELECT id, user_id, family_id, token_hash, is_valid, expires_at
            FROM refresh_tokens
            WHERE family_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(family_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(into_record).collect())
    }
}

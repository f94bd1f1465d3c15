use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use super::{NewUser, User, UserDirectory};
use crate::auth::PasswordHasher;
use crate::error::AppError;

/// `users` table backed directory
#[derive(Clone)]
pub struct PgUserDirectory {
    pool: PgPool,
    hasher: PasswordHasher,
}

impl PgUserDirectory {
    pub fn new(pool: PgPool, hasher: PasswordHasher) -> Self {
        Self { pool, hasher }
    }
}

#[async_trait::async_trait]
impl UserDirectory for PgUserDirectory {
    async fn verify_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<User>, AppError> {
        let row = sqlx::query_as::<_, (Uuid, String, String, Vec<String>, String)>(
            r#"
            SELECT id, email, name, roles, password_hash
            FROM users
            WHERE lower(email) = lower($1) AND is_active = true
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        let (user, stored) = match row {
            Some((id, email, name, roles, password_hash)) => (
                Some(User {
                    id,
                    email,
                    name,
                    roles,
                }),
                Some(password_hash),
            ),
            None => (None, None),
        };

        let matched = self
            .hasher
            .verify_blocking(password.to_string(), stored)
            .await?;
        Ok(user.filter(|_| matched))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        let row = sqlx::query_as::<_, (Uuid, String, String, Vec<String>)>(
            "SELECT id, email, name, roles FROM users WHERE id = $1 AND is_active = true",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(id, email, name, roles)| User {
            id,
            email,
            name,
            roles,
        }))
    }

    async fn register(&self, new_user: NewUser) -> Result<User, AppError> {
        let password_hash = self.hasher.hash_blocking(new_user.password.clone()).await?;
        let user_id = Uuid::new_v4();
        let now = Utc::now();

        // Duplicates, in any letter case, hit users_email_lower_idx and surface
        // as DatabaseError::UniqueConstraintViolation
        sqlx::query(
            r#"
            INSERT INTO users (id, email, name, password_hash, roles, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(user_id)
        .bind(&new_user.email)
        .bind(&new_user.name)
        .bind(&password_hash)
        .bind(&new_user.roles)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(User {
            id: user_id,
            email: new_user.email,
            name: new_user.name,
            roles: new_user.roles,
        })
    }
}

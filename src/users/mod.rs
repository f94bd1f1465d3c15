/// User directory boundary
///
/// Credential storage and password checks live behind [`UserDirectory`].
/// The token core only reads the resulting [`User`] to fill claims.

mod memory;
mod postgres;

pub use memory::InMemoryUserDirectory;
pub use postgres::PgUserDirectory;

use uuid::Uuid;

use crate::error::AppError;

pub const DEFAULT_ROLE: &str = "user";

#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub roles: Vec<String>,
}

/// Registration input, already shape-validated.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub name: String,
    pub password: String,
    pub roles: Vec<String>,
}

#[async_trait::async_trait]
pub trait UserDirectory: Send + Sync {
    /// `Ok(None)` for unknown email, wrong password or inactive account.
    /// The caller must not be able to tell these apart.
    async fn verify_credentials(&self, email: &str, password: &str)
        -> Result<Option<User>, AppError>;

    /// Active user by id.
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError>;

    /// # Errors
    /// - `DatabaseError::UniqueConstraintViolation` when the email is taken
    /// - `ValidationError` when the password breaks the policy
    async fn register(&self, new_user: NewUser) -> Result<User, AppError>;
}

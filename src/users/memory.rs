use std::collections::HashMap;
use std::sync::RwLock;

use uuid::Uuid;

use super::{NewUser, User, UserDirectory};
use crate::auth::PasswordHasher;
use crate::error::{AppError, DatabaseError};

struct StoredUser {
    user: User,
    password_hash: String,
    is_active: bool,
}

/// Per-instance user directory for tests and local runs.
pub struct InMemoryUserDirectory {
    hasher: PasswordHasher,
    users: RwLock<HashMap<Uuid, StoredUser>>,
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> AppError {
    AppError::Database(DatabaseError::ConnectionPool(
        "user directory lock poisoned".to_string(),
    ))
}

impl InMemoryUserDirectory {
    pub fn new(hasher: PasswordHasher) -> Self {
        Self {
            hasher,
            users: RwLock::new(HashMap::new()),
        }
    }

    /// Mark a user inactive; they can no longer log in or refresh.
    pub fn deactivate(&self, id: Uuid) -> Result<bool, AppError> {
        let mut users = self.users.write().map_err(poisoned)?;
        Ok(users.get_mut(&id).map(|u| u.is_active = false).is_some())
    }
}

#[async_trait::async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn verify_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<User>, AppError> {
        let candidate = {
            let users = self.users.read().map_err(poisoned)?;
            users
                .values()
                .find(|u| u.is_active && u.user.email.eq_ignore_ascii_case(email))
                .map(|u| (u.user.clone(), u.password_hash.clone()))
        };

        let (user, stored) = match candidate {
            Some((user, hash)) => (Some(user), Some(hash)),
            None => (None, None),
        };

        let matched = self
            .hasher
            .verify_blocking(password.to_string(), stored)
            .await?;
        Ok(user.filter(|_| matched))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        let users = self.users.read().map_err(poisoned)?;
        Ok(users
            .get(&id)
            .filter(|u| u.is_active)
            .map(|u| u.user.clone()))
    }

    async fn register(&self, new_user: NewUser) -> Result<User, AppError> {
        let password_hash = self.hasher.hash_blocking(new_user.password.clone()).await?;

        let mut users = self.users.write().map_err(poisoned)?;
        if users
            .values()
            .any(|u| u.user.email.eq_ignore_ascii_case(&new_user.email))
        {
            return Err(AppError::Database(DatabaseError::UniqueConstraintViolation(
                "Email already registered".to_string(),
            )));
        }

        let user = User {
            id: Uuid::new_v4(),
            email: new_user.email,
            name: new_user.name,
            roles: new_user.roles,
        };
        users.insert(
            user.id,
            StoredUser {
                user: user.clone(),
                password_hash,
                is_active: true,
            },
        );
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory() -> InMemoryUserDirectory {
        InMemoryUserDirectory::new(PasswordHasher::new(4))
    }

    fn new_user(email: &str) -> NewUser {
        NewUser {
            email: email.to_string(),
            name: "John Doe".to_string(),
            password: "SecurePass123".to_string(),
            roles: vec!["user".to_string()],
        }
    }

    #[tokio::test]
    async fn test_register_then_verify() {
        let directory = directory();
        let user = directory.register(new_user("john@example.com")).await.unwrap();

        let verified = directory
            .verify_credentials("john@example.com", "SecurePass123")
            .await
            .unwrap();
        assert_eq!(verified, Some(user.clone()));

        let wrong = directory
            .verify_credentials("john@example.com", "WrongPass123")
            .await
            .unwrap();
        assert!(wrong.is_none());

        assert_eq!(directory.find_by_id(user.id).await.unwrap(), Some(user));
    }

    #[tokio::test]
    async fn test_duplicate_email_is_conflict() {
        let directory = directory();
        directory.register(new_user("john@example.com")).await.unwrap();

        let err = directory
            .register(new_user("JOHN@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::Database(DatabaseError::UniqueConstraintViolation(_))
        ));
    }

    #[tokio::test]
    async fn test_weak_password_propagates() {
        let mut weak = new_user("weak@example.com");
        weak.password = "weak".to_string();

        let err = directory().register(weak).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_deactivated_user_is_hidden() {
        let directory = directory();
        let user = directory.register(new_user("john@example.com")).await.unwrap();

        assert!(directory.deactivate(user.id).unwrap());
        assert!(directory.find_by_id(user.id).await.unwrap().is_none());
        assert!(directory
            .verify_credentials("john@example.com", "SecurePass123")
            .await
            .unwrap()
            .is_none());
    }
}

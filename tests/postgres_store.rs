//! Postgres-backed store and directory. Needs a running database configured
//! through `configuration.yaml` / `APP_DATABASE__*`; run with `--ignored`.

use std::sync::Arc;

use refresh_guard::auth::{AccessTokenIssuer, AuthService, PasswordHasher};
use refresh_guard::configuration::{get_configuration, DatabaseSettings, Settings};
use refresh_guard::error::{AppError, DatabaseError, TokenError};
use refresh_guard::store::{PgTokenStore, RotateOutcome, TokenStore};
use refresh_guard::users::{NewUser, PgUserDirectory, UserDirectory};
use sqlx::{Connection, Executor, PgConnection, PgPool};
use uuid::Uuid;

pub async fn configure_database(config: &DatabaseSettings) -> PgPool {
    let mut connection = PgConnection::connect(&config.connection_string_without_db())
        .await
        .expect("Failed to connect to Postgres");
    connection
        .execute(&*format!(r#"CREATE DATABASE "{}";"#, config.database_name))
        .await
        .expect("Failed to create database.");

    let connection_pool = PgPool::connect(&config.connection_string())
        .await
        .expect("Failed to connect to Postgres.");
    sqlx::migrate!("./migrations")
        .run(&connection_pool)
        .await
        .expect("Failed to migrate the database.");
    connection_pool
}

async fn test_settings() -> (Settings, PgPool) {
    let mut configuration = get_configuration().expect("Failed to read configuration.");
    configuration.database.database_name = Uuid::new_v4().to_string();
    let pool = configure_database(&configuration.database).await;
    (configuration, pool)
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
#[ignore]
async fn store_persists_only_the_digest() {
    let (configuration, pool) = test_settings().await;
    let users = PgUserDirectory::new(pool.clone(), PasswordHasher::new(4));
    let store = PgTokenStore::new(pool.clone(), configuration.jwt.refresh_ttl());

    let user = users.register(new_user("john@example.com")).await.unwrap();
    let issued = store.create(user.id, Uuid::new_v4()).await.unwrap();

    let (stored,): (String,) = sqlx::query_as("SELECT token_hash FROM refresh_tokens WHERE id = $1")
        .bind(issued.record.id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_ne!(stored, issued.value);
    assert_eq!(stored, issued.record.value_hash);

    let found = store.find_by_value(&issued.value).await.unwrap().unwrap();
    assert_eq!(found.id, issued.record.id);
    assert!(found.valid);
}

#[tokio::test]
#[ignore]
async fn rotate_swaps_once_and_keeps_family() {
    let (configuration, pool) = test_settings().await;
    let users = PgUserDirectory::new(pool.clone(), PasswordHasher::new(4));
    let store = PgTokenStore::new(pool, configuration.jwt.refresh_ttl());

    let user = users.register(new_user("john@example.com")).await.unwrap();
    let family_id = Uuid::new_v4();
    let first = store.create(user.id, family_id).await.unwrap();

    let successor = match store.rotate(&first.record).await.unwrap() {
        RotateOutcome::Rotated(successor) => successor,
        RotateOutcome::AlreadyConsumed => panic!("first rotation must win"),
    };
    assert_eq!(successor.record.family_id, family_id);
    assert_ne!(successor.value, first.value);

    assert!(matches!(
        store.rotate(&first.record).await.unwrap(),
        RotateOutcome::AlreadyConsumed
    ));

    let chain = store.list_family(family_id).await.unwrap();
    assert_eq!(chain.len(), 2);
    assert_eq!(chain.iter().filter(|r| r.valid).count(), 1);
    assert_eq!(chain[0].id, first.record.id);

    assert_eq!(store.invalidate_family(user.id, family_id).await.unwrap(), 1);
    assert_eq!(store.invalidate_family(user.id, family_id).await.unwrap(), 0);
}

#[tokio::test]
#[ignore]
async fn duplicate_email_is_a_conflict() {
    let (_, pool) = test_settings().await;
    let users = PgUserDirectory::new(pool, PasswordHasher::new(4));

    users.register(new_user("john@example.com")).await.unwrap();
    let duplicate = users.register(new_user("john@example.com")).await;

    assert!(matches!(
        duplicate,
        Err(AppError::Database(DatabaseError::UniqueConstraintViolation(_)))
    ));
}

#[tokio::test]
#[ignore]
async fn replay_revokes_family_in_postgres() {
    let (configuration, pool) = test_settings().await;
    let store = Arc::new(PgTokenStore::new(pool.clone(), configuration.jwt.refresh_ttl()));
    let users = Arc::new(PgUserDirectory::new(pool, PasswordHasher::new(4)));
    let issuer = AccessTokenIssuer::new(&configuration.jwt).expect("valid signing settings");
    let auth = AuthService::new(store.clone(), users, issuer);

    auth.register(new_user("john@example.com")).await.unwrap();
    let first = auth.login("john@example.com", "SecurePass123").await.unwrap();
    let family_id = store
        .find_by_value(&first.refresh_token)
        .await
        .unwrap()
        .unwrap()
        .family_id;

    let second = auth
        .refresh(&first.access_token, &first.refresh_token)
        .await
        .unwrap();
    let replay = auth.refresh(&first.access_token, &first.refresh_token).await;
    assert_eq!(replay.unwrap_err().token_error(), Some(TokenError::Reused));

    let chain = store.list_family(family_id).await.unwrap();
    assert!(chain.iter().all(|r| !r.valid));

    let after = auth.refresh(&second.access_token, &second.refresh_token).await;
    assert_eq!(after.unwrap_err().token_error(), Some(TokenError::Reused));
}

#[tokio::test]
#[ignore]
async fn duplicate_email_in_other_case_is_a_conflict() {
    let (_, pool) = test_settings().await;
    let users = PgUserDirectory::new(pool, PasswordHasher::new(4));

    users.register(new_user("John@example.com")).await.unwrap();
    let duplicate = users.register(new_user("john@example.com")).await;

    assert!(matches!(
        duplicate,
        Err(AppError::Database(DatabaseError::UniqueConstraintViolation(_)))
    ));
    assert!(users
        .verify_credentials("JOHN@EXAMPLE.COM", "SecurePass123")
        .await
        .unwrap()
        .is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore]
async fn family_revocation_racing_rotation_leaves_nothing_valid() {
    let (configuration, pool) = test_settings().await;
    let users = PgUserDirectory::new(pool.clone(), PasswordHasher::new(4));
    let store = Arc::new(PgTokenStore::new(pool, configuration.jwt.refresh_ttl()));
    let user = users.register(new_user("john@example.com")).await.unwrap();

    for _ in 0..100 {
        let family_id = Uuid::new_v4();
        let issued = store.create(user.id, family_id).await.unwrap();

        let rotating = {
            let store = store.clone();
            let record = issued.record.clone();
            tokio::spawn(async move { store.rotate(&record).await })
        };
        let revoking = {
            let store = store.clone();
            let user_id = user.id;
            tokio::spawn(async move { store.invalidate_family(user_id, family_id).await })
        };
        rotating.await.unwrap().unwrap();
        revoking.await.unwrap().unwrap();

        let chain = store.list_family(family_id).await.unwrap();
        assert!(chain.iter().all(|r| !r.valid), "family {} kept a valid record", family_id);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore]
async fn concurrent_rotation_in_postgres_has_one_winner() {
    let (configuration, pool) = test_settings().await;
    let users = PgUserDirectory::new(pool.clone(), PasswordHasher::new(4));
    let store = Arc::new(PgTokenStore::new(pool, configuration.jwt.refresh_ttl()));
    let user = users.register(new_user("john@example.com")).await.unwrap();
    let issued = store.create(user.id, Uuid::new_v4()).await.unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = store.clone();
            let record = issued.record.clone();
            tokio::spawn(async move { store.rotate(&record).await })
        })
        .collect();

    let mut winners = 0;
    for handle in handles {
        if let RotateOutcome::Rotated(_) = handle.await.unwrap().unwrap() {
            winners += 1;
        }
    }

    assert_eq!(winners, 1);
    let chain = store.list_family(issued.record.family_id).await.unwrap();
    assert_eq!(chain.iter().filter(|r| r.valid).count(), 1);
}

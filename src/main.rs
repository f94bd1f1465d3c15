use std::net::TcpListener;
use std::sync::Arc;

use refresh_guard::auth::{AccessTokenIssuer, AuthService, PasswordHasher};
use refresh_guard::configuration::get_configuration;
use refresh_guard::startup::run;
use refresh_guard::store::PgTokenStore;
use refresh_guard::telemetry::init_telemetry;
use refresh_guard::users::PgUserDirectory;
use sqlx::postgres::PgPoolOptions;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    init_telemetry("info");

    tracing::info!("Starting application");

    let configuration = match get_configuration() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to read configuration: {}", e);
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Configuration error",
            ));
        }
    };

    // A bad signing key stops startup before any token is issued.
    let issuer = AccessTokenIssuer::new(&configuration.jwt).map_err(|e| {
        tracing::error!("Invalid signing configuration: {}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "Signing configuration error")
    })?;

    tracing::info!("Attempting to connect to database");
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&configuration.database.connection_string())
        .await
        .map_err(|e| {
            tracing::error!("Failed to create connection pool: {}", e);
            std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "Database connection error")
        })?;

    sqlx::migrate!("./migrations").run(&pool).await.map_err(|e| {
        tracing::error!("Failed to run migrations: {}", e);
        std::io::Error::new(std::io::ErrorKind::Other, "Migration error")
    })?;

    let hasher = PasswordHasher::new(configuration.application.bcrypt_cost);
    let store = Arc::new(PgTokenStore::new(pool.clone(), configuration.jwt.refresh_ttl()));
    let users = Arc::new(PgUserDirectory::new(pool, hasher));
    let auth = AuthService::new(store, users, issuer);

    let address = configuration.application.address();
    let listener = TcpListener::bind(&address)?;
    tracing::info!("Server listening on: {}", address);

    run(listener, auth)?.await
}

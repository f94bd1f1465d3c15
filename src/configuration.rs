use crate::error::ConfigError;

const MIN_SECRET_LENGTH: usize = 32;

#[derive(serde::Deserialize, Clone)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub application: ApplicationSettings,
    pub jwt: JwtSettings,
}

#[derive(serde::Deserialize, Clone)]
pub struct ApplicationSettings {
    pub host: String,
    pub port: u16,
    /// bcrypt work factor for newly registered passwords
    #[serde(default = "default_bcrypt_cost")]
    pub bcrypt_cost: u32,
}

fn default_bcrypt_cost() -> u32 {
    bcrypt::DEFAULT_COST
}

impl ApplicationSettings {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(serde::Deserialize, Clone)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: String,
    pub port: u16,
    pub host: String,
    pub database_name: String,
}

impl DatabaseSettings {
    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database_name
        )
    }

    pub fn connection_string_without_db(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}",
            self.username, self.password, self.host, self.port
        )
    }
}

/// Token signing and lifetime settings
#[derive(serde::Deserialize, Clone)]
pub struct JwtSettings {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub access_token_expiry: i64,   // seconds, keep short
    pub refresh_token_expiry: i64,  // seconds
}

impl JwtSettings {
    /// Reject settings that would make every signed token worthless.
    ///
    /// Called once at startup; a failure here must stop the process.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.secret.len() < MIN_SECRET_LENGTH {
            return Err(ConfigError::SigningKey(format!(
                "secret must be at least {} bytes",
                MIN_SECRET_LENGTH
            )));
        }
        if self.issuer.trim().is_empty() {
            return Err(ConfigError::SigningKey("issuer is empty".to_string()));
        }
        if self.audience.trim().is_empty() {
            return Err(ConfigError::SigningKey("audience is empty".to_string()));
        }
        if self.access_token_expiry <= 0 {
            return Err(ConfigError::InvalidValue(
                "jwt.access_token_expiry must be positive".to_string(),
            ));
        }
        if self.refresh_token_expiry <= 0 {
            return Err(ConfigError::InvalidValue(
                "jwt.refresh_token_expiry must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn refresh_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.refresh_token_expiry)
    }
}

/// Load settings from `configuration.yaml` (optional), then `APP_*` env vars.
///
/// e.g. `APP_JWT__SECRET=...` overrides `jwt.secret`.
pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("configuration").required(false))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;
    settings.try_deserialize::<Settings>()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jwt() -> JwtSettings {
        JwtSettings {
            secret: "test-secret-key-at-least-32-characters-long".to_string(),
            issuer: "refresh-guard".to_string(),
            audience: "refresh-guard-clients".to_string(),
            access_token_expiry: 60,
            refresh_token_expiry: 120,
        }
    }

    #[test]
    fn test_valid_settings_pass() {
        assert!(jwt().validate().is_ok());
    }

    #[test]
    fn test_short_secret_is_signing_misconfiguration() {
        let mut settings = jwt();
        settings.secret = "too-short".to_string();
        assert!(matches!(settings.validate(), Err(ConfigError::SigningKey(_))));
    }

    #[test]
    fn test_empty_audience_rejected() {
        let mut settings = jwt();
        settings.audience = "  ".to_string();
        assert!(matches!(settings.validate(), Err(ConfigError::SigningKey(_))));
    }

    #[test]
    fn test_non_positive_lifetimes_rejected() {
        let mut settings = jwt();
        settings.access_token_expiry = 0;
        assert!(settings.validate().is_err());

        let mut settings = jwt();
        settings.refresh_token_expiry = -5;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_lifetimes_are_configurable() {
        let settings = jwt();
        assert_eq!(settings.refresh_ttl(), chrono::Duration::seconds(120));
    }
}

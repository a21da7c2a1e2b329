//! API server configuration.
//!
//! Values come from an optional `khata.toml` next to the binary, then from
//! `KHATA_*` environment variables, falling back to the defaults below.
//!
//! | Variable | Default |
//! |---|---|
//! | `KHATA_HTTP_PORT` | `8080` |
//! | `KHATA_DATABASE_PATH` | `./khata.db` |
//! | `KHATA_DB_MAX_CONNECTIONS` | `5` |
//! | `KHATA_JWT_SECRET` | development secret |
//! | `KHATA_JWT_LIFETIME_SECS` | `28800` (8 hours) |
//! | `KHATA_ALLOW_COMPANY_SIGNUP` | `true` |
//! | `KHATA_LIVE_FEED_CAPACITY` | `256` |

use serde::{Deserialize, Serialize};

const DEV_JWT_SECRET: &str = "khata-dev-secret-change-in-production";

/// API server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// HTTP listen port
    pub http_port: u16,

    /// SQLite database file
    pub database_path: String,

    pub db_max_connections: u32,

    /// Secret for signing session tokens
    #[serde(skip_serializing)]
    pub jwt_secret: String,

    /// Session token lifetime in seconds
    pub jwt_lifetime_secs: i64,

    /// Whether `POST /companies` is open to anyone
    pub allow_company_signup: bool,

    /// Events buffered per `/pos/live` subscriber before it starts lagging
    pub live_feed_capacity: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        ApiConfig {
            http_port: 8080,
            database_path: "./khata.db".to_string(),
            db_max_connections: 5,
            jwt_secret: DEV_JWT_SECRET.to_string(),
            jwt_lifetime_secs: 8 * 60 * 60,
            allow_company_signup: true,
            live_feed_capacity: 256,
        }
    }
}

impl ApiConfig {
    /// Load configuration from `khata.toml` and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        let defaults = ApiConfig::default();

        let settings = config::Config::builder()
            .set_default("http_port", defaults.http_port)?
            .set_default("database_path", defaults.database_path)?
            .set_default("db_max_connections", defaults.db_max_connections)?
            .set_default("jwt_secret", defaults.jwt_secret)?
            .set_default("jwt_lifetime_secs", defaults.jwt_lifetime_secs)?
            .set_default("allow_company_signup", defaults.allow_company_signup)?
            .set_default("live_feed_capacity", defaults.live_feed_capacity as u64)?
            .add_source(config::File::with_name("khata").required(false))
            .add_source(config::Environment::with_prefix("KHATA").try_parsing(true))
            .build()?;

        let config: ApiConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values the server cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt_secret.len() < 16 {
            return Err(ConfigError::InvalidValue("KHATA_JWT_SECRET".to_string()));
        }
        if self.jwt_lifetime_secs <= 0 {
            return Err(ConfigError::InvalidValue("KHATA_JWT_LIFETIME_SECS".to_string()));
        }
        if self.db_max_connections == 0 {
            return Err(ConfigError::InvalidValue("KHATA_DB_MAX_CONNECTIONS".to_string()));
        }
        if self.live_feed_capacity == 0 {
            return Err(ConfigError::InvalidValue("KHATA_LIVE_FEED_CAPACITY".to_string()));
        }
        Ok(())
    }

    /// True while the built-in development secret is in use.
    pub fn uses_dev_secret(&self) -> bool {
        self.jwt_secret == DEV_JWT_SECRET
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}")]
    InvalidValue(String),

    #[error("Failed to read configuration: {0}")]
    Source(#[from] config::ConfigError),
}

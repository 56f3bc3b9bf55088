//! Configuration management for the Shop Floor Inventory service
//!
//! Supports hierarchical configuration loading:
//! 1. Default values in code
//! 2. Configuration files (development.toml, production.toml)
//! 3. Environment variable overrides with SFI_ prefix

use config::{ConfigError, Environment, File};
use serde::Deserialize;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Current environment (development, production)
    pub environment: String,

    /// Server configuration
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// JWT verification configuration
    pub jwt: JwtConfig,

    /// Purchase order settings
    pub procurement: ProcurementConfig,

    /// Log output settings
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Server port
    pub port: u16,

    /// Server host
    pub host: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    pub min_connections: u32,

    /// Seconds to wait for a free connection
    pub acquire_timeout_secs: u64,

    /// Apply pending migrations on start-up outside development
    pub run_migrations: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct JwtConfig {
    /// Secret used to verify bearer tokens issued by the auth subsystem
    pub secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProcurementConfig {
    /// Currency used when an order does not name one
    pub default_currency: String,

    /// How many times order creation is retried after a number allocation conflict
    pub allocation_max_retries: u32,

    /// Initial backoff between retries, doubled on every attempt
    pub allocation_backoff_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Emit JSON log lines instead of human-readable output
    pub json: bool,
}

impl Config {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let environment = std::env::var("SFI_ENVIRONMENT").unwrap_or_else(|_| "development".into());

        let config = config::Config::builder()
            // Start with default values
            .set_default("environment", environment.clone())?
            .set_default("server.port", 3000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("database.acquire_timeout_secs", 30)?
            .set_default("database.run_migrations", false)?
            .set_default("procurement.default_currency", "EUR")?
            .set_default("procurement.allocation_max_retries", 5)?
            .set_default("procurement.allocation_backoff_ms", 20)?
            .set_default("logging.json", false)?
            // Load environment-specific config file
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // Override with environment variables (SFI_ prefix)
            .add_source(
                Environment::with_prefix("SFI")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    pub fn should_run_migrations(&self) -> bool {
        self.environment == "development" || self.database.run_migrations
    }
}

impl Default for ProcurementConfig {
    fn default() -> Self {
        Self {
            default_currency: "EUR".to_string(),
            allocation_max_retries: 5,
            allocation_backoff_ms: 20,
        }
    }
}

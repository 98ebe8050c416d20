//! Configuration for the search service.

use chirp_web::config::{ConfigError, ServerConfig, env_or, require};

/// Search service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP listener
    pub server: ServerConfig,
    /// `DATABASE_URL`
    pub database_url: String,
    /// `DATABASE_MAX_CONNECTIONS` (default 10)
    pub database_max_connections: u32,
    /// `REDPANDA_BROKERS`
    pub brokers: String,
    /// `SEARCH_RESULT_LIMIT` (default 10)
    pub result_limit: u64,
    /// `CONSUMER_MAX_RETRIES` (default 3)
    pub consumer_max_retries: u32,
}

impl Config {
    /// Load configuration from the environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a required variable is missing or a
    /// value does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            server: ServerConfig::from_env(3004)?,
            database_url: require("DATABASE_URL")?,
            database_max_connections: env_or("DATABASE_MAX_CONNECTIONS", 10)?,
            brokers: env_or("REDPANDA_BROKERS", "localhost:9092".to_string())?,
            result_limit: env_or("SEARCH_RESULT_LIMIT", 10)?,
            consumer_max_retries: env_or("CONSUMER_MAX_RETRIES", 3)?,
        })
    }
}

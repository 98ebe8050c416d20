//! Configuration for the post service.

use chirp_cache::CacheConfig;
use chirp_web::config::{ConfigError, ServerConfig, env_or, require};
use std::time::Duration;

/// Post service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP listener
    pub server: ServerConfig,
    /// `DATABASE_URL`
    pub database_url: String,
    /// `DATABASE_MAX_CONNECTIONS` (default 10)
    pub database_max_connections: u32,
    /// `REDIS_URL`
    pub redis_url: String,
    /// `REDPANDA_BROKERS`
    pub brokers: String,
    /// `POSTS_LIST_TTL_SECS` / `POST_TTL_SECS`
    pub cache: CacheConfig,
}

impl Config {
    /// Load configuration from the environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a required variable is missing or a
    /// value does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = CacheConfig::default();
        Ok(Self {
            server: ServerConfig::from_env(3002)?,
            database_url: require("DATABASE_URL")?,
            database_max_connections: env_or("DATABASE_MAX_CONNECTIONS", 10)?,
            redis_url: env_or("REDIS_URL", "redis://127.0.0.1:6379".to_string())?,
            brokers: env_or("REDPANDA_BROKERS", "localhost:9092".to_string())?,
            cache: CacheConfig {
                list_ttl: Duration::from_secs(env_or(
                    "POSTS_LIST_TTL_SECS",
                    defaults.list_ttl.as_secs(),
                )?),
                entity_ttl: Duration::from_secs(env_or(
                    "POST_TTL_SECS",
                    defaults.entity_ttl.as_secs(),
                )?),
            },
        })
    }
}

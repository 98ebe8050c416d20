//! Configuration for the media service.

use chirp_web::config::{ConfigError, ServerConfig, env_or, require};
use std::path::PathBuf;

/// Media service configuration loaded from environment variables.
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
    /// `MEDIA_ROOT`: directory blobs are written to
    pub media_root: PathBuf,
    /// `MEDIA_PUBLIC_URL`: base URL blobs are served from
    pub public_base_url: String,
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
        let server = ServerConfig::from_env(3003)?;
        let default_public = format!("http://localhost:{}/files", server.port);
        Ok(Self {
            database_url: require("DATABASE_URL")?,
            database_max_connections: env_or("DATABASE_MAX_CONNECTIONS", 10)?,
            brokers: env_or("REDPANDA_BROKERS", "localhost:9092".to_string())?,
            media_root: PathBuf::from(env_or("MEDIA_ROOT", "./media".to_string())?),
            public_base_url: env_or("MEDIA_PUBLIC_URL", default_public)?,
            consumer_max_retries: env_or("CONSUMER_MAX_RETRIES", 3)?,
            server,
        })
    }
}

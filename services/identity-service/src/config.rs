//! Configuration for the identity service.

use chirp_auth::constants::{ACCESS_TOKEN_TTL, REFRESH_TOKEN_TTL};
use chirp_web::config::{ConfigError, ServerConfig, env_or, require};
use std::time::Duration;

/// Identity service configuration loaded from environment variables.
#[derive(Clone)]
pub struct Config {
    /// HTTP listener
    pub server: ServerConfig,
    /// `DATABASE_URL`
    pub database_url: String,
    /// `DATABASE_MAX_CONNECTIONS` (default 10)
    pub database_max_connections: u32,
    /// `JWT_SECRET`, shared with the gateway. Required.
    pub jwt_secret: String,
    /// `ACCESS_TOKEN_TTL_SECS` (default one hour)
    pub access_token_ttl: Duration,
    /// `REFRESH_TOKEN_TTL_SECS` (default seven days)
    pub refresh_token_ttl: Duration,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("server", &self.server)
            .field("database_max_connections", &self.database_max_connections)
            .field("access_token_ttl", &self.access_token_ttl)
            .field("refresh_token_ttl", &self.refresh_token_ttl)
            .finish_non_exhaustive()
    }
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
            server: ServerConfig::from_env(3001)?,
            database_url: require("DATABASE_URL")?,
            database_max_connections: env_or("DATABASE_MAX_CONNECTIONS", 10)?,
            jwt_secret: require("JWT_SECRET")?,
            access_token_ttl: Duration::from_secs(env_or(
                "ACCESS_TOKEN_TTL_SECS",
                ACCESS_TOKEN_TTL.as_secs(),
            )?),
            refresh_token_ttl: Duration::from_secs(env_or(
                "REFRESH_TOKEN_TTL_SECS",
                REFRESH_TOKEN_TTL.as_secs(),
            )?),
        })
    }
}

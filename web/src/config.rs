//! Environment-driven configuration helpers.
//!
//! Services load a `.env` file (if present) with `dotenvy`, then read typed
//! values from the process environment. Optional values fall back to a
//! default; required ones fail startup with a [`ConfigError`].

use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required variable is unset or empty
    #[error("Missing required environment variable {0}")]
    Missing(&'static str),

    /// A variable is set but does not parse
    #[error("Invalid value for {name}: {reason}")]
    Invalid {
        /// Variable name
        name: &'static str,
        /// Why it was rejected
        reason: String,
    },
}

/// Read `name`, falling back to `default` when unset.
///
/// # Errors
///
/// Returns [`ConfigError::Invalid`] when the variable is set but unparseable.
pub fn env_or<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw.trim().parse().map_err(|e: T::Err| {
            ConfigError::Invalid {
                name,
                reason: e.to_string(),
            }
        }),
        _ => Ok(default),
    }
}

/// Read a required string variable.
///
/// # Errors
///
/// Returns [`ConfigError::Missing`] when unset or blank.
pub fn require(name: &'static str) -> Result<String, ConfigError> {
    env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::Missing(name))
}

/// HTTP listener settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Bind address
    pub host: String,
    /// Bind port
    pub port: u16,
    /// How long in-flight work may take to finish after a shutdown signal
    pub shutdown_timeout: Duration,
}

impl ServerConfig {
    /// Read `HOST`, `PORT` and `SHUTDOWN_TIMEOUT_SECS`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for unparseable values.
    pub fn from_env(default_port: u16) -> Result<Self, ConfigError> {
        Ok(Self {
            host: env_or("HOST", "0.0.0.0".to_string())?,
            port: env_or("PORT", default_port)?,
            shutdown_timeout: Duration::from_secs(env_or("SHUTDOWN_TIMEOUT_SECS", 30_u64)?),
        })
    }

    /// `host:port`, for binding.
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn unset_values_use_defaults() {
        assert_eq!(env_or("CHIRP_TEST_SURELY_UNSET", 42_u16).unwrap(), 42);
        assert_eq!(
            require("CHIRP_TEST_SURELY_UNSET"),
            Err(ConfigError::Missing("CHIRP_TEST_SURELY_UNSET"))
        );
    }

    #[test]
    fn bind_address_joins_host_and_port() {
        let config = ServerConfig {
            host: "127.0.0.1".into(),
            port: 3001,
            shutdown_timeout: Duration::from_secs(5),
        };
        assert_eq!(config.bind_address(), "127.0.0.1:3001");
    }
}

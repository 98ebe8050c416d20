//! Configuration for the gateway.

use chirp_auth::constants::rate_limit::{
    GLOBAL_LIMIT, GLOBAL_WINDOW, SENSITIVE_LIMIT, SENSITIVE_WINDOW,
};
use chirp_web::config::{ConfigError, ServerConfig, env_or, require};
use std::time::Duration;

/// Gateway configuration loaded from environment variables.
#[derive(Clone)]
pub struct Config {
    /// HTTP listener
    pub server: ServerConfig,
    /// `JWT_SECRET`, shared with the identity service. Required.
    pub jwt_secret: String,
    /// `REDIS_URL` for the rate-limit counters
    pub redis_url: String,
    /// Where each backend listens
    pub backends: BackendUrls,
    /// Outbound HTTP client settings
    pub proxy: ProxyConfig,
    /// Throttle settings
    pub rate_limits: RateLimitConfig,
    /// `TRUST_PROXY`: believe `X-Forwarded-For` from a fronting proxy
    pub trust_proxy: bool,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("server", &self.server)
            .field("backends", &self.backends)
            .field("proxy", &self.proxy)
            .field("rate_limits", &self.rate_limits)
            .field("trust_proxy", &self.trust_proxy)
            .finish_non_exhaustive()
    }
}

/// Base URLs of the four backends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendUrls {
    /// `IDENTITY_SERVICE_URL`
    pub identity: String,
    /// `POST_SERVICE_URL`
    pub post: String,
    /// `MEDIA_SERVICE_URL`
    pub media: String,
    /// `SEARCH_SERVICE_URL`
    pub search: String,
}

/// Outbound HTTP client timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProxyConfig {
    /// `PROXY_CONNECT_TIMEOUT_SECS` (default 5)
    pub connect_timeout: Duration,
    /// `PROXY_REQUEST_TIMEOUT_SECS` (default 30)
    pub request_timeout: Duration,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Budgets for the two throttles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// `GLOBAL_RATE_LIMIT` (default 100)
    pub global_limit: u64,
    /// `GLOBAL_RATE_WINDOW_SECS` (default 900)
    pub global_window: Duration,
    /// `SENSITIVE_RATE_LIMIT` (default 50)
    pub sensitive_limit: u64,
    /// `SENSITIVE_RATE_WINDOW_SECS` (default 3600)
    pub sensitive_window: Duration,
    /// `SENSITIVE_PATHS`, comma separated (default `/v1/auth/register`)
    pub sensitive_paths: Vec<String>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            global_limit: GLOBAL_LIMIT,
            global_window: GLOBAL_WINDOW,
            sensitive_limit: SENSITIVE_LIMIT,
            sensitive_window: SENSITIVE_WINDOW,
            sensitive_paths: vec!["/v1/auth/register".to_string()],
        }
    }
}

impl Config {
    /// Load configuration from the environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when `JWT_SECRET` is missing or a value does
    /// not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = RateLimitConfig::default();
        let sensitive_paths = env_or("SENSITIVE_PATHS", String::new())?;
        let sensitive_paths = if sensitive_paths.is_empty() {
            defaults.sensitive_paths
        } else {
            sensitive_paths
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect()
        };

        Ok(Self {
            server: ServerConfig::from_env(3000)?,
            jwt_secret: require("JWT_SECRET")?,
            redis_url: env_or("REDIS_URL", "redis://127.0.0.1:6379".to_string())?,
            backends: BackendUrls {
                identity: env_or("IDENTITY_SERVICE_URL", "http://localhost:3001".to_string())?,
                post: env_or("POST_SERVICE_URL", "http://localhost:3002".to_string())?,
                media: env_or("MEDIA_SERVICE_URL", "http://localhost:3003".to_string())?,
                search: env_or("SEARCH_SERVICE_URL", "http://localhost:3004".to_string())?,
            },
            proxy: ProxyConfig {
                connect_timeout: Duration::from_secs(env_or("PROXY_CONNECT_TIMEOUT_SECS", 5)?),
                request_timeout: Duration::from_secs(env_or("PROXY_REQUEST_TIMEOUT_SECS", 30)?),
            },
            rate_limits: RateLimitConfig {
                global_limit: env_or("GLOBAL_RATE_LIMIT", defaults.global_limit)?,
                global_window: Duration::from_secs(env_or(
                    "GLOBAL_RATE_WINDOW_SECS",
                    defaults.global_window.as_secs(),
                )?),
                sensitive_limit: env_or("SENSITIVE_RATE_LIMIT", defaults.sensitive_limit)?,
                sensitive_window: Duration::from_secs(env_or(
                    "SENSITIVE_RATE_WINDOW_SECS",
                    defaults.sensitive_window.as_secs(),
                )?),
                sensitive_paths,
            },
            trust_proxy: env_or("TRUST_PROXY", false)?,
        })
    }
}

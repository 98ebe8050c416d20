//! Authentication constants.

use std::time::Duration;

/// Access tokens are valid for this long after issue.
pub const ACCESS_TOKEN_TTL: Duration = Duration::from_secs(60 * 60);

/// Refresh tokens are valid for this long after issue.
pub const REFRESH_TOKEN_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Random bytes in a refresh token (hex encoded on the wire).
pub const REFRESH_TOKEN_BYTES: usize = 40;

/// Rate-limit key namespaces.
pub mod rate_limit {
    use std::time::Duration;

    /// Prefix of every counter key.
    pub const KEY_PREFIX: &str = "ratelimit";

    /// Requests per window allowed by the global policy.
    pub const GLOBAL_LIMIT: u64 = 100;

    /// Global policy window.
    pub const GLOBAL_WINDOW: Duration = Duration::from_secs(15 * 60);

    /// Requests per window allowed on sensitive routes.
    pub const SENSITIVE_LIMIT: u64 = 50;

    /// Sensitive policy window.
    pub const SENSITIVE_WINDOW: Duration = Duration::from_secs(60 * 60);
}

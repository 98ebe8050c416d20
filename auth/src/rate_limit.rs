//! Fixed-window rate limiting over the shared key-value store.
//!
//! Each policy owns a counter per client under
//! `ratelimit:<policy>:<client>`. The first request of a window creates the
//! counter with the window as its TTL; the counter vanishes when the window
//! ends, which opens the next one. Increment and expiry happen atomically in
//! the store, so concurrent gateway replicas share one budget.

use crate::constants::rate_limit::{
    GLOBAL_LIMIT, GLOBAL_WINDOW, KEY_PREFIX, SENSITIVE_LIMIT, SENSITIVE_WINDOW,
};
use crate::error::{AuthError, Result};
use async_trait::async_trait;
use chirp_core::store::KeyValueStore;
use std::sync::Arc;
use std::time::Duration;

/// One throttle: `limit` requests per `window` per client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitPolicy {
    name: String,
    limit: u64,
    window: Duration,
}

impl RateLimitPolicy {
    /// Create a policy. `name` becomes part of the counter key.
    #[must_use]
    pub fn new(name: impl Into<String>, limit: u64, window: Duration) -> Self {
        Self {
            name: name.into(),
            limit,
            window,
        }
    }

    /// Budget applied to every request: 100 per 15 minutes.
    #[must_use]
    pub fn global() -> Self {
        Self::new("global", GLOBAL_LIMIT, GLOBAL_WINDOW)
    }

    /// Budget for sensitive routes such as registration: 50 per hour.
    #[must_use]
    pub fn sensitive() -> Self {
        Self::new("sensitive", SENSITIVE_LIMIT, SENSITIVE_WINDOW)
    }

    /// Policy name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Requests allowed per window.
    #[must_use]
    pub const fn limit(&self) -> u64 {
        self.limit
    }

    /// Window length.
    #[must_use]
    pub const fn window(&self) -> Duration {
        self.window
    }

    /// Counter key for `client`.
    #[must_use]
    pub fn key_for(&self, client: &str) -> String {
        format!("{KEY_PREFIX}:{}:{client}", self.name)
    }
}

/// Result of counting one request against a policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    /// Whether the request fits in the budget.
    pub allowed: bool,
    /// Budget per window.
    pub limit: u64,
    /// Requests left in the current window.
    pub remaining: u64,
    /// Time until the current window ends.
    pub reset_after: Duration,
}

impl RateDecision {
    /// Turn a rejection into [`AuthError::RateLimited`].
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::RateLimited`] when the request was not allowed.
    pub const fn into_result(self) -> Result<Self> {
        if self.allowed {
            Ok(self)
        } else {
            Err(AuthError::RateLimited {
                retry_after: self.reset_after,
            })
        }
    }
}

/// Counts requests against a policy.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Record one request from `client` and decide whether it is allowed.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Backend`] if the counter store fails.
    async fn check(&self, policy: &RateLimitPolicy, client: &str) -> Result<RateDecision>;
}

/// [`RateLimiter`] over a [`KeyValueStore`]'s windowed counters.
#[derive(Clone)]
pub struct FixedWindowRateLimiter {
    kv: Arc<dyn KeyValueStore>,
}

impl std::fmt::Debug for FixedWindowRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixedWindowRateLimiter").finish_non_exhaustive()
    }
}

impl FixedWindowRateLimiter {
    /// Create a limiter over `kv`.
    #[must_use]
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }
}

#[async_trait]
impl RateLimiter for FixedWindowRateLimiter {
    async fn check(&self, policy: &RateLimitPolicy, client: &str) -> Result<RateDecision> {
        let key = policy.key_for(client);
        let window = self
            .kv
            .increment_with_expiry(&key, policy.window)
            .await
            .map_err(|e| {
                tracing::error!(policy = %policy.name, error = %e, "Rate limit counter failed");
                AuthError::from(e)
            })?;

        let decision = RateDecision {
            allowed: window.count <= policy.limit,
            limit: policy.limit,
            remaining: policy.limit.saturating_sub(window.count),
            reset_after: window.resets_in,
        };

        if !decision.allowed {
            tracing::warn!(
                policy = %policy.name,
                client,
                count = window.count,
                limit = policy.limit,
                "Rate limit exceeded"
            );
            metrics::counter!("ratelimit.rejected", "policy" => policy.name.clone()).increment(1);
        }
        Ok(decision)
    }
}

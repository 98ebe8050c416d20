//! Admission checks run before a request is proxied.
//!
//! A request passes the token check (on authenticated routes) and then the
//! global throttle, plus the sensitive throttle on configured paths. Any
//! failure answers the client directly and the backend never sees the
//! request.

use crate::config::RateLimitConfig;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header::AUTHORIZATION};
use axum::response::{IntoResponse, Response};
use chirp_auth::{Claims, RateDecision, RateLimitPolicy, RateLimiter, TokenService, extract_bearer};
use chirp_web::AppError;
use std::sync::Arc;
use tracing::{debug, warn};

/// `RateLimit-Limit` response header.
pub const RATE_LIMIT_LIMIT: HeaderName = HeaderName::from_static("ratelimit-limit");
/// `RateLimit-Remaining` response header.
pub const RATE_LIMIT_REMAINING: HeaderName = HeaderName::from_static("ratelimit-remaining");
/// `RateLimit-Reset` response header, in whole seconds.
pub const RATE_LIMIT_RESET: HeaderName = HeaderName::from_static("ratelimit-reset");

/// A throttle refusal, or a failure to consult the counters.
#[derive(Debug)]
pub struct Rejection {
    error: AppError,
    decision: Option<RateDecision>,
}

impl Rejection {
    /// Status the client will see.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.error.status()
    }

    /// The spent budget, when the request was throttled.
    #[must_use]
    pub const fn decision(&self) -> Option<&RateDecision> {
        self.decision.as_ref()
    }
}

impl From<AppError> for Rejection {
    fn from(error: AppError) -> Self {
        Self {
            error,
            decision: None,
        }
    }
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        let mut response = self.error.into_response();
        if let Some(decision) = &self.decision {
            response.headers_mut().extend(rate_limit_headers(decision));
        }
        response
    }
}

/// Token verification and throttling.
#[derive(Clone)]
pub struct Gatekeeper {
    tokens: TokenService,
    limiter: Arc<dyn RateLimiter>,
    global: RateLimitPolicy,
    sensitive: RateLimitPolicy,
    sensitive_paths: Vec<String>,
}

impl std::fmt::Debug for Gatekeeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gatekeeper")
            .field("global", &self.global)
            .field("sensitive", &self.sensitive)
            .field("sensitive_paths", &self.sensitive_paths)
            .finish_non_exhaustive()
    }
}

impl Gatekeeper {
    /// Create a gatekeeper.
    #[must_use]
    pub fn new(tokens: TokenService, limiter: Arc<dyn RateLimiter>, config: &RateLimitConfig) -> Self {
        Self {
            tokens,
            limiter,
            global: RateLimitPolicy::new("global", config.global_limit, config.global_window),
            sensitive: RateLimitPolicy::new(
                "sensitive",
                config.sensitive_limit,
                config.sensitive_window,
            ),
            sensitive_paths: config.sensitive_paths.clone(),
        }
    }

    /// Verify the bearer token in `headers`.
    ///
    /// # Errors
    ///
    /// - 401 `UNAUTHENTICATED` when no bearer token is present
    /// - 401 `INVALID_CREDENTIAL` when it is malformed, forged or expired
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<Claims, AppError> {
        let header = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
        let claims = extract_bearer(header)
            .and_then(|token| self.tokens.verify(token))
            .map_err(|e| {
                warn!(error = %e, "Token rejected");
                metrics::counter!("gateway.rejections", "reason" => "auth").increment(1);
                AppError::from(e)
            })?;

        debug!(user_id = %claims.user_id, "Token accepted");
        Ok(claims)
    }

    /// Count the request against every applicable throttle.
    ///
    /// Returns the decision with the least headroom, for the response
    /// headers.
    ///
    /// # Errors
    ///
    /// - 429 with `Retry-After` and `RateLimit-*` headers when a budget is spent
    /// - 500 when the counter store fails
    pub async fn admit(&self, client: &str, path: &str) -> Result<RateDecision, Rejection> {
        let mut tightest = self.count(&self.global, client).await?;

        if self.is_sensitive(path) {
            let sensitive = self.count(&self.sensitive, client).await?;
            if sensitive.remaining <= tightest.remaining {
                tightest = sensitive;
            }
        }
        Ok(tightest)
    }

    async fn count(&self, policy: &RateLimitPolicy, client: &str) -> Result<RateDecision, Rejection> {
        let decision = self
            .limiter
            .check(policy, client)
            .await
            .map_err(AppError::from)?;
        if decision.allowed {
            return Ok(decision);
        }

        metrics::counter!("gateway.rejections", "reason" => "rate_limit").increment(1);
        Err(Rejection {
            error: AppError::rate_limited(decision.reset_after),
            decision: Some(decision),
        })
    }

    fn is_sensitive(&self, path: &str) -> bool {
        self.sensitive_paths
            .iter()
            .any(|p| path == p || path.strip_prefix(p.as_str()).is_some_and(|rest| rest.starts_with('/')))
    }
}

/// `RateLimit-*` headers describing `decision`.
#[must_use]
pub fn rate_limit_headers(decision: &RateDecision) -> HeaderMap {
    let reset = decision.reset_after.as_secs() + u64::from(decision.reset_after.subsec_nanos() > 0);
    let mut headers = HeaderMap::with_capacity(3);
    headers.insert(RATE_LIMIT_LIMIT, HeaderValue::from(decision.limit));
    headers.insert(RATE_LIMIT_REMAINING, HeaderValue::from(decision.remaining));
    headers.insert(RATE_LIMIT_RESET, HeaderValue::from(reset));
    headers
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chirp_auth::FixedWindowRateLimiter;
    use chirp_core::ids::UserId;
    use chirp_testing::{InMemoryKeyValueStore, manual_clock};
    use std::time::Duration;

    const SECRET: &[u8] = b"gate-test-secret-that-is-long-enough";

    fn gatekeeper(kv: &InMemoryKeyValueStore, config: &RateLimitConfig) -> Gatekeeper {
        Gatekeeper::new(
            TokenService::new(SECRET),
            Arc::new(FixedWindowRateLimiter::new(Arc::new(kv.clone()))),
            config,
        )
    }

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {token}")).unwrap());
        headers
    }

    #[test]
    fn tokens_are_verified() {
        let gate = gatekeeper(&InMemoryKeyValueStore::new(manual_clock()), &RateLimitConfig::default());
        let user = UserId::new();
        let token = TokenService::new(SECRET).issue(user, "alice", chrono::Utc::now()).unwrap();

        assert_eq!(gate.authenticate(&bearer(&token)).unwrap().user_id, user);
        assert_eq!(
            gate.authenticate(&HeaderMap::new()).unwrap_err().code(),
            "UNAUTHENTICATED"
        );
        assert_eq!(
            gate.authenticate(&bearer("not-a-jwt")).unwrap_err().code(),
            "INVALID_CREDENTIAL"
        );
    }

    #[tokio::test]
    async fn sensitive_paths_count_against_both_budgets() {
        let kv = InMemoryKeyValueStore::new(manual_clock());
        let config = RateLimitConfig {
            global_limit: 10,
            sensitive_limit: 2,
            ..RateLimitConfig::default()
        };
        let gate = gatekeeper(&kv, &config);

        let first = gate.admit("10.0.0.1", "/v1/auth/register").await.unwrap();
        assert_eq!((first.limit, first.remaining), (2, 1));
        gate.admit("10.0.0.1", "/v1/auth/register").await.unwrap();

        let rejected = gate.admit("10.0.0.1", "/v1/auth/register").await.unwrap_err();
        assert_eq!(rejected.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(rejected.decision().unwrap().remaining, 0);

        let other = gate.admit("10.0.0.1", "/v1/auth/login").await.unwrap();
        assert_eq!((other.limit, other.remaining), (10, 6));
        assert!(!gate.is_sensitive("/v1/auth/registered"));
    }

    #[tokio::test]
    async fn counter_outage_fails_closed() {
        let kv = InMemoryKeyValueStore::new(manual_clock());
        kv.set_unavailable(true);
        let gate = gatekeeper(&kv, &RateLimitConfig::default());

        let err = gate.admit("10.0.0.1", "/v1/posts").await.unwrap_err();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn reset_rounds_up_to_whole_seconds() {
        let headers = rate_limit_headers(&RateDecision {
            allowed: true,
            limit: 100,
            remaining: 99,
            reset_after: Duration::from_millis(899_500),
        });
        assert_eq!(headers[RATE_LIMIT_RESET], "900");
        assert_eq!(headers[RATE_LIMIT_REMAINING], "99");
    }
}

//! # Chirp Auth
//!
//! Credential and throttling primitives shared by the gateway and the
//! identity service.
//!
//! - [`TokenService`]: issue and verify HS256 access tokens
//! - [`extract_bearer`]: parse the `Authorization` header
//! - [`hash_password`] / [`verify_password`]: Argon2id password hashing
//! - [`FixedWindowRateLimiter`]: per-client fixed-window budgets over the
//!   shared key-value store
//!
//! ## Gateway usage
//!
//! ```text
//! Authorization: Bearer <jwt>
//!        │
//!        ▼
//!  extract_bearer ──► TokenService::verify ──► Claims { userId, username }
//!        │                    │
//!   MissingCredential    TokenExpired / InvalidToken
//!        ▼                    ▼
//!       401                  401
//! ```

pub mod constants;
pub mod error;
pub mod password;
pub mod rate_limit;
pub mod token;

pub use error::{AuthError, Result};
pub use password::{hash_password, verify_password};
pub use rate_limit::{FixedWindowRateLimiter, RateDecision, RateLimitPolicy, RateLimiter};
pub use token::{Claims, TokenService, extract_bearer, generate_refresh_token};

//! Error types for authentication and rate limiting.

use chirp_core::error::PlatformError;
use chirp_core::store::KvError;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for authentication operations.
pub type Result<T> = std::result::Result<T, AuthError>;

/// Failures of token handling, password hashing and rate limiting.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    // ═══════════════════════════════════════════════════════════
    // Credential Errors
    // ═══════════════════════════════════════════════════════════
    /// No bearer token was presented.
    #[error("Authentication required")]
    MissingCredential,

    /// The token is malformed, forged or uses the wrong scheme.
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// The token signature is valid but it has expired.
    #[error("Token has expired")]
    TokenExpired,

    // ═══════════════════════════════════════════════════════════
    // Rate Limiting
    // ═══════════════════════════════════════════════════════════
    /// A rate-limit budget is exhausted.
    #[error("Too many requests, retry in {retry_after:?}")]
    RateLimited {
        /// Time until the window resets
        retry_after: Duration,
    },

    /// The counter store failed.
    #[error("Rate limiter backend error: {0}")]
    Backend(#[from] KvError),

    // ═══════════════════════════════════════════════════════════
    // Internal Errors
    // ═══════════════════════════════════════════════════════════
    /// Signing a token failed.
    #[error("Token generation failed: {0}")]
    TokenGeneration(String),

    /// Hashing a password failed.
    #[error("Password hashing failed: {0}")]
    PasswordHashing(String),
}

impl From<AuthError> for PlatformError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingCredential => Self::Unauthenticated,
            AuthError::InvalidToken(_) | AuthError::TokenExpired => {
                Self::InvalidCredential(err.to_string())
            }
            AuthError::RateLimited { retry_after } => Self::RateLimited { retry_after },
            AuthError::Backend(e) => Self::UpstreamUnavailable(e.to_string()),
            AuthError::TokenGeneration(_) | AuthError::PasswordHashing(_) => {
                Self::Internal(err.to_string())
            }
        }
    }
}

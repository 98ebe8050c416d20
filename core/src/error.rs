//! Client-facing error taxonomy.
//!
//! Every failure a client can observe is one of these kinds. Lower layers
//! have their own error enums ([`StoreError`], [`KvError`], [`BlobError`],
//! [`EventBusError`]) and convert into [`PlatformError`] at the service
//! boundary; the HTTP status mapping lives in `chirp-web`.

use crate::event_bus::EventBusError;
use crate::store::{BlobError, KvError, StoreError};
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced to clients.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    // ═══════════════════════════════════════════════════════════════════════
    // Gateway rejections
    // ═══════════════════════════════════════════════════════════════════════
    /// No credential was presented on a protected route.
    #[error("Authentication required")]
    Unauthenticated,

    /// A credential was presented but is invalid or expired.
    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    /// The caller exhausted a rate-limit budget.
    #[error("Too many requests")]
    RateLimited {
        /// Time until the current window resets
        retry_after: Duration,
    },

    // ═══════════════════════════════════════════════════════════════════════
    // Request errors
    // ═══════════════════════════════════════════════════════════════════════
    /// The addressed entity does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// Input failed validation. Names the offending field.
    #[error("Invalid {field}: {message}")]
    ValidationFailed {
        /// Field that failed validation
        field: String,
        /// What was wrong with it
        message: String,
    },

    // ═══════════════════════════════════════════════════════════════════════
    // Infrastructure
    // ═══════════════════════════════════════════════════════════════════════
    /// A backend service or store could not be reached.
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// The event bus rejected or could not accept a publish.
    #[error("Event bus unavailable: {0}")]
    BusUnavailable(String),

    /// Any other internal failure.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PlatformError {
    /// Shorthand for [`PlatformError::ValidationFailed`].
    #[must_use]
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ValidationFailed {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Stable machine-readable code for the error kind.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::InvalidCredential(_) => "INVALID_CREDENTIAL",
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::NotFound(_) => "NOT_FOUND",
            Self::ValidationFailed { .. } => "VALIDATION_FAILED",
            Self::UpstreamUnavailable(_) => "UPSTREAM_UNAVAILABLE",
            Self::BusUnavailable(_) => "BUS_UNAVAILABLE",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<StoreError> for PlatformError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(reason) => Self::UpstreamUnavailable(reason),
            StoreError::Conflict(reason) => Self::validation("request", reason),
            StoreError::Corrupt(reason) => Self::Internal(reason),
        }
    }
}

impl From<KvError> for PlatformError {
    fn from(err: KvError) -> Self {
        Self::UpstreamUnavailable(err.to_string())
    }
}

impl From<BlobError> for PlatformError {
    fn from(err: BlobError) -> Self {
        match err {
            BlobError::Rejected(reason) => Self::validation("file", reason),
            other => Self::UpstreamUnavailable(other.to_string()),
        }
    }
}

impl From<EventBusError> for PlatformError {
    fn from(err: EventBusError) -> Self {
        Self::BusUnavailable(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_distinct() {
        let all = [
            PlatformError::Unauthenticated,
            PlatformError::InvalidCredential(String::new()),
            PlatformError::RateLimited {
                retry_after: Duration::ZERO,
            },
            PlatformError::NotFound("post".into()),
            PlatformError::validation("content", "empty"),
            PlatformError::UpstreamUnavailable(String::new()),
            PlatformError::BusUnavailable(String::new()),
            PlatformError::Internal(String::new()),
        ];
        let mut codes: Vec<_> = all.iter().map(PlatformError::code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), all.len());
    }

    #[test]
    fn validation_names_the_field() {
        let err = PlatformError::validation("content", "must not be empty");
        assert_eq!(err.to_string(), "Invalid content: must not be empty");
    }

    #[test]
    fn bus_failures_map_to_bus_unavailable() {
        let err: PlatformError = EventBusError::ConnectionFailed("down".into()).into();
        assert_eq!(err.code(), "BUS_UNAVAILABLE");
    }
}

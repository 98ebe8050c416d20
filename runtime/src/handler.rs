//! Event handler contract.
//!
//! Handlers receive already-decoded [`PostEvent`] values; payloads that fail
//! to decode are dead-lettered by the consumer before a handler sees them.
//! The handler's result decides the acknowledgement outcome:
//!
//! | Result | Outcome |
//! |---|---|
//! | `Ok(())` | [`AckOutcome::Applied`] |
//! | `Err(HandlerError::Transient)` | [`AckOutcome::Retry`] |
//! | `Err(HandlerError::Permanent)` | [`AckOutcome::DeadLetter`] |

use async_trait::async_trait;
use chirp_core::event::PostEvent;
use chirp_core::event_bus::AckOutcome;
use thiserror::Error;

/// Why a handler could not apply an event.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// The failure may clear up on its own (store outage, blob store timeout).
    #[error("transient failure: {0}")]
    Transient(String),

    /// Trying again will not help.
    #[error("permanent failure: {0}")]
    Permanent(String),
}

impl HandlerError {
    /// The acknowledgement outcome this error maps to.
    #[must_use]
    pub const fn outcome(&self) -> AckOutcome {
        match self {
            Self::Transient(_) => AckOutcome::Retry,
            Self::Permanent(_) => AckOutcome::DeadLetter,
        }
    }
}

impl From<chirp_core::store::StoreError> for HandlerError {
    fn from(err: chirp_core::store::StoreError) -> Self {
        use chirp_core::store::StoreError;
        match err {
            StoreError::Unavailable(reason) => Self::Transient(reason),
            StoreError::Conflict(reason) | StoreError::Corrupt(reason) => Self::Permanent(reason),
        }
    }
}

/// Applies post events to a derived store.
///
/// Implementations must be idempotent: applying the same event twice leaves
/// the store as if it was applied once.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Short name for logs and metrics.
    fn name(&self) -> &str;

    /// Apply one event.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError::Transient`] for failures worth retrying and
    /// [`HandlerError::Permanent`] for the rest.
    async fn handle(&self, event: &PostEvent) -> Result<(), HandlerError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chirp_core::store::StoreError;

    #[test]
    fn store_outages_are_transient() {
        let err: HandlerError = StoreError::Unavailable("down".into()).into();
        assert_eq!(err.outcome(), AckOutcome::Retry);
        let err: HandlerError = StoreError::Corrupt("bad row".into()).into();
        assert_eq!(err.outcome(), AckOutcome::DeadLetter);
    }
}

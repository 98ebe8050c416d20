//! # Chirp Testing
//!
//! In-memory collaborators for fast, deterministic tests.
//!
//! This crate provides:
//! - [`InMemoryEventBus`]: topic exchange with ephemeral queues that records
//!   every publish and acknowledgement outcome
//! - [`InMemoryKeyValueStore`]: clock-driven expiry, glob deletion and
//!   windowed counters
//! - In-memory document stores for posts, search, media and users
//! - [`InMemoryBlobStore`] with delete-failure injection
//! - Deterministic clocks
//!
//! ## Example
//!
//! ```ignore
//! use chirp_testing::{InMemoryEventBus, InMemoryKeyValueStore, test_clock};
//!
//! #[tokio::test]
//! async fn create_post_publishes() {
//!     let bus = InMemoryEventBus::new();
//!     let kv = InMemoryKeyValueStore::new(test_clock());
//!     // build the service with Arc::new(bus.clone()) ...
//!     assert_eq!(bus.published_keys(), vec!["post.created"]);
//! }
//! ```

pub mod event_bus;
pub mod kv_store;
pub mod stores;

use chirp_core::environment::Clock;
use chrono::{DateTime, Utc};

/// Mock implementations of Environment traits.
pub mod mocks {
    #![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity

    use super::{Clock, DateTime, Utc};
    use std::sync::{Arc, Mutex};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use chirp_testing::mocks::FixedClock;
    /// use chirp_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock that only moves when told to.
    ///
    /// Clones share the same time, so a test can keep one handle and pass
    /// another into the code under test.
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        time: Arc<Mutex<DateTime<Utc>>>,
    }

    impl ManualClock {
        /// Start at `time`.
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(Mutex::new(time)),
            }
        }

        /// Move time forward.
        pub fn advance(&self, by: std::time::Duration) {
            let delta = chrono::Duration::from_std(by).unwrap_or_else(|_| chrono::Duration::days(36_500));
            let mut time = self.time.lock().unwrap();
            *time += delta;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.lock().unwrap()
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }

    /// A [`ManualClock`] starting at the same instant as [`test_clock`].
    #[must_use]
    pub fn manual_clock() -> ManualClock {
        ManualClock::new(test_clock().now())
    }
}

/// Install a test-friendly tracing subscriber (ignored if one is set).
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_test_writer()
        .try_init();
}

// Re-export commonly used items
pub use event_bus::InMemoryEventBus;
pub use kv_store::InMemoryKeyValueStore;
pub use mocks::{FixedClock, ManualClock, manual_clock, test_clock};
pub use stores::{
    InMemoryBlobStore, InMemoryMediaStore, InMemoryPostStore, InMemorySearchStore,
    InMemoryUserStore,
};

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        assert_eq!(clock.now(), clock.now());
    }

    #[test]
    fn manual_clock_clones_share_time() {
        let clock = manual_clock();
        let handle = clock.clone();
        let start = clock.now();
        handle.advance(Duration::from_secs(90));
        assert_eq!(clock.now() - start, chrono::Duration::seconds(90));
    }
}

//! # Chirp Core
//!
//! Shared vocabulary for the Chirp services.
//!
//! Every service in the platform depends on this crate and nothing in here
//! performs I/O. It holds:
//!
//! - **Identifiers and models**: [`ids`], [`model`]
//! - **Events**: the typed [`event::PostEvent`] payloads and their routing keys
//! - **Event bus**: the [`event_bus::EventBus`] topic-exchange abstraction,
//!   deliveries and acknowledgement outcomes
//! - **Topic matching**: [`topic::RoutingPattern`] (AMQP-style `*` / `#`)
//!   and [`glob`] key patterns for cache invalidation
//! - **Collaborators**: the [`store`] traits that backends implement
//! - **Errors**: the [`error::PlatformError`] taxonomy surfaced to clients
//!
//! ## Architecture
//!
//! ```text
//!            ┌──────────────┐
//!  client ──►│   gateway    │──► identity / post / media / search
//!            └──────────────┘
//!                                  post service
//!                                       │ 1. write store
//!                                       │ 2. invalidate cache
//!                                       ▼ 3. publish
//!                               ┌───────────────┐
//!                               │ chirp_events  │ (topic exchange)
//!                               └───────┬───────┘
//!                          post.created │ post.deleted
//!                              ┌────────┴────────┐
//!                              ▼                 ▼
//!                         search index      media records
//! ```

pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};

pub mod error;
pub mod event;
pub mod event_bus;
pub mod glob;
pub mod ids;
pub mod model;
pub mod store;
pub mod topic;

/// Environment module - injected dependencies that make time testable.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts the current time for testability.
    ///
    /// Production code uses [`SystemClock`]; tests inject a fixed or
    /// manually advanced clock from `chirp-testing`.
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall-clock time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}

pub use environment::{Clock, SystemClock};

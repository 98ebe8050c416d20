//! # Chirp Runtime
//!
//! The imperative shell shared by every Chirp service:
//!
//! - [`consumer::EventConsumer`]: one task per subscription that decodes
//!   deliveries, runs an [`handler::EventHandler`], retries transient
//!   failures and dead-letters the rest
//! - [`retry::RetryPolicy`]: exponential backoff with jitter
//! - [`lifecycle`]: shutdown broadcast, OS signal handling and task draining

pub mod consumer;
pub mod handler;
pub mod lifecycle;
pub mod retry;

pub use consumer::{
    ConsumerConfigError, ConsumerSetupError, EventConsumer, EventConsumerBuilder, spawn_per_key,
};
pub use handler::{EventHandler, HandlerError};
pub use lifecycle::Shutdown;
pub use retry::{RetryPolicy, retry_with_backoff};

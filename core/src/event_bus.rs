//! Topic-exchange event bus.
//!
//! This module provides the [`EventBus`] trait that the post service publishes
//! to and the search and media services subscribe through.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  publish(post.created)
//! │ post service │────────────────────┐
//! └──────────────┘                    ▼
//!                           ┌───────────────────┐
//!                           │   chirp_events    │  topic exchange
//!                           └─────────┬─────────┘
//!                    ┌────────────────┼────────────────┐
//!          bind post.created  bind post.deleted  bind post.deleted
//!                    ▼                ▼                ▼
//!             ┌────────────┐   ┌────────────┐   ┌────────────┐
//!             │ private q  │   │ private q  │   │ private q  │
//!             └─────┬──────┘   └─────┬──────┘   └─────┬──────┘
//!                   ▼                ▼                ▼
//!                search           search            media
//! ```
//!
//! # Key Principles
//!
//! - **At-most-once**: an event is delivered to each bound queue zero or one
//!   times. The broker never redelivers.
//! - **Ephemeral subscriptions**: a queue exists only while its subscriber is
//!   connected. Events published while nobody is bound are lost.
//! - **Ordered per routing key**: events with the same routing key from one
//!   publisher connection arrive in publish order.
//! - **Explicit acknowledgement**: every [`Delivery`] carries an ack handle.
//!   The bus does not move on to the next event of a subscription until the
//!   consumer reports an [`AckOutcome`] or drops the delivery.
//!
//! # Implementations
//!
//! - `InMemoryEventBus` in `chirp-testing` - for tests
//! - `RedpandaEventBus` in `chirp-redpanda` - Kafka-compatible production bus

use crate::event::{EventDecodeError, PostEvent, SerializedEvent};
use crate::topic::RoutingPattern;
use futures::Stream;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;
use tokio::sync::oneshot;

/// Errors that can occur during event bus operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventBusError {
    /// Failed to connect to the broker
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Failed to publish an event
    #[error("Publish failed for routing key '{routing_key}': {reason}")]
    PublishFailed {
        /// Routing key of the event that failed
        routing_key: String,
        /// The reason for failure
        reason: String,
    },

    /// Failed to bind a subscription
    #[error("Subscription failed for pattern '{pattern}': {reason}")]
    SubscriptionFailed {
        /// The binding pattern
        pattern: String,
        /// The reason for failure
        reason: String,
    },

    /// The event could not be encoded for publishing
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    /// Network or transport error while consuming
    #[error("Transport error: {0}")]
    TransportError(String),
}

impl From<EventDecodeError> for EventBusError {
    fn from(err: EventDecodeError) -> Self {
        Self::SerializationFailed(err.to_string())
    }
}

/// What the consumer did with a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AckOutcome {
    /// The event was applied (or was a no-op).
    Applied,
    /// Processing failed transiently and may succeed if tried again.
    Retry,
    /// Processing can never succeed; the event was set aside.
    DeadLetter,
}

impl AckOutcome {
    /// Label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::Retry => "retry",
            Self::DeadLetter => "dead_letter",
        }
    }
}

/// One event handed to a subscriber, with its acknowledgement handle.
///
/// Dropping a delivery without calling [`Delivery::ack`] acknowledges it as
/// consumed; there is no redelivery either way.
#[derive(Debug)]
pub struct Delivery {
    event: SerializedEvent,
    acker: Option<oneshot::Sender<AckOutcome>>,
}

impl Delivery {
    /// Create a delivery whose outcome is reported on `acker`.
    #[must_use]
    pub const fn new(event: SerializedEvent, acker: oneshot::Sender<AckOutcome>) -> Self {
        Self {
            event,
            acker: Some(acker),
        }
    }

    /// Create a delivery nobody is waiting on.
    #[must_use]
    pub const fn detached(event: SerializedEvent) -> Self {
        Self { event, acker: None }
    }

    /// The raw event.
    #[must_use]
    pub const fn event(&self) -> &SerializedEvent {
        &self.event
    }

    /// Routing key it was published under.
    #[must_use]
    pub fn routing_key(&self) -> &str {
        &self.event.routing_key
    }

    /// Decode the payload into a typed event.
    ///
    /// # Errors
    ///
    /// See [`PostEvent::decode`].
    pub fn decode(&self) -> Result<PostEvent, EventDecodeError> {
        self.event.decode()
    }

    /// Report the outcome and release the subscription to deliver the next
    /// event.
    pub fn ack(mut self, outcome: AckOutcome) {
        if let Some(acker) = self.acker.take() {
            // The bus may have shut down; nothing left to tell it.
            let _ = acker.send(outcome);
        }
    }
}

/// Stream of deliveries for one subscription.
pub type DeliveryStream = Pin<Box<dyn Stream<Item = Result<Delivery, EventBusError>> + Send>>;

/// Trait for topic-exchange event bus implementations.
///
/// # Dyn Compatibility
///
/// This trait uses explicit `Pin<Box<dyn Future>>` returns instead of `async fn`
/// so services can hold the bus as `Arc<dyn EventBus>` and swap the
/// in-memory implementation in for tests.
pub trait EventBus: Send + Sync {
    /// Hand an event to the exchange under its routing key.
    ///
    /// Completes once the broker has accepted the event. It does not wait
    /// for any subscriber.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::PublishFailed`] or
    /// [`EventBusError::ConnectionFailed`] when the broker is unreachable.
    /// Failed publishes are never buffered for later.
    fn publish(
        &self,
        event: &SerializedEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>>;

    /// Bind a private, ephemeral queue to `pattern` and stream its deliveries.
    ///
    /// Only events published after the binding exists are delivered.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::SubscriptionFailed`] if the binding fails.
    fn subscribe(
        &self,
        pattern: &RoutingPattern,
    ) -> Pin<Box<dyn Future<Output = Result<DeliveryStream, EventBusError>> + Send + '_>>;

    /// Serialize and publish a typed event.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::SerializationFailed`] if encoding fails, or
    /// any error from [`EventBus::publish`].
    fn publish_event<'a>(
        &'a self,
        event: &PostEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + 'a>> {
        let serialized = SerializedEvent::from_event(event);
        Box::pin(async move { self.publish(&serialized?).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event() -> SerializedEvent {
        SerializedEvent::new("post.created".to_string(), b"{}".to_vec())
    }

    #[test]
    fn ack_reports_the_outcome() {
        let (tx, mut rx) = oneshot::channel();
        let delivery = Delivery::new(event(), tx);
        delivery.ack(AckOutcome::DeadLetter);
        assert_eq!(rx.try_recv(), Ok(AckOutcome::DeadLetter));
    }

    #[test]
    fn dropping_a_delivery_closes_the_ack_channel() {
        let (tx, mut rx) = oneshot::channel::<AckOutcome>();
        drop(Delivery::new(event(), tx));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn detached_deliveries_ack_silently() {
        let delivery = Delivery::detached(event());
        assert_eq!(delivery.routing_key(), "post.created");
        delivery.ack(AckOutcome::Applied);
    }
}

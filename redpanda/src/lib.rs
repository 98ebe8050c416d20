//! Redpanda event bus for Chirp.
//!
//! This crate implements the [`EventBus`] trait from `chirp-core` over the
//! Kafka protocol using rdkafka. It works against Redpanda, Apache Kafka or
//! any other Kafka-compatible broker.
//!
//! # Topic exchange over Kafka
//!
//! ```text
//!  publish(post.deleted)
//!         │  key = routing key
//!         ▼
//! ┌──────────────────────────┐
//! │ topic "chirp_events"     │  one partition, publish order kept
//! └────────────┬─────────────┘
//!      ┌───────┴────────┐
//!      ▼                ▼
//!  group chirp_events-<uuid>   group chirp_events-<uuid>
//!  filter "post.*"             filter "post.deleted"
//!      │                │
//!      ▼                ▼
//!   search            media
//! ```
//!
//! - The exchange is a single topic; the routing key travels as the message
//!   key.
//! - Every subscription gets a fresh consumer group starting at `latest`, so
//!   it only sees events published after it joined and it disappears with its
//!   subscriber.
//! - Binding patterns are applied on the consumer side. Non-matching messages
//!   are committed and skipped.
//!
//! # Delivery Semantics
//!
//! **At-most-once** from the point of view of a subscriber:
//! - A subscription hands out one [`Delivery`] at a time and waits for its
//!   [`AckOutcome`] before committing and moving on
//! - Every outcome commits the offset; redelivery is never requested from the
//!   broker
//! - A new subscription never replays history
//!
//! # Example
//!
//! ```no_run
//! use chirp_redpanda::{BusConnection, RedpandaEventBus};
//! use chirp_core::event_bus::{AckOutcome, EventBus};
//! use chirp_core::topic::RoutingPattern;
//! use futures::StreamExt;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let connection = BusConnection::connect("localhost:9092").await?;
//! let event_bus = RedpandaEventBus::new(connection);
//!
//! let mut stream = event_bus.subscribe(&RoutingPattern::parse("post.*")?).await?;
//! while let Some(result) = stream.next().await {
//!     let delivery = result?;
//!     println!("Received: {}", delivery.routing_key());
//!     delivery.ack(AckOutcome::Applied);
//! }
//! # Ok(())
//! # }
//! ```

mod connection;

pub use connection::{BusConnection, BusConnectionBuilder};

use chirp_core::event::SerializedEvent;
use chirp_core::event_bus::{AckOutcome, Delivery, DeliveryStream, EventBus, EventBusError};
use chirp_core::topic::RoutingPattern;
use futures::StreamExt;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Message};
use rdkafka::producer::FutureRecord;
use rdkafka::util::Timeout;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

/// Kafka-protocol implementation of [`EventBus`].
///
/// Cheap to clone; all clones share one [`BusConnection`].
#[derive(Clone, Debug)]
pub struct RedpandaEventBus {
    connection: Arc<BusConnection>,
}

impl RedpandaEventBus {
    /// Create a bus over an established connection.
    #[must_use]
    pub const fn new(connection: Arc<BusConnection>) -> Self {
        Self { connection }
    }

    /// The underlying connection.
    #[must_use]
    pub fn connection(&self) -> &BusConnection {
        &self.connection
    }
}

impl EventBus for RedpandaEventBus {
    fn publish(
        &self,
        event: &SerializedEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        // Clone data before moving into async block
        let event = event.clone();

        Box::pin(async move {
            let producer = self.connection.producer()?;
            let record = FutureRecord::to(self.connection.exchange())
                .key(event.routing_key.as_str())
                .payload(&event.data);

            match producer
                .send(record, Timeout::After(self.connection.timeout()))
                .await
            {
                Ok((partition, offset)) => {
                    tracing::debug!(
                        routing_key = %event.routing_key,
                        partition,
                        offset,
                        "Event published"
                    );
                    metrics::counter!("bus.published", "routing_key" => event.routing_key.clone())
                        .increment(1);
                    Ok(())
                }
                Err((kafka_error, _)) => {
                    tracing::error!(
                        routing_key = %event.routing_key,
                        error = %kafka_error,
                        "Failed to publish event"
                    );
                    metrics::counter!("bus.publish_failures").increment(1);
                    self.connection.reset_producer();
                    Err(EventBusError::PublishFailed {
                        routing_key: event.routing_key,
                        reason: kafka_error.to_string(),
                    })
                }
            }
        })
    }

    fn subscribe(
        &self,
        pattern: &RoutingPattern,
    ) -> Pin<Box<dyn Future<Output = Result<DeliveryStream, EventBusError>> + Send + '_>> {
        let pattern = pattern.clone();

        Box::pin(async move {
            let group_id = format!("{}-{}", self.connection.exchange(), Uuid::new_v4());
            let failed = |reason: String| EventBusError::SubscriptionFailed {
                pattern: pattern.to_string(),
                reason,
            };

            let consumer: StreamConsumer = self
                .connection
                .consumer_config(&group_id)
                .create()
                .map_err(|e| failed(format!("Failed to create consumer: {e}")))?;
            consumer
                .subscribe(&[self.connection.exchange()])
                .map_err(|e| failed(format!("Failed to subscribe to exchange: {e}")))?;

            tracing::info!(
                pattern = %pattern,
                consumer_group = %group_id,
                "Subscribed to exchange"
            );

            // One slot: the next message is only read after the previous
            // delivery has been acknowledged.
            let (tx, rx) = mpsc::channel(1);
            tokio::spawn(forward(consumer, pattern, tx));

            let stream = async_stream::stream! {
                let mut rx = rx;
                while let Some(result) = rx.recv().await {
                    yield result;
                }
            };

            Ok(Box::pin(stream) as DeliveryStream)
        })
    }
}

/// Owns the consumer for one subscription and feeds matching messages to the
/// subscriber, one acknowledged delivery at a time.
async fn forward(
    consumer: StreamConsumer,
    pattern: RoutingPattern,
    tx: mpsc::Sender<Result<Delivery, EventBusError>>,
) {
    let mut stream = consumer.stream();

    loop {
        let next = tokio::select! {
            next = stream.next() => next,
            () = tx.closed() => break,
        };
        let Some(result) = next else { break };

        let message = match result {
            Ok(message) => message,
            Err(e) => {
                let err = EventBusError::TransportError(format!("Failed to receive message: {e}"));
                if tx.send(Err(err)).await.is_err() {
                    break;
                }
                continue;
            }
        };

        let Some(routing_key) = message.key().and_then(|k| std::str::from_utf8(k).ok()) else {
            tracing::warn!(offset = message.offset(), "Skipping message without a routing key");
            commit(&consumer, &message);
            continue;
        };
        if !pattern.matches(routing_key) {
            commit(&consumer, &message);
            continue;
        }

        let event = SerializedEvent::new(
            routing_key.to_string(),
            message.payload().unwrap_or_default().to_vec(),
        );
        let (ack_tx, ack_rx) = oneshot::channel();
        if tx.send(Ok(Delivery::new(event, ack_tx))).await.is_err() {
            tracing::debug!("Subscriber dropped, closing subscription");
            break;
        }

        let outcome = ack_rx.await.unwrap_or(AckOutcome::Applied);
        tracing::trace!(
            routing_key,
            offset = message.offset(),
            outcome = outcome.as_str(),
            "Delivery acknowledged"
        );
        commit(&consumer, &message);
    }

    tracing::debug!(pattern = %pattern, "Subscription closed");
}

fn commit(consumer: &StreamConsumer, message: &BorrowedMessage<'_>) {
    if let Err(e) = consumer.commit_message(message, CommitMode::Async) {
        tracing::warn!(
            partition = message.partition(),
            offset = message.offset(),
            error = %e,
            "Failed to commit offset"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redpanda_event_bus_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<RedpandaEventBus>();
        assert_sync::<RedpandaEventBus>();
    }
}

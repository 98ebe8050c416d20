//! In-memory topic exchange.
//!
//! Behaves like the production bus from a subscriber's point of view:
//! each [`EventBus::subscribe`] call creates a private queue that only sees
//! events published after it was bound, and the queue disappears when its
//! stream is dropped. Every publish and every acknowledgement outcome is
//! recorded for assertions.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity

use chirp_core::event::{PostEvent, SerializedEvent};
use chirp_core::event_bus::{AckOutcome, Delivery, DeliveryStream, EventBus, EventBusError};
use chirp_core::topic::RoutingPattern;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

#[derive(Debug)]
struct Queue {
    pattern: RoutingPattern,
    tx: mpsc::UnboundedSender<SerializedEvent>,
}

#[derive(Debug, Default)]
struct Inner {
    queues: Vec<Queue>,
    published: Vec<SerializedEvent>,
    outcomes: Vec<(String, AckOutcome)>,
    unavailable: bool,
}

/// In-memory [`EventBus`] for tests.
///
/// # Example
///
/// ```
/// use chirp_testing::InMemoryEventBus;
/// use chirp_core::event_bus::EventBus;
/// use chirp_core::event::SerializedEvent;
///
/// # tokio_test::block_on(async {
/// let bus = InMemoryEventBus::new();
/// bus.publish(&SerializedEvent::new("post.created".into(), b"{}".to_vec()))
///     .await
///     .unwrap();
/// assert_eq!(bus.published_keys(), vec!["post.created"]);
/// # });
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryEventBus {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryEventBus {
    /// Create a bus with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the broker going away (`true`) or coming back (`false`).
    ///
    /// While unavailable, publish and subscribe fail with
    /// [`EventBusError::ConnectionFailed`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.lock().unwrap().unavailable = unavailable;
    }

    /// Every event accepted so far, in publish order.
    #[must_use]
    pub fn published(&self) -> Vec<SerializedEvent> {
        self.inner.lock().unwrap().published.clone()
    }

    /// Routing keys of every accepted event, in publish order.
    #[must_use]
    pub fn published_keys(&self) -> Vec<String> {
        self.inner
            .lock()
            .unwrap()
            .published
            .iter()
            .map(|e| e.routing_key.clone())
            .collect()
    }

    /// Every accepted event that decodes as a [`PostEvent`].
    #[must_use]
    pub fn published_events(&self) -> Vec<PostEvent> {
        self.inner
            .lock()
            .unwrap()
            .published
            .iter()
            .filter_map(|e| e.decode().ok())
            .collect()
    }

    /// Acknowledgement outcomes reported by subscribers, with routing keys.
    #[must_use]
    pub fn outcomes(&self) -> Vec<(String, AckOutcome)> {
        self.inner.lock().unwrap().outcomes.clone()
    }

    /// Number of queues currently bound.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        let mut inner = self.inner.lock().unwrap();
        inner.queues.retain(|q| !q.tx.is_closed());
        inner.queues.len()
    }

    /// Wait until at least `count` subscribers are bound.
    ///
    /// Returns `false` if that does not happen within `timeout`.
    pub async fn wait_for_subscribers(&self, count: usize, timeout: Duration) -> bool {
        self.wait_until(timeout, || self.subscriber_count() >= count)
            .await
    }

    /// Wait until at least `count` outcomes have been recorded.
    ///
    /// Returns `false` if that does not happen within `timeout`.
    pub async fn wait_for_outcomes(&self, count: usize, timeout: Duration) -> bool {
        self.wait_until(timeout, || self.inner.lock().unwrap().outcomes.len() >= count)
            .await
    }

    async fn wait_until(&self, timeout: Duration, condition: impl Fn() -> bool) -> bool {
        tokio::time::timeout(timeout, async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .is_ok()
    }

    fn unavailable_error() -> EventBusError {
        EventBusError::ConnectionFailed("in-memory bus marked unavailable".to_string())
    }
}

impl EventBus for InMemoryEventBus {
    fn publish(
        &self,
        event: &SerializedEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        let event = event.clone();
        Box::pin(async move {
            let mut inner = self.inner.lock().unwrap();
            if inner.unavailable {
                return Err(Self::unavailable_error());
            }

            // Fan out to matching queues; drop queues whose subscriber is gone
            inner.queues.retain(|queue| {
                if queue.pattern.matches(&event.routing_key) {
                    queue.tx.send(event.clone()).is_ok()
                } else {
                    !queue.tx.is_closed()
                }
            });
            inner.published.push(event);
            Ok(())
        })
    }

    fn subscribe(
        &self,
        pattern: &RoutingPattern,
    ) -> Pin<Box<dyn Future<Output = Result<DeliveryStream, EventBusError>> + Send + '_>> {
        let pattern = pattern.clone();
        Box::pin(async move {
            let mut rx = {
                let mut inner = self.inner.lock().unwrap();
                if inner.unavailable {
                    return Err(Self::unavailable_error());
                }
                let (tx, rx) = mpsc::unbounded_channel();
                inner.queues.push(Queue { pattern, tx });
                rx
            };

            let recorder = Arc::clone(&self.inner);
            let stream = async_stream::stream! {
                while let Some(event) = rx.recv().await {
                    let routing_key = event.routing_key.clone();
                    let (ack_tx, ack_rx) = oneshot::channel();
                    yield Ok(Delivery::new(event, ack_tx));

                    // A dropped delivery counts as consumed
                    let outcome = ack_rx.await.unwrap_or(AckOutcome::Applied);
                    recorder.lock().unwrap().outcomes.push((routing_key, outcome));
                }
            };

            Ok(Box::pin(stream) as DeliveryStream)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn event(key: &str) -> SerializedEvent {
        SerializedEvent::new(key.to_string(), b"{}".to_vec())
    }

    fn pattern(p: &str) -> RoutingPattern {
        RoutingPattern::parse(p).unwrap()
    }

    #[tokio::test]
    async fn fans_out_to_every_matching_queue() {
        let bus = InMemoryEventBus::new();
        let mut created = bus.subscribe(&pattern("post.created")).await.unwrap();
        let mut any = bus.subscribe(&pattern("post.*")).await.unwrap();

        bus.publish(&event("post.created")).await.unwrap();
        bus.publish(&event("post.deleted")).await.unwrap();

        let first = created.next().await.unwrap().unwrap();
        assert_eq!(first.routing_key(), "post.created");
        first.ack(AckOutcome::Applied);

        let a = any.next().await.unwrap().unwrap();
        assert_eq!(a.routing_key(), "post.created");
        a.ack(AckOutcome::Applied);
        let b = any.next().await.unwrap().unwrap();
        assert_eq!(b.routing_key(), "post.deleted");
        b.ack(AckOutcome::Retry);
    }

    #[tokio::test]
    async fn events_before_binding_are_lost() {
        let bus = InMemoryEventBus::new();
        bus.publish(&event("post.created")).await.unwrap();

        let mut stream = bus.subscribe(&pattern("#")).await.unwrap();
        bus.publish(&event("post.deleted")).await.unwrap();

        let delivery = stream.next().await.unwrap().unwrap();
        assert_eq!(delivery.routing_key(), "post.deleted");
    }

    #[tokio::test]
    async fn dropped_streams_unbind_their_queue() {
        let bus = InMemoryEventBus::new();
        let stream = bus.subscribe(&pattern("#")).await.unwrap();
        assert_eq!(bus.subscriber_count(), 1);
        drop(stream);
        bus.publish(&event("post.created")).await.unwrap();
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn records_outcomes_once_the_next_delivery_is_requested() {
        let bus = InMemoryEventBus::new();
        let mut stream = bus.subscribe(&pattern("post.deleted")).await.unwrap();
        bus.publish(&event("post.deleted")).await.unwrap();
        bus.publish(&event("post.deleted")).await.unwrap();

        stream.next().await.unwrap().unwrap().ack(AckOutcome::DeadLetter);
        assert!(bus.outcomes().is_empty());
        stream.next().await.unwrap().unwrap().ack(AckOutcome::Applied);

        assert_eq!(
            bus.outcomes().first(),
            Some(&("post.deleted".to_string(), AckOutcome::DeadLetter))
        );
    }

    #[tokio::test]
    async fn unavailable_bus_fails_loudly() {
        let bus = InMemoryEventBus::new();
        bus.set_unavailable(true);
        assert!(matches!(
            bus.publish(&event("post.created")).await,
            Err(EventBusError::ConnectionFailed(_))
        ));
        assert!(bus.subscribe(&pattern("#")).await.is_err());
        assert!(bus.published().is_empty());
    }
}

//! Event bus consumer with automatic reconnection.
//!
//! One [`EventConsumer`] owns one subscription and runs in its own task.
//! A service that listens to two routing keys spawns two consumers.
//!
//! # Pattern: Subscribe-Process-Reconnect Loop
//!
//! ```text
//! loop {
//!     subscribe(pattern)
//!     for each delivery:
//!         decode            ── malformed ──► dead-letter, ack DeadLetter
//!         handle
//!           Ok              ──────────────► ack Applied
//!           Transient       ── retry with backoff up to max_retries
//!                              exhausted ──► dead-letter, ack DeadLetter
//!           Permanent       ──────────────► dead-letter, ack DeadLetter
//!     stream ended / subscribe failed:
//!         wait reconnect_delay
//! }
//! ```
//!
//! Dead-lettering republishes the original payload under
//! `dead_letter.<routing_key>` and logs it. The broker message is
//! acknowledged in every case; there is no broker redelivery.
//!
//! # Example
//!
//! ```rust,ignore
//! let consumer = EventConsumer::builder()
//!     .name("search-index-created")
//!     .pattern(RoutingPattern::exact(POST_CREATED)?)
//!     .event_bus(event_bus)
//!     .handler(projection)
//!     .shutdown(shutdown.subscribe())
//!     .build()?;
//!
//! let handle = consumer.spawn();
//! ```

use crate::handler::{EventHandler, HandlerError};
use crate::retry::RetryPolicy;
use chirp_core::event::{PostEvent, SerializedEvent, dead_letter_key};
use chirp_core::event_bus::{AckOutcome, Delivery, DeliveryStream, EventBus};
use chirp_core::topic::{PatternError, RoutingPattern};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// A required builder field was not set.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("EventConsumer is missing required field '{0}'")]
pub struct ConsumerConfigError(pub &'static str);

/// Consumes one subscription and feeds it through an [`EventHandler`].
pub struct EventConsumer {
    name: String,
    pattern: RoutingPattern,
    event_bus: Arc<dyn EventBus>,
    handler: Arc<dyn EventHandler>,
    shutdown: broadcast::Receiver<()>,
    reconnect_delay: Duration,
    retry_policy: RetryPolicy,
}

impl std::fmt::Debug for EventConsumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventConsumer")
            .field("name", &self.name)
            .field("pattern", &self.pattern.as_str())
            .field("reconnect_delay", &self.reconnect_delay)
            .field("retry_policy", &self.retry_policy)
            .finish_non_exhaustive()
    }
}

impl EventConsumer {
    /// Create a builder for configuring a consumer.
    #[must_use]
    pub fn builder() -> EventConsumerBuilder {
        EventConsumerBuilder::default()
    }

    /// Consumer name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Spawn the consumer as a background task.
    ///
    /// The task runs until a shutdown signal is received.
    #[must_use]
    pub fn spawn(mut self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    /// Run the subscribe-process-reconnect loop on the current task.
    pub async fn run(&mut self) {
        info!(consumer = %self.name, pattern = %self.pattern, "Event consumer started");

        loop {
            let subscribed = tokio::select! {
                _ = self.shutdown.recv() => break,
                result = self.event_bus.subscribe(&self.pattern) => result,
            };

            match subscribed {
                Ok(stream) => {
                    info!(consumer = %self.name, pattern = %self.pattern, "Subscribed to event bus");
                    if self.process_stream(stream).await.is_break() {
                        break;
                    }
                    warn!(
                        consumer = %self.name,
                        delay_ms = u64::try_from(self.reconnect_delay.as_millis()).unwrap_or(u64::MAX),
                        "Event stream ended, reconnecting"
                    );
                }
                Err(e) => {
                    error!(
                        consumer = %self.name,
                        error = %e,
                        delay_ms = u64::try_from(self.reconnect_delay.as_millis()).unwrap_or(u64::MAX),
                        "Failed to subscribe to event bus, retrying"
                    );
                }
            }

            tokio::select! {
                _ = self.shutdown.recv() => break,
                () = tokio::time::sleep(self.reconnect_delay) => {}
            }
        }

        info!(consumer = %self.name, "Event consumer stopped");
    }

    /// Process deliveries until the stream ends (`Continue`) or shutdown is
    /// requested (`Break`).
    async fn process_stream(&mut self, mut stream: DeliveryStream) -> std::ops::ControlFlow<()> {
        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    info!(consumer = %self.name, "Shutdown requested during processing");
                    return std::ops::ControlFlow::Break(());
                }
                next = stream.next() => match next {
                    Some(Ok(delivery)) => self.process_delivery(delivery).await,
                    Some(Err(e)) => {
                        error!(consumer = %self.name, error = %e, "Error receiving event from stream");
                    }
                    None => return std::ops::ControlFlow::Continue(()),
                }
            }
        }
    }

    /// Decode, handle and acknowledge one delivery.
    pub async fn process_delivery(&self, delivery: Delivery) {
        let outcome = match delivery.decode() {
            Ok(event) => {
                let outcome = self.apply_with_retry(&event).await;
                if outcome == AckOutcome::DeadLetter {
                    self.dead_letter(delivery.event(), "handler gave up").await;
                }
                outcome
            }
            Err(e) => {
                warn!(
                    consumer = %self.name,
                    routing_key = %delivery.routing_key(),
                    error = %e,
                    "Rejecting malformed event"
                );
                self.dead_letter(delivery.event(), &e.to_string()).await;
                AckOutcome::DeadLetter
            }
        };

        metrics::counter!(
            "consumer.events",
            "consumer" => self.name.clone(),
            "outcome" => outcome.as_str()
        )
        .increment(1);
        delivery.ack(outcome);
    }

    async fn apply_with_retry(&self, event: &PostEvent) -> AckOutcome {
        let mut attempt = 0;

        loop {
            match self.handler.handle(event).await {
                Ok(()) => return AckOutcome::Applied,
                Err(HandlerError::Permanent(reason)) => {
                    error!(
                        consumer = %self.name,
                        post_id = %event.post_id(),
                        reason = %reason,
                        "Handler failed permanently"
                    );
                    return AckOutcome::DeadLetter;
                }
                Err(HandlerError::Transient(reason)) if attempt >= self.retry_policy.max_retries => {
                    error!(
                        consumer = %self.name,
                        post_id = %event.post_id(),
                        attempts = attempt + 1,
                        reason = %reason,
                        "Handler retries exhausted"
                    );
                    return AckOutcome::DeadLetter;
                }
                Err(HandlerError::Transient(reason)) => {
                    let delay = self.retry_policy.delay_for_attempt(attempt);
                    warn!(
                        consumer = %self.name,
                        post_id = %event.post_id(),
                        attempt,
                        reason = %reason,
                        "Handler failed transiently, retrying"
                    );
                    metrics::counter!("consumer.retries", "consumer" => self.name.clone())
                        .increment(1);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn dead_letter(&self, event: &SerializedEvent, reason: &str) {
        let dead = SerializedEvent::new(dead_letter_key(&event.routing_key), event.data.clone());
        error!(
            consumer = %self.name,
            routing_key = %event.routing_key,
            dead_letter_key = %dead.routing_key,
            reason,
            "Dead-lettering event"
        );
        if let Err(e) = self.event_bus.publish(&dead).await {
            error!(consumer = %self.name, error = %e, "Failed to publish dead letter; event dropped");
        }
    }
}

/// Builder for configuring an [`EventConsumer`].
#[derive(Default)]
pub struct EventConsumerBuilder {
    name: Option<String>,
    pattern: Option<RoutingPattern>,
    event_bus: Option<Arc<dyn EventBus>>,
    handler: Option<Arc<dyn EventHandler>>,
    shutdown: Option<broadcast::Receiver<()>>,
    reconnect_delay: Option<Duration>,
    retry_policy: Option<RetryPolicy>,
}

impl EventConsumerBuilder {
    /// Set consumer name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the binding pattern.
    #[must_use]
    pub fn pattern(mut self, pattern: RoutingPattern) -> Self {
        self.pattern = Some(pattern);
        self
    }

    /// Set event bus instance.
    #[must_use]
    pub fn event_bus(mut self, event_bus: Arc<dyn EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Set event handler.
    #[must_use]
    pub fn handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Set shutdown signal receiver.
    #[must_use]
    pub fn shutdown(mut self, shutdown: broadcast::Receiver<()>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Delay before resubscribing after a failure (default: 5 seconds).
    #[must_use]
    pub const fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = Some(delay);
        self
    }

    /// Retry policy for transient handler failures (default: [`RetryPolicy::default`]).
    #[must_use]
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    /// Build the [`EventConsumer`].
    ///
    /// # Errors
    ///
    /// Returns [`ConsumerConfigError`] naming the first required field
    /// (name, pattern, `event_bus`, handler, shutdown) that was not set.
    pub fn build(self) -> Result<EventConsumer, ConsumerConfigError> {
        Ok(EventConsumer {
            name: self.name.ok_or(ConsumerConfigError("name"))?,
            pattern: self.pattern.ok_or(ConsumerConfigError("pattern"))?,
            event_bus: self.event_bus.ok_or(ConsumerConfigError("event_bus"))?,
            handler: self.handler.ok_or(ConsumerConfigError("handler"))?,
            shutdown: self.shutdown.ok_or(ConsumerConfigError("shutdown"))?,
            reconnect_delay: self.reconnect_delay.unwrap_or(Duration::from_secs(5)),
            retry_policy: self.retry_policy.unwrap_or_default(),
        })
    }
}

/// Failure to set up consumers with [`spawn_per_key`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConsumerSetupError {
    /// A routing key is not a valid exact pattern
    #[error(transparent)]
    Pattern(#[from] PatternError),

    /// The consumer could not be built
    #[error(transparent)]
    Config(#[from] ConsumerConfigError),
}

/// Spawn one [`EventConsumer`] per routing key, all feeding `handler`.
///
/// Consumers are named `<prefix>-<routing_key>` and stop when `shutdown`
/// fires. Returns the named handles for [`Shutdown::drain`](crate::Shutdown::drain).
///
/// # Errors
///
/// Returns [`ConsumerSetupError`] if a routing key is not a valid pattern.
pub fn spawn_per_key(
    prefix: &str,
    routing_keys: &[&str],
    event_bus: &Arc<dyn EventBus>,
    handler: &Arc<dyn EventHandler>,
    shutdown: &crate::Shutdown,
    retry_policy: &RetryPolicy,
) -> Result<Vec<(String, tokio::task::JoinHandle<()>)>, ConsumerSetupError> {
    routing_keys
        .iter()
        .map(|key| {
            let consumer = EventConsumer::builder()
                .name(format!("{prefix}-{key}"))
                .pattern(RoutingPattern::exact(key)?)
                .event_bus(Arc::clone(event_bus))
                .handler(Arc::clone(handler))
                .shutdown(shutdown.subscribe())
                .retry_policy(retry_policy.clone())
                .build()?;
            Ok((consumer.name().to_string(), consumer.spawn()))
        })
        .collect()
}

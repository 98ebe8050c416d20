//! Long-lived broker connection shared by publishers and subscribers.

use chirp_core::event::EXCHANGE_NAME;
use chirp_core::event_bus::EventBusError;
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::error::RDKafkaErrorCode;
use rdkafka::producer::{FutureProducer, Producer};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// One process-wide connection to the broker.
///
/// Created once at startup by [`BusConnection::connect`], which fails if the
/// broker cannot be reached. The producer is rebuilt lazily after a publish
/// failure; consumers are created per subscription from the same settings.
///
/// # Example
///
/// ```no_run
/// use chirp_redpanda::{BusConnection, RedpandaEventBus};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let connection = BusConnection::connect("localhost:9092").await?;
/// let bus = RedpandaEventBus::new(connection);
/// # Ok(())
/// # }
/// ```
pub struct BusConnection {
    brokers: String,
    exchange: String,
    producer_config: ClientConfig,
    timeout: Duration,
    producer: Mutex<Option<FutureProducer>>,
}

impl std::fmt::Debug for BusConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusConnection")
            .field("brokers", &self.brokers)
            .field("exchange", &self.exchange)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl BusConnection {
    /// Connect to `brokers` with default settings.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] if the broker is
    /// unreachable or the exchange topic cannot be declared.
    pub async fn connect(brokers: &str) -> Result<Arc<Self>, EventBusError> {
        Self::builder().brokers(brokers).connect().await
    }

    /// Create a builder.
    #[must_use]
    pub fn builder() -> BusConnectionBuilder {
        BusConnectionBuilder::default()
    }

    /// Bootstrap servers.
    #[must_use]
    pub fn brokers(&self) -> &str {
        &self.brokers
    }

    /// Topic that plays the role of the exchange.
    #[must_use]
    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    /// Producer send timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The current producer, rebuilding it if the last one was discarded.
    pub(crate) fn producer(&self) -> Result<FutureProducer, EventBusError> {
        let mut slot = self.producer.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(producer) = slot.as_ref() {
            return Ok(producer.clone());
        }

        let producer: FutureProducer = self.producer_config.create().map_err(|e| {
            EventBusError::ConnectionFailed(format!("Failed to create producer: {e}"))
        })?;
        tracing::info!(brokers = %self.brokers, "Producer re-established");
        *slot = Some(producer.clone());
        Ok(producer)
    }

    /// Discard the producer after a failure. The next publish rebuilds it.
    pub(crate) fn reset_producer(&self) {
        let mut slot = self.producer.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.take().is_some() {
            tracing::warn!(brokers = %self.brokers, "Producer discarded after failure");
        }
    }

    /// Consumer settings for one ephemeral subscription.
    pub(crate) fn consumer_config(&self, group_id: &str) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", &self.brokers)
            .set("group.id", group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "latest")
            .set("session.timeout.ms", "6000")
            .set("enable.partition.eof", "false");
        config
    }
}

/// Builder for [`BusConnection`].
#[derive(Debug, Default)]
pub struct BusConnectionBuilder {
    brokers: Option<String>,
    exchange: Option<String>,
    producer_acks: Option<String>,
    compression: Option<String>,
    timeout: Option<Duration>,
}

impl BusConnectionBuilder {
    /// Comma-separated bootstrap servers (e.g. `"localhost:9092"`).
    #[must_use]
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = Some(brokers.into());
        self
    }

    /// Exchange topic name.
    ///
    /// Default: `chirp_events`
    #[must_use]
    pub fn exchange(mut self, exchange: impl Into<String>) -> Self {
        self.exchange = Some(exchange.into());
        self
    }

    /// Producer acknowledgment mode: `"0"`, `"1"` or `"all"`.
    ///
    /// Default: `"1"`
    #[must_use]
    pub fn producer_acks(mut self, acks: impl Into<String>) -> Self {
        self.producer_acks = Some(acks.into());
        self
    }

    /// Compression codec: `"none"`, `"gzip"`, `"snappy"`, `"lz4"`, `"zstd"`.
    ///
    /// Default: `"none"`
    #[must_use]
    pub fn compression(mut self, compression: impl Into<String>) -> Self {
        self.compression = Some(compression.into());
        self
    }

    /// Producer send and startup probe timeout.
    ///
    /// Default: 5 seconds
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Connect, verify the broker answers and declare the exchange topic.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] if brokers are not set,
    /// the broker does not answer a metadata request within the timeout, or
    /// the exchange topic cannot be created.
    pub async fn connect(self) -> Result<Arc<BusConnection>, EventBusError> {
        let brokers = self
            .brokers
            .ok_or_else(|| EventBusError::ConnectionFailed("Brokers not configured".to_string()))?;
        let exchange = self.exchange.unwrap_or_else(|| EXCHANGE_NAME.to_string());
        let timeout = self.timeout.unwrap_or(Duration::from_secs(5));
        let timeout_ms = timeout.as_millis().to_string();

        let mut producer_config = ClientConfig::new();
        producer_config
            .set("bootstrap.servers", &brokers)
            .set("message.timeout.ms", &timeout_ms)
            .set("acks", self.producer_acks.as_deref().unwrap_or("1"))
            .set("compression.type", self.compression.as_deref().unwrap_or("none"));

        let producer: FutureProducer = producer_config.create().map_err(|e| {
            EventBusError::ConnectionFailed(format!("Failed to create producer: {e}"))
        })?;

        probe(&producer, timeout).await?;
        declare_exchange(&producer_config, &exchange, timeout).await?;

        tracing::info!(
            brokers = %brokers,
            exchange = %exchange,
            acks = self.producer_acks.as_deref().unwrap_or("1"),
            compression = self.compression.as_deref().unwrap_or("none"),
            "Connected to event bus"
        );

        Ok(Arc::new(BusConnection {
            brokers,
            exchange,
            producer_config,
            timeout,
            producer: Mutex::new(Some(producer)),
        }))
    }
}

/// Ask the cluster for metadata so an unreachable broker fails startup.
async fn probe(producer: &FutureProducer, timeout: Duration) -> Result<(), EventBusError> {
    let producer = producer.clone();
    let metadata = tokio::task::spawn_blocking(move || {
        producer
            .client()
            .fetch_metadata(None, timeout)
            .map(|m| m.brokers().len())
    })
    .await
    .map_err(|e| EventBusError::ConnectionFailed(format!("Metadata probe aborted: {e}")))?;

    let brokers = metadata
        .map_err(|e| EventBusError::ConnectionFailed(format!("Broker unreachable: {e}")))?;
    tracing::debug!(brokers, "Broker metadata received");
    Ok(())
}

/// Create the exchange topic with a single partition so every subscriber
/// sees events in publish order. An existing topic is left untouched.
async fn declare_exchange(
    config: &ClientConfig,
    exchange: &str,
    timeout: Duration,
) -> Result<(), EventBusError> {
    let admin: AdminClient<DefaultClientContext> = config.create().map_err(|e| {
        EventBusError::ConnectionFailed(format!("Failed to create admin client: {e}"))
    })?;

    let topic = NewTopic::new(exchange, 1, TopicReplication::Fixed(1));
    let options = AdminOptions::new().operation_timeout(Some(timeout));
    let results = admin
        .create_topics([&topic], &options)
        .await
        .map_err(|e| EventBusError::ConnectionFailed(format!("Failed to declare exchange: {e}")))?;

    for result in results {
        match result {
            Ok(name) => tracing::info!(exchange = %name, "Exchange topic created"),
            Err((_, RDKafkaErrorCode::TopicAlreadyExists)) => {}
            Err((name, code)) => {
                return Err(EventBusError::ConnectionFailed(format!(
                    "Failed to declare exchange {name}: {code}"
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_requires_brokers() {
        let result = BusConnection::builder().connect().await;
        assert!(matches!(result, Err(EventBusError::ConnectionFailed(_))));
    }

    #[test]
    fn connection_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<BusConnection>();
    }
}

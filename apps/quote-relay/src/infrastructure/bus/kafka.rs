//! Kafka Bus Adapters
//!
//! Native client for the bus: the producer publishes each message to its
//! topic with the partition key as the record key, and the consumer joins a
//! consumer group on one topic and yields records as `key:value` lines.
//!
//! Publishing waits for the broker's delivery report, so a returned `Ok`
//! means the record was acknowledged.

use std::time::Duration;

use async_trait::async_trait;
use rdkafka::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;

use crate::application::ports::{BusError, BusMessage, BusPublisher, BusSubscriber, PublishError};
use crate::infrastructure::config::BusSettings;

/// Default delivery timeout for published records.
pub const DEFAULT_MESSAGE_TIMEOUT: Duration = Duration::from_secs(30);

/// Kafka adapter errors.
#[derive(Debug, thiserror::Error)]
pub enum KafkaBusError {
    /// No bootstrap brokers were configured.
    #[error("no Kafka brokers configured")]
    NoBrokers,

    /// The client could not be created or subscribed.
    #[error("Kafka client error: {0}")]
    Client(#[from] KafkaError),
}

/// Connection settings shared by the producer and the consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KafkaBusConfig {
    /// Bootstrap brokers (`host:port`).
    pub brokers: Vec<String>,
    /// Consumer group id.
    pub group_id: String,
    /// Start a new consumer group at the earliest offset instead of the latest.
    pub from_beginning: bool,
    /// Delivery timeout for published records.
    pub message_timeout: Duration,
}

impl KafkaBusConfig {
    /// Build from bus settings.
    #[must_use]
    pub fn from_settings(settings: &BusSettings) -> Self {
        Self {
            brokers: settings.brokers.clone(),
            group_id: settings.group_id.clone(),
            from_beginning: settings.from_beginning,
            message_timeout: DEFAULT_MESSAGE_TIMEOUT,
        }
    }

    /// Override the delivery timeout.
    #[must_use]
    pub const fn with_message_timeout(mut self, timeout: Duration) -> Self {
        self.message_timeout = timeout;
        self
    }

    fn bootstrap_servers(&self) -> Result<String, KafkaBusError> {
        if self.brokers.is_empty() {
            return Err(KafkaBusError::NoBrokers);
        }
        Ok(self.brokers.join(","))
    }

    fn producer_config(&self) -> Result<ClientConfig, KafkaBusError> {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", self.bootstrap_servers()?)
            .set(
                "message.timeout.ms",
                self.message_timeout.as_millis().to_string(),
            );
        Ok(config)
    }

    fn consumer_config(&self) -> Result<ClientConfig, KafkaBusError> {
        let offset_reset = if self.from_beginning {
            "earliest"
        } else {
            "latest"
        };

        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", self.bootstrap_servers()?)
            .set("group.id", &self.group_id)
            .set("enable.auto.commit", "true")
            .set("auto.offset.reset", offset_reset);
        Ok(config)
    }
}

// =============================================================================
// Publisher
// =============================================================================

/// Publishes keyed records to Kafka topics.
pub struct KafkaBusPublisher {
    producer: FutureProducer,
    queue_timeout: Duration,
}

impl KafkaBusPublisher {
    /// Create a producer for `config.brokers`.
    ///
    /// # Errors
    ///
    /// Returns `KafkaBusError` if no brokers are configured or the client
    /// cannot be created.
    pub fn new(config: &KafkaBusConfig) -> Result<Self, KafkaBusError> {
        let producer: FutureProducer = config.producer_config()?.create()?;
        tracing::info!(brokers = ?config.brokers, "Kafka producer created");

        Ok(Self {
            producer,
            queue_timeout: config.message_timeout,
        })
    }
}

#[async_trait]
impl BusPublisher for KafkaBusPublisher {
    async fn publish(&self, topic: &str, message: &BusMessage) -> Result<(), PublishError> {
        let record = FutureRecord::to(topic)
            .key(message.key.as_str())
            .payload(message.value.as_str());

        match self
            .producer
            .send(record, Timeout::After(self.queue_timeout))
            .await
        {
            Ok(_) => {
                tracing::trace!(topic, key = %message.key, "Record delivered");
                Ok(())
            }
            Err((e, _)) => Err(PublishError::Transport {
                message: e.to_string(),
            }),
        }
    }
}

// =============================================================================
// Subscriber
// =============================================================================

/// Consumes one Kafka topic as `key:value` lines.
pub struct KafkaBusSubscriber {
    consumer: StreamConsumer,
    topic: String,
}

impl KafkaBusSubscriber {
    /// Join `config.group_id` and subscribe to `topic`.
    ///
    /// # Errors
    ///
    /// Returns `KafkaBusError` if no brokers are configured or the client
    /// cannot be created or subscribed.
    pub fn new(config: &KafkaBusConfig, topic: &str) -> Result<Self, KafkaBusError> {
        let consumer: StreamConsumer = config.consumer_config()?.create()?;
        consumer.subscribe(&[topic])?;
        tracing::info!(
            brokers = ?config.brokers,
            group_id = %config.group_id,
            topic,
            from_beginning = config.from_beginning,
            "Kafka consumer subscribed"
        );

        Ok(Self {
            consumer,
            topic: topic.to_string(),
        })
    }
}

#[async_trait]
impl BusSubscriber for KafkaBusSubscriber {
    async fn next_line(&mut self) -> Result<Option<String>, BusError> {
        loop {
            match self.consumer.recv().await {
                Ok(record) => {
                    let Some(payload) = record.payload() else {
                        tracing::debug!(topic = %self.topic, "Skipping record without payload");
                        continue;
                    };
                    let value = String::from_utf8_lossy(payload);
                    let line = match record.key() {
                        Some(key) => {
                            BusMessage::new(String::from_utf8_lossy(key), value).to_line()
                        }
                        None => value.into_owned(),
                    };
                    return Ok(Some(line));
                }
                // Broker-side hiccups are retried by the client.
                Err(KafkaError::MessageConsumption(code)) => {
                    tracing::warn!(topic = %self.topic, error = %code, "Kafka consumption error");
                }
                Err(e) => {
                    return Err(BusError::Read {
                        message: e.to_string(),
                    });
                }
            }
        }
    }
}

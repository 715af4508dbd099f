//! Relay Publisher
//!
//! Encodes quote records and hands them to the bus under the deployment's
//! partition key. There is no local retry: quotes are sampled continuously and
//! a missed tick is acceptable.

use std::sync::Arc;

use crate::application::ports::{BusMessage, BusPublisher, PublishError};
use crate::domain::quote::QuoteRecord;
use crate::infrastructure::metrics;

/// Publishes quote records to a bus topic.
pub struct RelayPublisher {
    publisher: Arc<dyn BusPublisher>,
    topic: String,
    key: String,
}

impl RelayPublisher {
    /// Create a publisher for `topic` using partition `key`.
    #[must_use]
    pub fn new(
        publisher: Arc<dyn BusPublisher>,
        topic: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            publisher,
            topic: topic.into(),
            key: key.into(),
        }
    }

    /// Bus topic.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Partition key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Publish one record as `{"price":…,"timestamp":"…"}`.
    ///
    /// # Errors
    ///
    /// Returns `PublishError` if encoding fails or the bus rejects the
    /// message. Callers log and move on to the next tick.
    pub async fn publish(&self, record: &QuoteRecord) -> Result<(), PublishError> {
        let value =
            serde_json::to_string(&record.payload()).map_err(|e| PublishError::Serialization {
                message: e.to_string(),
            })?;
        let message = BusMessage::new(self.key.as_str(), value);

        match self.publisher.publish(&self.topic, &message).await {
            Ok(()) => {
                metrics::record_quote_published();
                tracing::info!(
                    topic = %self.topic,
                    key = %self.key,
                    symbol = record.symbol(),
                    price = %record.price(),
                    timestamp = %record.timestamp(),
                    "Quote published"
                );
                Ok(())
            }
            Err(e) => {
                metrics::record_publish_failed();
                Err(e)
            }
        }
    }
}

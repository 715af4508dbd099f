//! In-Memory Bus
//!
//! A topic-filtered bus on a tokio broadcast channel, for wiring both halves
//! of the relay into one process and for tests.
//!
//! Every subscription sees every message published to its topic after it
//! subscribed. A subscriber that falls more than `capacity` messages behind
//! loses the oldest ones and keeps reading.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::application::ports::{BusError, BusMessage, BusPublisher, BusSubscriber, PublishError};

/// Default channel capacity.
pub const DEFAULT_CAPACITY: usize = 1_024;

#[derive(Debug, Clone)]
struct TopicMessage {
    topic: Arc<str>,
    message: BusMessage,
}

/// Broadcast-backed bus.
#[derive(Debug, Clone)]
pub struct InMemoryBus {
    tx: broadcast::Sender<TopicMessage>,
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl InMemoryBus {
    /// Create a bus retaining up to `capacity` unread messages per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            tx: broadcast::channel(capacity).0,
        }
    }

    /// Subscribe to `topic`.
    #[must_use]
    pub fn subscribe(&self, topic: impl Into<String>) -> InMemorySubscription {
        InMemorySubscription {
            topic: topic.into(),
            rx: self.tx.subscribe(),
        }
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[async_trait]
impl BusPublisher for InMemoryBus {
    async fn publish(&self, topic: &str, message: &BusMessage) -> Result<(), PublishError> {
        let sent = self.tx.send(TopicMessage {
            topic: Arc::from(topic),
            message: message.clone(),
        });

        if sent.is_err() {
            tracing::debug!(topic, "No subscribers; message dropped");
        }
        Ok(())
    }
}

/// One topic subscription. Yields messages as `key:value` lines.
pub struct InMemorySubscription {
    topic: String,
    rx: broadcast::Receiver<TopicMessage>,
}

#[async_trait]
impl BusSubscriber for InMemorySubscription {
    async fn next_line(&mut self) -> Result<Option<String>, BusError> {
        loop {
            match self.rx.recv().await {
                Ok(msg) if *msg.topic == *self.topic => return Ok(Some(msg.message.to_line())),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(topic = %self.topic, skipped, "Subscription lagged; messages lost");
                }
                Err(broadcast::error::RecvError::Closed) => return Ok(None),
            }
        }
    }
}

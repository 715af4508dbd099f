//! Message Bus Ports
//!
//! The bus is a keyed publish/subscribe topic. Messages travel as
//! `<key>:<json-object>` lines; the key routes and orders messages from one
//! producer and carries no identity.

use async_trait::async_trait;

/// Separator between key and value on the wire.
pub const KEY_SEPARATOR: char = ':';

/// A keyed bus message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    /// Partition key.
    pub key: String,
    /// Raw JSON text of the record.
    pub value: String,
}

impl BusMessage {
    /// Create a message.
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Render as a `key:value` line (without trailing newline).
    #[must_use]
    pub fn to_line(&self) -> String {
        format!("{}{KEY_SEPARATOR}{}", self.key, self.value)
    }

    /// Split a `key:value` line at the first separator.
    #[must_use]
    pub fn from_line(line: &str) -> Option<Self> {
        line.split_once(KEY_SEPARATOR)
            .map(|(key, value)| Self::new(key, value))
    }
}

/// Publishing error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PublishError {
    /// The bus transport rejected or failed the write.
    #[error("bus transport error: {message}")]
    Transport {
        /// Transport error details.
        message: String,
    },

    /// The record could not be encoded.
    #[error("record serialization error: {message}")]
    Serialization {
        /// Serializer error details.
        message: String,
    },

    /// The bus has no remaining subscribers or was shut down.
    #[error("bus closed")]
    Closed,
}

/// Subscription read error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BusError {
    /// Reading from the subscription failed.
    #[error("bus read error: {message}")]
    Read {
        /// Read error details.
        message: String,
    },
}

/// Port for keyed publishing to a bus topic.
#[async_trait]
pub trait BusPublisher: Send + Sync {
    /// Publish one message to `topic`.
    async fn publish(&self, topic: &str, message: &BusMessage) -> Result<(), PublishError>;
}

/// Port for reading a bus subscription line by line.
#[async_trait]
pub trait BusSubscriber: Send {
    /// Wait for the next line. `Ok(None)` means the stream ended.
    async fn next_line(&mut self) -> Result<Option<String>, BusError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_key_value_line() {
        let msg = BusMessage::new("A", r#"{"price":1}"#);
        assert_eq!(msg.to_line(), r#"A:{"price":1}"#);
    }

    #[test]
    fn parses_at_first_separator() {
        let msg = BusMessage::from_line("B:{price: 2, timestamp: 2025-04-08 17:37:53}").unwrap();
        assert_eq!(msg.key, "B");
        assert_eq!(msg.value, "{price: 2, timestamp: 2025-04-08 17:37:53}");
    }

    #[test]
    fn line_without_separator_has_no_key() {
        assert!(BusMessage::from_line("garbage").is_none());
    }
}

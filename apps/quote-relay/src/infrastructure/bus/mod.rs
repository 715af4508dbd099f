//! Message Bus Adapters
//!
//! Implementations of the bus ports.
//!
//! # Architecture
//!
//! - `kafka`: native Kafka producer and consumer (default transport)
//! - [`line`]: `key:value` lines over async byte streams (stdout/stdin pipes);
//!   the topic is not carried, so external tooling picks it
//! - [`memory`]: topic-filtered broadcast channel for single-process wiring

#[cfg(feature = "kafka")]
pub mod kafka;
pub mod line;
pub mod memory;

#[cfg(feature = "kafka")]
pub use kafka::{KafkaBusConfig, KafkaBusError, KafkaBusPublisher, KafkaBusSubscriber};
pub use line::{LineBusPublisher, LineBusSubscriber};
pub use memory::{InMemoryBus, InMemorySubscription};

//! Configuration Module
//!
//! Environment-driven configuration shared by the producer and consumer.

mod settings;

pub use settings::{
    BusSettings, BusTransport, ConfigError, FeedSettings, PartitionKey, RelayConfig, ServerSettings,
    TimeSeriesSettings,
};

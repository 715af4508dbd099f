//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `RelayPublisher`: Publishes quote records to the bus under a fixed key
//! - `RelayConsumer`: Repairs bus lines and forwards them to the time-series store

mod relay_consumer;
mod relay_publisher;

pub use relay_consumer::{ConsumerStats, RelayConsumer, RelayError};
pub use relay_publisher::RelayPublisher;

//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - `BusPublisher`: Keyed publish to the message bus
//! - `TimeSeriesWriter`: Single-record writes to the time-series store
//!
//! ## Driver Ports (Inbound)
//!
//! - `BusSubscriber`: Line-by-line reads from a bus subscription

mod bus_port;
mod timeseries_port;

pub use bus_port::{BusError, BusMessage, BusPublisher, BusSubscriber, PublishError};
pub use timeseries_port::{TimeSeriesWriter, WriteError};

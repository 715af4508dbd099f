//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the relay services and the port interfaces that
//! define how the pipeline reaches the message bus and the time-series store.

/// Port interfaces for external systems (message bus, time-series store).
pub mod ports;

/// Relay publisher and relay consumer services.
pub mod services;

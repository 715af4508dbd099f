//! Domain Layer - Core quote types and payload transformations.
//!
//! This layer contains the pure data types and transformations of the
//! relay pipeline. Nothing here performs I/O.

/// Quote records and last-price extraction.
pub mod quote;

/// Repair of loosely formatted bus payloads into valid JSON.
pub mod repair;

/// Time-series points written by the relay consumer.
pub mod timeseries;

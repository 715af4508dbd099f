//! Time-Series Writer Adapters
//!
//! Implementations of the [`TimeSeriesWriter`](crate::application::ports::TimeSeriesWriter) port.
//!
//! # Architecture
//!
//! - [`http`]: `WriteRecords` over HTTP with exponential backoff
//! - [`logging`]: dry-run and in-memory writers

pub mod http;
pub mod logging;

pub use http::{HttpTimeSeriesWriter, HttpWriterConfig};
pub use logging::{InMemoryTimeSeriesWriter, LoggingTimeSeriesWriter};

//! Time-Series Writer Port (Driven Port)
//!
//! Interface for the time-series store. Writers own their retry policy; the
//! relay performs exactly one `write_record` call per consumed message.

use async_trait::async_trait;

use crate::domain::timeseries::TimeSeriesPoint;

/// Time-series write error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum WriteError {
    /// The store rejected the record.
    #[error("record rejected ({status}): {message}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Rejection reason.
        message: String,
    },

    /// Network or transport failure.
    #[error("time-series transport error: {0}")]
    Transport(String),

    /// Retries were exhausted.
    #[error("maximum write attempts ({attempts}) exceeded")]
    MaxRetriesExceeded {
        /// Attempts made.
        attempts: u32,
    },
}

/// Port for writing points to the time-series store.
#[async_trait]
pub trait TimeSeriesWriter: Send + Sync {
    /// Write a single point.
    async fn write_record(&self, point: &TimeSeriesPoint) -> Result<(), WriteError>;
}

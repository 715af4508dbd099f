//! Logging and In-Memory Writers
//!
//! Writers that never leave the process: a dry-run writer for deployments
//! without a store endpoint, and a recording writer for wiring tests.

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::application::ports::{TimeSeriesWriter, WriteError};
use crate::domain::timeseries::TimeSeriesPoint;

/// Logs each point instead of writing it.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingTimeSeriesWriter;

#[async_trait]
impl TimeSeriesWriter for LoggingTimeSeriesWriter {
    async fn write_record(&self, point: &TimeSeriesPoint) -> Result<(), WriteError> {
        tracing::info!(
            measure = %point.measure_name,
            dimensions = ?point.dimensions,
            value = %point.value,
            time = %point.time_millis,
            "Time-series point (dry run)"
        );
        Ok(())
    }
}

/// Keeps every written point in memory.
#[derive(Debug, Default)]
pub struct InMemoryTimeSeriesWriter {
    points: Mutex<Vec<TimeSeriesPoint>>,
}

impl InMemoryTimeSeriesWriter {
    /// Create an empty writer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Points written so far.
    #[must_use]
    pub fn points(&self) -> Vec<TimeSeriesPoint> {
        self.points.lock().clone()
    }
}

#[async_trait]
impl TimeSeriesWriter for InMemoryTimeSeriesWriter {
    async fn write_record(&self, point: &TimeSeriesPoint) -> Result<(), WriteError> {
        self.points.lock().push(point.clone());
        Ok(())
    }
}

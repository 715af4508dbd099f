//! Relay Consumer
//!
//! Reads `key:value` lines from a bus subscription, repairs each payload into
//! valid JSON, normalizes its timestamp to epoch milliseconds and writes one
//! time-series point per line.
//!
//! Every per-line failure is logged together with the raw line and the loop
//! moves on; a single bad record never stops ingestion.

use std::sync::Arc;

use chrono::{Local, NaiveDateTime, TimeZone, Utc};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::application::ports::{BusError, BusSubscriber, TimeSeriesWriter, WriteError};
use crate::domain::quote::TIMESTAMP_FORMAT;
use crate::domain::repair::{RepairError, repair};
use crate::domain::timeseries::{Dimensions, TimeSeriesPoint};
use crate::infrastructure::health::PipelineStatus;
use crate::infrastructure::metrics;

/// Field holding the price in a repaired record.
const PRICE_FIELD: &str = "price";

/// Field holding the capture time in a repaired record.
const TIMESTAMP_FIELD: &str = "timestamp";

/// Per-line relay failures.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// No `{ … }` candidate in the line.
    #[error("no JSON object found in line")]
    NoObject,

    /// The candidate could not be repaired.
    #[error("payload repair failed: {0}")]
    Repair(#[from] RepairError),

    /// The repaired text is still not valid JSON.
    #[error("repaired payload is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// The payload is valid JSON but not an object.
    #[error("payload is not a JSON object")]
    NotAnObject,

    /// The record has no price.
    #[error("record has no price")]
    MissingPrice,

    /// The price is present but not numeric (e.g. `"unavailable"`).
    #[error("record price {0} is not usable")]
    UnusablePrice(String),

    /// The timestamp does not match `YYYY-MM-DD HH:MM:SS` local time.
    #[error("invalid timestamp {value:?}: {reason}")]
    InvalidTimestamp {
        /// Offending value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The time-series writer failed.
    #[error(transparent)]
    Write(#[from] WriteError),
}

/// Counters returned when the consumer loop ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    /// Non-empty lines read from the bus.
    pub lines: u64,
    /// Points written successfully.
    pub written: u64,
    /// Lines that failed anywhere in the pipeline.
    pub failed: u64,
}

/// Bus-to-time-series relay.
pub struct RelayConsumer {
    writer: Arc<dyn TimeSeriesWriter>,
    measure_name: String,
    dimensions: Dimensions,
    status: Option<Arc<PipelineStatus>>,
}

impl RelayConsumer {
    /// Create a consumer writing `measure_name` points with fixed dimensions.
    #[must_use]
    pub fn new(
        writer: Arc<dyn TimeSeriesWriter>,
        measure_name: impl Into<String>,
        dimensions: Dimensions,
    ) -> Self {
        Self {
            writer,
            measure_name: measure_name.into(),
            dimensions,
            status: None,
        }
    }

    /// Report progress to a shared pipeline status.
    #[must_use]
    pub fn with_status(mut self, status: Arc<PipelineStatus>) -> Self {
        self.status = Some(status);
        self
    }

    /// Consume lines until the subscription ends or `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns `BusError` if reading from the subscription fails; the loop
    /// cannot make progress past a broken subscription.
    pub async fn run(
        &self,
        subscriber: &mut dyn BusSubscriber,
        cancel: CancellationToken,
    ) -> Result<ConsumerStats, BusError> {
        let mut stats = ConsumerStats::default();
        self.report(|status| status.set_consuming(true));

        let result = self.consume(subscriber, &cancel, &mut stats).await;

        self.report(|status| status.set_consuming(false));
        tracing::info!(
            lines = stats.lines,
            written = stats.written,
            failed = stats.failed,
            "Relay consumer stopped"
        );
        result.map(|()| stats)
    }

    async fn consume(
        &self,
        subscriber: &mut dyn BusSubscriber,
        cancel: &CancellationToken,
        stats: &mut ConsumerStats,
    ) -> Result<(), BusError> {
        loop {
            let next = tokio::select! {
                () = cancel.cancelled() => {
                    tracing::info!("Relay consumer cancelled");
                    break;
                }
                next = subscriber.next_line() => next?,
            };

            let Some(raw) = next else {
                tracing::info!("Bus subscription ended");
                break;
            };

            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            stats.lines += 1;

            match self.relay_line(line).await {
                Ok(point) => {
                    stats.written += 1;
                    metrics::record_point_written();
                    self.report(|status| status.record_line(true));
                    tracing::info!(
                        measure = %point.measure_name,
                        value = %point.value,
                        time_millis = %point.time_millis,
                        "Record written to time-series store"
                    );
                }
                Err(e) => {
                    stats.failed += 1;
                    metrics::record_line_failed(e.kind());
                    self.report(|status| status.record_line(false));
                    tracing::error!(error = %e, line, "Failed to relay bus message");
                }
            }
        }

        Ok(())
    }

    fn report(&self, update: impl FnOnce(&PipelineStatus)) {
        if let Some(status) = &self.status {
            update(status);
        }
    }

    async fn relay_line(&self, line: &str) -> Result<TimeSeriesPoint, RelayError> {
        let point = self.process_line(line)?;
        self.writer.write_record(&point).await?;
        Ok(point)
    }

    /// Turn one bus line into a point, using the current time when the record
    /// carries no timestamp.
    ///
    /// # Errors
    ///
    /// Returns `RelayError` describing the first stage that failed.
    pub fn process_line(&self, line: &str) -> Result<TimeSeriesPoint, RelayError> {
        self.process_line_at(line, Utc::now().timestamp_millis())
    }

    /// Turn one bus line into a point with an explicit fallback time.
    ///
    /// # Errors
    ///
    /// Returns `RelayError` describing the first stage that failed.
    pub fn process_line_at(
        &self,
        line: &str,
        fallback_millis: i64,
    ) -> Result<TimeSeriesPoint, RelayError> {
        let candidate = object_candidate(line).ok_or(RelayError::NoObject)?;
        let repaired = repair(candidate)?;
        let record: Map<String, Value> = match serde_json::from_str::<Value>(&repaired)? {
            Value::Object(map) => map,
            _ => return Err(RelayError::NotAnObject),
        };

        let value = match record.get(PRICE_FIELD) {
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::String(s)) => return Err(RelayError::UnusablePrice(s.clone())),
            Some(other) => return Err(RelayError::UnusablePrice(other.to_string())),
            None => return Err(RelayError::MissingPrice),
        };

        let time_millis = match record.get(TIMESTAMP_FIELD) {
            Some(timestamp) => epoch_millis(timestamp)?,
            None => fallback_millis,
        };

        Ok(TimeSeriesPoint::new(
            self.measure_name.as_str(),
            self.dimensions.clone(),
            value,
            time_millis,
        ))
    }
}

impl RelayError {
    /// Short label for metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NoObject => "no_object",
            Self::Repair(_) => "repair",
            Self::InvalidJson(_) | Self::NotAnObject => "parse",
            Self::MissingPrice | Self::UnusablePrice(_) => "price",
            Self::InvalidTimestamp { .. } => "timestamp",
            Self::Write(_) => "write",
        }
    }
}

/// Text from the first `{` through the last `}`.
fn object_candidate(line: &str) -> Option<&str> {
    let start = line.find('{')?;
    let end = line.rfind('}')?;
    (start < end).then(|| &line[start..=end])
}

/// Parse a local `YYYY-MM-DD HH:MM:SS` timestamp into epoch milliseconds.
fn epoch_millis(timestamp: &Value) -> Result<i64, RelayError> {
    let Some(text) = timestamp.as_str() else {
        return Err(RelayError::InvalidTimestamp {
            value: timestamp.to_string(),
            reason: "not a string".to_string(),
        });
    };

    let naive = NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT).map_err(|e| {
        RelayError::InvalidTimestamp {
            value: text.to_string(),
            reason: e.to_string(),
        }
    })?;

    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.timestamp_millis())
        .ok_or_else(|| RelayError::InvalidTimestamp {
            value: text.to_string(),
            reason: "does not exist in the local time zone".to_string(),
        })
}

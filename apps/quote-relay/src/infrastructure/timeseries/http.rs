//! HTTP Time-Series Writer
//!
//! Posts one `WriteRecords` request per point to an HTTP endpoint:
//!
//! ```json
//! {
//!   "DatabaseName": "CryptoIcaiDatabase",
//!   "TableName": "CryptoMonedas",
//!   "Records": [{
//!     "MeasureName": "ADA",
//!     "Dimensions": [{"Name": "ICAI", "Value": "Crypto"}],
//!     "MeasureValue": "0.6123",
//!     "Time": "1744126673000"
//!   }],
//!   "CommonAttributes": {}
//! }
//! ```
//!
//! Transport errors, 408, 429 and 5xx responses are retried with exponential
//! backoff up to the configured attempt count. Other statuses are rejections.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;

use crate::application::ports::{TimeSeriesWriter, WriteError};
use crate::domain::timeseries::TimeSeriesPoint;
use crate::infrastructure::metrics;
use crate::infrastructure::retry::{RetryConfig, RetryPolicy};

/// Configuration for the HTTP writer.
#[derive(Debug, Clone)]
pub struct HttpWriterConfig {
    /// Write endpoint URL.
    pub endpoint: String,
    /// Target database.
    pub database: String,
    /// Target table.
    pub table: String,
    /// Total attempts per point, including the first.
    pub max_attempts: u32,
    /// Backoff between attempts.
    pub backoff: RetryConfig,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl HttpWriterConfig {
    /// Configuration with the default backoff (100ms doubling to 5s).
    #[must_use]
    pub fn new(
        endpoint: impl Into<String>,
        database: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            database: database.into(),
            table: table.into(),
            max_attempts: 10,
            backoff: RetryConfig::exponential(
                Duration::from_millis(100),
                Duration::from_secs(5),
                2.0,
            ),
            timeout: Duration::from_secs(10),
        }
    }

    /// Override the attempt count.
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Override the backoff schedule.
    #[must_use]
    pub const fn with_backoff(mut self, backoff: RetryConfig) -> Self {
        self.backoff = backoff;
        self
    }
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct WriteRecordsRequest<'a> {
    database_name: &'a str,
    table_name: &'a str,
    records: [RecordBody<'a>; 1],
    common_attributes: serde_json::Map<String, serde_json::Value>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct RecordBody<'a> {
    measure_name: &'a str,
    dimensions: Vec<DimensionBody<'a>>,
    measure_value: &'a str,
    time: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct DimensionBody<'a> {
    name: &'a str,
    value: &'a str,
}

impl<'a> WriteRecordsRequest<'a> {
    fn new(config: &'a HttpWriterConfig, point: &'a TimeSeriesPoint) -> Self {
        Self {
            database_name: &config.database,
            table_name: &config.table,
            records: [RecordBody {
                measure_name: &point.measure_name,
                dimensions: point
                    .dimensions
                    .iter()
                    .map(|(name, value)| DimensionBody { name, value })
                    .collect(),
                measure_value: &point.value,
                time: &point.time_millis,
            }],
            common_attributes: serde_json::Map::new(),
        }
    }
}

/// Error category for determining retry behavior.
enum ErrorCategory {
    RateLimited,
    Retryable,
    NonRetryable,
}

/// Categorize HTTP status code for retry handling.
const fn categorize_status(status: StatusCode) -> ErrorCategory {
    match status.as_u16() {
        429 => ErrorCategory::RateLimited,
        408 | 500..=599 => ErrorCategory::Retryable,
        _ => ErrorCategory::NonRetryable,
    }
}

/// Time-series writer over HTTP with retry logic.
#[derive(Debug, Clone)]
pub struct HttpTimeSeriesWriter {
    client: Client,
    config: HttpWriterConfig,
}

impl HttpTimeSeriesWriter {
    /// Create a new writer.
    ///
    /// # Errors
    ///
    /// Returns `WriteError::Transport` if the HTTP client cannot be built.
    pub fn new(config: HttpWriterConfig) -> Result<Self, WriteError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| WriteError::Transport(e.to_string()))?;

        Ok(Self { client, config })
    }

    /// Endpoint URL.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }
}

#[async_trait]
impl TimeSeriesWriter for HttpTimeSeriesWriter {
    async fn write_record(&self, point: &TimeSeriesPoint) -> Result<(), WriteError> {
        let body = WriteRecordsRequest::new(&self.config, point);
        let mut backoff = RetryPolicy::new(
            self.config
                .backoff
                .clone()
                .with_max_attempts(self.config.max_attempts.saturating_sub(1).max(1)),
        );
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let can_retry = attempt < max_attempts;

            let response = match self
                .client
                .post(&self.config.endpoint)
                .json(&body)
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    if let Some(delay) = can_retry.then(|| backoff.next_delay()).flatten() {
                        tracing::warn!(
                            error = %e,
                            delay_ms = delay.as_millis(),
                            attempt,
                            "Network error, retrying write"
                        );
                        metrics::record_write_retry();
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    tracing::error!(error = %e, attempt, "Network error, giving up");
                    return Err(WriteError::MaxRetriesExceeded { attempts: attempt });
                }
            };

            let status = response.status();
            if status.is_success() {
                tracing::debug!(
                    status = status.as_u16(),
                    measure = %point.measure_name,
                    time = %point.time_millis,
                    "WriteRecords succeeded"
                );
                return Ok(());
            }

            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            let message = response.text().await.unwrap_or_default();

            let delay = match categorize_status(status) {
                ErrorCategory::RateLimited => {
                    let delay = backoff.next_delay();
                    retry_after.map(Duration::from_secs).or(delay)
                }
                ErrorCategory::Retryable => backoff.next_delay(),
                ErrorCategory::NonRetryable => {
                    return Err(WriteError::Rejected {
                        status: status.as_u16(),
                        message,
                    });
                }
            };

            match delay.filter(|_| can_retry) {
                Some(delay) => {
                    tracing::warn!(
                        status = status.as_u16(),
                        message = %message,
                        delay_ms = delay.as_millis(),
                        attempt,
                        "Retryable write error, retrying"
                    );
                    metrics::record_write_retry();
                    tokio::time::sleep(delay).await;
                }
                None => return Err(WriteError::MaxRetriesExceeded { attempts: attempt }),
            }
        }
    }
}

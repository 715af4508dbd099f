//! Prometheus Metrics Module
//!
//! Exposes pipeline metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Feed**: frames received by kind, heartbeats echoed, frame errors,
//!   dropped events, reconnects, connection state
//! - **Publisher**: quotes published and failed
//! - **Consumer**: points written, lines failed by stage, writer retries
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port.

use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Subsequent calls return the already-installed handle.
///
/// # Errors
///
/// Returns `BuildError` if the global recorder cannot be installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();

    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    // Feed
    describe_counter!(
        "quote_relay_frames_received_total",
        "Total frames received from the quote feed by kind"
    );
    describe_counter!(
        "quote_relay_heartbeats_echoed_total",
        "Total heartbeats echoed back to the quote feed"
    );
    describe_counter!(
        "quote_relay_frame_errors_total",
        "Total undecodable frames by error kind"
    );
    describe_counter!(
        "quote_relay_reconnects_total",
        "Total quote feed reconnection attempts"
    );
    describe_counter!(
        "quote_relay_feed_events_dropped_total",
        "Total feed events dropped because the event channel was full"
    );
    describe_gauge!(
        "quote_relay_feed_connected",
        "Whether the quote session is streaming (1) or not (0)"
    );

    // Publisher
    describe_counter!(
        "quote_relay_quotes_published_total",
        "Total quote records published to the bus"
    );
    describe_counter!(
        "quote_relay_publish_failures_total",
        "Total quote records the bus rejected"
    );

    // Consumer
    describe_counter!(
        "quote_relay_points_written_total",
        "Total points written to the time-series store"
    );
    describe_counter!(
        "quote_relay_lines_failed_total",
        "Total bus lines skipped by failure stage"
    );
    describe_counter!(
        "quote_relay_write_retries_total",
        "Total time-series write retries"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record a frame received from the feed (`heartbeat` or `data`).
pub fn record_frame_received(kind: &'static str) {
    counter!("quote_relay_frames_received_total", "kind" => kind).increment(1);
}

/// Record a heartbeat echoed to the feed.
pub fn record_heartbeat_echoed() {
    counter!("quote_relay_heartbeats_echoed_total").increment(1);
}

/// Record a frame dropped by the codec.
pub fn record_frame_error(kind: &'static str) {
    counter!("quote_relay_frame_errors_total", "error_type" => kind).increment(1);
}

/// Record a feed reconnection attempt.
pub fn record_reconnect() {
    counter!("quote_relay_reconnects_total").increment(1);
}

/// Record a feed event dropped on a full channel.
pub fn record_event_dropped(kind: &'static str) {
    counter!("quote_relay_feed_events_dropped_total", "kind" => kind).increment(1);
}

/// Update the feed connection gauge.
pub fn set_feed_connected(connected: bool) {
    gauge!("quote_relay_feed_connected").set(if connected { 1.0 } else { 0.0 });
}

/// Record a quote published to the bus.
pub fn record_quote_published() {
    counter!("quote_relay_quotes_published_total").increment(1);
}

/// Record a quote the bus rejected.
pub fn record_publish_failed() {
    counter!("quote_relay_publish_failures_total").increment(1);
}

/// Record a point written to the time-series store.
pub fn record_point_written() {
    counter!("quote_relay_points_written_total").increment(1);
}

/// Record a bus line skipped at `stage`.
pub fn record_line_failed(stage: &'static str) {
    counter!("quote_relay_lines_failed_total", "stage" => stage).increment(1);
}

/// Record a time-series write retry.
pub fn record_write_retry() {
    counter!("quote_relay_write_retries_total").increment(1);
}

// =============================================================================
// Tests
// =============================================================================

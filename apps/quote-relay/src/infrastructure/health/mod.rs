//! Health Check and Metrics Endpoint
//!
//! HTTP endpoint for health checks, pipeline status reporting, and Prometheus metrics.
//! Used by container orchestrators and monitoring systems.
//!
//! # Endpoints
//!
//! - `GET /health` - Returns JSON health status
//! - `GET /healthz` - Kubernetes liveness check (simple OK)
//! - `GET /readyz` - Kubernetes readiness check (feed streaming / consumer reading)
//! - `GET /metrics` - Prometheus metrics in text format

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::infrastructure::feed::SessionState;
use crate::infrastructure::metrics::get_metrics_handle;

// =============================================================================
// Pipeline Status
// =============================================================================

/// Which half of the relay this process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineRole {
    /// Feed client and bus publisher.
    Producer,
    /// Bus reader and time-series writer.
    Consumer,
}

/// Live pipeline state shared between the event loop and the health server.
#[derive(Debug)]
pub struct PipelineStatus {
    feed_state: RwLock<SessionState>,
    last_connected_at: RwLock<Option<DateTime<Utc>>>,
    reconnect_attempts: AtomicU64,
    quotes_published: AtomicU64,
    publish_failures: AtomicU64,
    consuming: AtomicBool,
    lines_consumed: AtomicU64,
    points_written: AtomicU64,
    lines_failed: AtomicU64,
}

impl Default for PipelineStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineStatus {
    /// Fresh status with the feed disconnected.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            feed_state: RwLock::new(SessionState::Disconnected),
            last_connected_at: RwLock::new(None),
            reconnect_attempts: AtomicU64::new(0),
            quotes_published: AtomicU64::new(0),
            publish_failures: AtomicU64::new(0),
            consuming: AtomicBool::new(false),
            lines_consumed: AtomicU64::new(0),
            points_written: AtomicU64::new(0),
            lines_failed: AtomicU64::new(0),
        }
    }

    /// Set the feed session state.
    pub fn set_feed_state(&self, state: SessionState) {
        *self.feed_state.write() = state;
        if state == SessionState::Streaming {
            *self.last_connected_at.write() = Some(Utc::now());
            self.reconnect_attempts.store(0, Ordering::Relaxed);
        }
    }

    /// Record the current reconnect attempt number.
    pub fn set_reconnect_attempt(&self, attempt: u32) {
        self.reconnect_attempts
            .store(u64::from(attempt), Ordering::Relaxed);
    }

    /// Count a published quote.
    pub fn increment_published(&self) {
        self.quotes_published.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a failed publish.
    pub fn increment_publish_failures(&self) {
        self.publish_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Mark whether the consumer loop is reading.
    pub fn set_consuming(&self, consuming: bool) {
        self.consuming.store(consuming, Ordering::Relaxed);
    }

    /// Count a consumed line and its outcome.
    pub fn record_line(&self, written: bool) {
        self.lines_consumed.fetch_add(1, Ordering::Relaxed);
        if written {
            self.points_written.fetch_add(1, Ordering::Relaxed);
        } else {
            self.lines_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Current feed session state.
    #[must_use]
    pub fn feed_state(&self) -> SessionState {
        *self.feed_state.read()
    }

    /// Whether the consumer loop is reading.
    #[must_use]
    pub fn is_consuming(&self) -> bool {
        self.consuming.load(Ordering::Relaxed)
    }

    /// Snapshot of the pipeline counters.
    #[must_use]
    pub fn counters(&self) -> PipelineCounters {
        PipelineCounters {
            quotes_published: self.quotes_published.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
            lines_consumed: self.lines_consumed.load(Ordering::Relaxed),
            points_written: self.points_written.load(Ordering::Relaxed),
            lines_failed: self.lines_failed.load(Ordering::Relaxed),
        }
    }
}

// =============================================================================
// Health Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status: "healthy", "degraded", or "unhealthy".
    pub status: HealthStatus,
    /// Process role.
    pub role: PipelineRole,
    /// Relay version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Feed session status (producer only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feed: Option<FeedInfo>,
    /// Pipeline counters.
    pub counters: PipelineCounters,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// All systems operational.
    Healthy,
    /// Recovering (e.g. reconnecting to the feed).
    Degraded,
    /// Not processing.
    Unhealthy,
}

/// Feed session status.
#[derive(Debug, Clone, Serialize)]
pub struct FeedInfo {
    /// Session state.
    pub state: &'static str,
    /// Whether the session is streaming.
    pub connected: bool,
    /// Last time the session started streaming.
    pub last_connected_at: Option<DateTime<Utc>>,
    /// Current reconnect attempt (0 if connected).
    pub reconnect_attempts: u64,
}

/// Pipeline counters.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PipelineCounters {
    /// Quotes published to the bus.
    pub quotes_published: u64,
    /// Quotes the bus rejected.
    pub publish_failures: u64,
    /// Bus lines read.
    pub lines_consumed: u64,
    /// Points written to the store.
    pub points_written: u64,
    /// Bus lines skipped.
    pub lines_failed: u64,
}

// =============================================================================
// Health Server State
// =============================================================================

/// Shared state for the health server.
pub struct HealthServerState {
    version: String,
    role: PipelineRole,
    started_at: Instant,
    status: Arc<PipelineStatus>,
}

impl HealthServerState {
    /// Create new health server state.
    #[must_use]
    pub fn new(version: String, role: PipelineRole, status: Arc<PipelineStatus>) -> Self {
        Self {
            version,
            role,
            started_at: Instant::now(),
            status,
        }
    }
}

// =============================================================================
// Health Server
// =============================================================================

/// Health check HTTP server.
pub struct HealthServer {
    port: u16,
    state: Arc<HealthServerState>,
    cancel: CancellationToken,
}

impl HealthServer {
    /// Create a new health server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<HealthServerState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Run the health server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HealthServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), HealthServerError> {
        let app = Router::new()
            .route("/health", get(health_handler))
            .route("/healthz", get(liveness_handler))
            .route("/readyz", get(readiness_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(self.state);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HealthServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "Health server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HealthServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Health server stopped");
        Ok(())
    }
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn health_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let response = build_health_response(&state);
    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let response = build_health_response(&state);

    if response.status == HealthStatus::Healthy {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            let body = handle.render();
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                body,
            )
        },
    )
}

fn build_health_response(state: &HealthServerState) -> HealthResponse {
    let feed = match state.role {
        PipelineRole::Producer => Some(feed_info(&state.status)),
        PipelineRole::Consumer => None,
    };

    HealthResponse {
        status: determine_health_status(state.role, &state.status),
        role: state.role,
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        feed,
        counters: state.status.counters(),
    }
}

fn feed_info(status: &PipelineStatus) -> FeedInfo {
    let feed_state = status.feed_state();

    FeedInfo {
        state: feed_state.as_str(),
        connected: feed_state == SessionState::Streaming,
        last_connected_at: *status.last_connected_at.read(),
        reconnect_attempts: status.reconnect_attempts.load(Ordering::Relaxed),
    }
}

fn determine_health_status(role: PipelineRole, status: &PipelineStatus) -> HealthStatus {
    match role {
        PipelineRole::Producer => match status.feed_state() {
            SessionState::Streaming => HealthStatus::Healthy,
            SessionState::Disconnected
            | SessionState::Connecting
            | SessionState::Handshaking
            | SessionState::Failed => HealthStatus::Degraded,
            SessionState::Closed => HealthStatus::Unhealthy,
        },
        PipelineRole::Consumer => {
            if status.is_consuming() {
                HealthStatus::Healthy
            } else {
                HealthStatus::Unhealthy
            }
        }
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Health server errors.
#[derive(Debug, thiserror::Error)]
pub enum HealthServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_status_serialization() {
        assert_eq!(
            serde_json::to_string(&HealthStatus::Healthy).unwrap(),
            "\"healthy\""
        );
        assert_eq!(
            serde_json::to_string(&HealthStatus::Degraded).unwrap(),
            "\"degraded\""
        );
        assert_eq!(
            serde_json::to_string(&HealthStatus::Unhealthy).unwrap(),
            "\"unhealthy\""
        );
    }

    #[test]
    fn producer_status_follows_feed_state() {
        let status = PipelineStatus::new();
        assert_eq!(
            determine_health_status(PipelineRole::Producer, &status),
            HealthStatus::Degraded
        );

        status.set_feed_state(SessionState::Streaming);
        assert_eq!(
            determine_health_status(PipelineRole::Producer, &status),
            HealthStatus::Healthy
        );

        status.set_feed_state(SessionState::Closed);
        assert_eq!(
            determine_health_status(PipelineRole::Producer, &status),
            HealthStatus::Unhealthy
        );
    }

    #[test]
    fn consumer_status_follows_reading_flag() {
        let status = PipelineStatus::new();
        assert_eq!(
            determine_health_status(PipelineRole::Consumer, &status),
            HealthStatus::Unhealthy
        );

        status.set_consuming(true);
        assert_eq!(
            determine_health_status(PipelineRole::Consumer, &status),
            HealthStatus::Healthy
        );
    }

    #[test]
    fn streaming_resets_reconnect_attempts() {
        let status = PipelineStatus::new();
        status.set_reconnect_attempt(3);
        assert_eq!(feed_info(&status).reconnect_attempts, 3);

        status.set_feed_state(SessionState::Streaming);

        let info = feed_info(&status);
        assert_eq!(info.reconnect_attempts, 0);
        assert!(info.connected);
        assert!(info.last_connected_at.is_some());
    }

    #[test]
    fn consumer_response_omits_feed() {
        let status = Arc::new(PipelineStatus::new());
        status.record_line(true);
        status.record_line(false);
        let state = HealthServerState::new("0.1.0".to_string(), PipelineRole::Consumer, status);

        let json = serde_json::to_value(build_health_response(&state)).unwrap();

        assert!(json.get("feed").is_none());
        assert_eq!(json["role"], "consumer");
        assert_eq!(json["counters"]["lines_consumed"], 2);
        assert_eq!(json["counters"]["points_written"], 1);
        assert_eq!(json["counters"]["lines_failed"], 1);
    }
}

//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer.

/// Quote feed WebSocket client.
pub mod feed;

/// Message bus adapters (Kafka, line protocol, in-memory).
pub mod bus;

/// Time-series store writers.
pub mod timeseries;

/// Retry and reconnect delay schedules.
pub mod retry;

/// Configuration loaded from the environment.
pub mod config;

/// Health check HTTP endpoint.
pub mod health;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// OpenTelemetry tracing integration.
pub mod telemetry;

/// Process startup and shutdown helpers.
pub mod runtime;

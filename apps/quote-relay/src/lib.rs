#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Quote Relay - Streaming Price Ingestion
//!
//! Streams last-trade prices for one symbol from a WebSocket quote feed,
//! relays them through a keyed message bus, and lands them in a time-series
//! store. The two halves run as separate processes (`quote-producer` and
//! `quote-consumer`) joined only by the bus.
//!
//! # Layers (inside -> outside)
//!
//! - **Domain**: Core types with no I/O
//!   - `quote`: Quote records and price extraction
//!   - `repair`: Loose-JSON payload repair
//!   - `timeseries`: Time-series points
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Bus publisher/subscriber and time-series writer interfaces
//!   - `services`: Relay publisher and relay consumer
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `feed`: Frame codec and quote session client
//!   - `bus`: Kafka, line-protocol and in-memory bus adapters
//!   - `timeseries`: HTTP, logging and in-memory writers
//!   - `config`: Environment configuration
//!   - `health`: Health check HTTP endpoint
//!
//! # Data Flow
//!
//! ```text
//! quote feed (WS) -> FeedClient -> extract -> RelayPublisher -> bus
//!                                                               |
//! time-series store <- TimeSeriesWriter <- repair <- RelayConsumer
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core types with no external I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::quote::{ExtractionError, Price, QuoteRecord, extract, extract_at};
pub use domain::repair::{RepairError, repair};
pub use domain::timeseries::{Dimensions, TimeSeriesPoint, default_dimensions};

// Ports and services
pub use application::ports::{
    BusError, BusMessage, BusPublisher, BusSubscriber, PublishError, TimeSeriesWriter, WriteError,
};
pub use application::services::{ConsumerStats, RelayConsumer, RelayError, RelayPublisher};

// Feed client
pub use infrastructure::feed::{
    FeedClient, FeedClientConfig, FeedClientError, FeedEvent, Frame, FrameCodec, FrameError,
    SessionState,
};

// Adapters
pub use infrastructure::bus::{InMemoryBus, LineBusPublisher, LineBusSubscriber};
#[cfg(feature = "kafka")]
pub use infrastructure::bus::{KafkaBusConfig, KafkaBusError, KafkaBusPublisher, KafkaBusSubscriber};
pub use infrastructure::timeseries::{
    HttpTimeSeriesWriter, HttpWriterConfig, InMemoryTimeSeriesWriter, LoggingTimeSeriesWriter,
};
pub use infrastructure::retry::{RetryConfig, RetryPolicy};

// Infrastructure config
pub use infrastructure::config::{BusTransport, ConfigError, RelayConfig};

// Health server
pub use infrastructure::health::{
    HealthServer, HealthServerError, HealthServerState, PipelineRole, PipelineStatus,
};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};

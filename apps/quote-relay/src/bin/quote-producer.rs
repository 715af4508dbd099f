//! Quote Producer Binary
//!
//! Streams last prices for one symbol from the quote feed and publishes them
//! to the bus topic with the configured partition key.
//!
//! # Usage
//!
//! ```bash
//! RELAY_BUS_BROKERS=b-1:9092,b-2:9092 quote-producer
//!
//! # Line transport: `key:value` on stdout, topic chosen by the tool
//! RELAY_BUS_TRANSPORT=lines quote-producer | kafka-console-producer \
//!     --bootstrap-server b-1:9092 --topic imat3a_ADA \
//!     --property parse.key=true --property key.separator=:
//! ```
//!
//! # Environment Variables
//!
//! - `QUOTE_FEED_URL`: Feed endpoint (default: wss://data.tradingview.com/socket.io/websocket)
//! - `QUOTE_FEED_ORIGIN`: Origin header (default: https://data.tradingview.com)
//! - `QUOTE_SYMBOL`: Subscribed symbol (default: BINANCE:ADAUSD)
//! - `QUOTE_RECONNECT_DELAY_SECS`: Fixed reconnect delay (default: 5)
//! - `QUOTE_MAX_RECONNECT_ATTEMPTS`: Reconnect cap, 0 = unlimited (default: 0)
//! - `RELAY_BUS_TRANSPORT`: `kafka` or `lines` (default: kafka)
//! - `RELAY_BUS_BROKERS`: Comma-separated brokers (default: localhost:9092)
//! - `RELAY_BUS_TOPIC`: Bus topic (default: imat3a_ADA)
//! - `RELAY_BUS_KEY`: Partition key, one character (default: A)
//! - `RELAY_HEALTH_PORT`: Health check HTTP port, 0 = disabled (default: 8083)
//! - `OTEL_ENABLED`, `OTEL_EXPORTER_OTLP_ENDPOINT`, `OTEL_SERVICE_NAME`
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;

use quote_relay::infrastructure::bus::LineBusPublisher;
#[cfg(feature = "kafka")]
use quote_relay::infrastructure::bus::{KafkaBusConfig, KafkaBusPublisher};
use quote_relay::infrastructure::config::{BusSettings, BusTransport};
use quote_relay::infrastructure::feed::{FeedClient, FeedEvent, SessionState};
use quote_relay::infrastructure::health::{
    HealthServer, HealthServerState, PipelineRole, PipelineStatus,
};
use quote_relay::infrastructure::{runtime, telemetry};
use quote_relay::{BusPublisher, RelayConfig, RelayPublisher, init_metrics};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Feed event channel capacity.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    runtime::install_crypto_provider();
    runtime::load_dotenv();

    let _telemetry_guard = telemetry::init("quote-producer");

    tracing::info!("Starting quote producer");

    if let Err(e) = init_metrics() {
        tracing::warn!(error = %e, "Prometheus metrics unavailable");
    }

    let config = RelayConfig::from_env()?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();
    let status = Arc::new(PipelineStatus::new());

    if config.server.health_port != 0 {
        let health_state = Arc::new(HealthServerState::new(
            env!("CARGO_PKG_VERSION").to_string(),
            PipelineRole::Producer,
            Arc::clone(&status),
        ));
        let health_server = HealthServer::new(
            config.server.health_port,
            health_state,
            shutdown_token.clone(),
        );
        tokio::spawn(async move {
            if let Err(e) = health_server.run().await {
                tracing::error!(error = %e, "Health server error");
            }
        });
    }

    let publisher = RelayPublisher::new(
        build_bus_publisher(&config.bus)?,
        config.bus.topic.clone(),
        config.bus.key.to_string(),
    );

    let (event_tx, event_rx) = mpsc::channel::<FeedEvent>(EVENT_CHANNEL_CAPACITY);
    let feed_client = Arc::new(FeedClient::new(
        config.feed.client_config(),
        event_tx,
        shutdown_token.clone(),
    ));

    let client_shutdown = shutdown_token.clone();
    let client_status = Arc::clone(&status);
    tokio::spawn(async move {
        if let Err(e) = feed_client.run().await {
            tracing::error!(error = %e, "Feed client stopped");
        }
        client_status.set_feed_state(SessionState::Closed);
        client_shutdown.cancel();
    });

    let events = tokio::spawn(handle_feed_events(event_rx, publisher, Arc::clone(&status)));

    tracing::info!("Quote producer ready");

    runtime::await_shutdown(shutdown_token).await;
    let _ = events.await;

    tracing::info!("Quote producer stopped");
    Ok(())
}

/// Handle events from the feed client.
async fn handle_feed_events(
    mut rx: mpsc::Receiver<FeedEvent>,
    publisher: RelayPublisher,
    status: Arc<PipelineStatus>,
) {
    while let Some(event) = rx.recv().await {
        match event {
            FeedEvent::Connected { session_id } => {
                status.set_feed_state(SessionState::Streaming);
                tracing::info!(session_id = %session_id, "Quote feed connected");
            }
            FeedEvent::Disconnected => {
                status.set_feed_state(SessionState::Failed);
                tracing::warn!("Quote feed disconnected");
            }
            FeedEvent::Reconnecting { attempt } => {
                status.set_feed_state(SessionState::Connecting);
                status.set_reconnect_attempt(attempt);
                tracing::info!(attempt, "Quote feed reconnecting");
            }
            FeedEvent::Quote(record) => match publisher.publish(&record).await {
                Ok(()) => status.increment_published(),
                Err(e) => {
                    status.increment_publish_failures();
                    tracing::error!(
                        error = %e,
                        symbol = record.symbol(),
                        price = %record.price(),
                        "Failed to publish quote"
                    );
                }
            },
            FeedEvent::Error(msg) => {
                tracing::warn!(error = %msg, "Quote feed error");
            }
        }
    }
}

/// Publisher for the configured bus transport.
fn build_bus_publisher(settings: &BusSettings) -> anyhow::Result<Arc<dyn BusPublisher>> {
    match settings.transport {
        BusTransport::Lines => {
            tracing::info!(
                topic = %settings.topic,
                "Line transport selected; topic is chosen by the downstream tool"
            );
            Ok(Arc::new(LineBusPublisher::stdout()))
        }
        #[cfg(feature = "kafka")]
        BusTransport::Kafka => Ok(Arc::new(KafkaBusPublisher::new(
            &KafkaBusConfig::from_settings(settings),
        )?)),
        #[cfg(not(feature = "kafka"))]
        BusTransport::Kafka => {
            anyhow::bail!("built without the `kafka` feature; set RELAY_BUS_TRANSPORT=lines")
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &RelayConfig) {
    tracing::info!(
        symbol = %config.feed.symbol,
        transport = %config.bus.transport,
        topic = %config.bus.topic,
        key = %config.bus.key,
        health_port = config.server.health_port,
        "Configuration loaded"
    );
    tracing::debug!(
        url = %config.feed.url,
        origin = %config.feed.origin,
        reconnect_delay_secs = config.feed.reconnect_delay.as_secs(),
        max_reconnect_attempts = config.feed.max_reconnect_attempts,
        brokers = ?config.bus.brokers,
        "Feed endpoint"
    );
}

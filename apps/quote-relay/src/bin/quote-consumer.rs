//! Quote Consumer Binary
//!
//! Consumes the bus topic, repairs each payload and writes one point per
//! message to the time-series store.
//!
//! A new consumer group starts from the earliest retained offset, so quotes
//! published before the consumer first started are written too. Set
//! `RELAY_BUS_FROM_BEGINNING=false` to start at the latest offset instead.
//!
//! # Usage
//!
//! ```bash
//! RELAY_BUS_BROKERS=b-1:9092,b-2:9092 quote-consumer
//!
//! # Line transport: `key:value` on stdin from external tooling
//! kafka-console-consumer --bootstrap-server b-1:9092 --topic imat3a_ADA \
//!     --from-beginning --property print.key=true --property key.separator=: \
//!     | RELAY_BUS_TRANSPORT=lines quote-consumer
//! ```
//!
//! # Environment Variables
//!
//! - `TIMESERIES_ENDPOINT`: HTTP write endpoint; unset logs points instead
//! - `TIMESERIES_DATABASE`: Database (default: CryptoIcaiDatabase)
//! - `TIMESERIES_TABLE`: Table (default: CryptoMonedas)
//! - `TIMESERIES_MEASURE_NAME`: Measure name (default: ADA)
//! - `TIMESERIES_MAX_ATTEMPTS`: Write attempts per point (default: 10)
//! - `RELAY_BUS_TRANSPORT`: `kafka` or `lines` (default: kafka)
//! - `RELAY_BUS_BROKERS`: Comma-separated brokers (default: localhost:9092)
//! - `RELAY_BUS_TOPIC`: Bus topic (default: imat3a_ADA)
//! - `RELAY_BUS_GROUP_ID`: Consumer group (default: quote-relay-consumer)
//! - `RELAY_BUS_FROM_BEGINNING`: New groups start at the earliest offset (default: true)
//! - `RELAY_HEALTH_PORT`: Health check HTTP port, 0 = disabled (default: 8083)
//! - `OTEL_ENABLED`, `OTEL_EXPORTER_OTLP_ENDPOINT`, `OTEL_SERVICE_NAME`
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;

use quote_relay::infrastructure::bus::LineBusSubscriber;
#[cfg(feature = "kafka")]
use quote_relay::infrastructure::bus::{KafkaBusConfig, KafkaBusSubscriber};
use quote_relay::infrastructure::config::{BusSettings, BusTransport, TimeSeriesSettings};
use quote_relay::infrastructure::health::{
    HealthServer, HealthServerState, PipelineRole, PipelineStatus,
};
use quote_relay::infrastructure::timeseries::{
    HttpTimeSeriesWriter, HttpWriterConfig, LoggingTimeSeriesWriter,
};
use quote_relay::infrastructure::{runtime, telemetry};
use quote_relay::{
    BusSubscriber, RelayConfig, RelayConsumer, TimeSeriesWriter, default_dimensions, init_metrics,
};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    runtime::install_crypto_provider();
    runtime::load_dotenv();

    let _telemetry_guard = telemetry::init("quote-consumer");

    tracing::info!("Starting quote consumer");

    if let Err(e) = init_metrics() {
        tracing::warn!(error = %e, "Prometheus metrics unavailable");
    }

    let config = RelayConfig::from_env()?;
    tracing::info!(
        transport = %config.bus.transport,
        topic = %config.bus.topic,
        database = %config.timeseries.database,
        table = %config.timeseries.table,
        measure = %config.timeseries.measure_name,
        health_port = config.server.health_port,
        "Configuration loaded"
    );

    let shutdown_token = CancellationToken::new();
    let status = Arc::new(PipelineStatus::new());

    if config.server.health_port != 0 {
        let health_state = Arc::new(HealthServerState::new(
            env!("CARGO_PKG_VERSION").to_string(),
            PipelineRole::Consumer,
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

    let mut subscriber = build_bus_subscriber(&config.bus)?;
    let writer = build_writer(&config.timeseries)?;
    let consumer = RelayConsumer::new(
        writer,
        config.timeseries.measure_name.clone(),
        default_dimensions(),
    )
    .with_status(status);

    tokio::spawn(runtime::await_shutdown(shutdown_token.clone()));

    let result = consumer
        .run(subscriber.as_mut(), shutdown_token.clone())
        .await;
    shutdown_token.cancel();

    result?;
    Ok(())
}

/// Subscriber for the configured bus transport.
fn build_bus_subscriber(settings: &BusSettings) -> anyhow::Result<Box<dyn BusSubscriber>> {
    match settings.transport {
        BusTransport::Lines => {
            tracing::info!("Line transport selected; reading bus lines from stdin");
            Ok(Box::new(LineBusSubscriber::stdin()))
        }
        #[cfg(feature = "kafka")]
        BusTransport::Kafka => Ok(Box::new(KafkaBusSubscriber::new(
            &KafkaBusConfig::from_settings(settings),
            &settings.topic,
        )?)),
        #[cfg(not(feature = "kafka"))]
        BusTransport::Kafka => {
            anyhow::bail!("built without the `kafka` feature; set RELAY_BUS_TRANSPORT=lines")
        }
    }
}

/// HTTP writer when an endpoint is configured, otherwise a dry-run logger.
fn build_writer(settings: &TimeSeriesSettings) -> anyhow::Result<Arc<dyn TimeSeriesWriter>> {
    let Some(endpoint) = &settings.endpoint else {
        tracing::warn!("TIMESERIES_ENDPOINT not set; points will only be logged");
        return Ok(Arc::new(LoggingTimeSeriesWriter));
    };

    let writer = HttpTimeSeriesWriter::new(
        HttpWriterConfig::new(
            endpoint.clone(),
            settings.database.clone(),
            settings.table.clone(),
        )
        .with_max_attempts(settings.max_attempts),
    )?;
    tracing::info!(endpoint = %writer.endpoint(), "Writing to time-series store");

    Ok(Arc::new(writer))
}

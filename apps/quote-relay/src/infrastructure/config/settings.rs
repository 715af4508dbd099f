//! Relay Configuration Settings
//!
//! Configuration types for both relay processes, loaded from environment
//! variables once at startup and passed to each component on construction.

use std::fmt;
use std::time::Duration;

use crate::infrastructure::feed::FeedClientConfig;
use crate::infrastructure::feed::session::{DEFAULT_FEED_ORIGIN, DEFAULT_FEED_URL};
use crate::infrastructure::retry::RetryConfig;

/// Bus partition key: exactly one character, fixed per deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionKey(char);

impl PartitionKey {
    /// Parse a key from a string holding exactly one character.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for empty or multi-character input.
    pub fn parse(key: &str, value: &str) -> Result<Self, ConfigError> {
        let mut chars = value.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) if c != ':' && !c.is_whitespace() => Ok(Self(c)),
            _ => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                value: value.to_string(),
                reason: "expected a single non-separator character".to_string(),
            }),
        }
    }

    /// The key character.
    #[must_use]
    pub const fn as_char(self) -> char {
        self.0
    }
}

impl Default for PartitionKey {
    fn default() -> Self {
        Self('A')
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Upstream feed settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedSettings {
    /// WebSocket endpoint.
    pub url: String,
    /// `Origin` header value.
    pub origin: String,
    /// Subscribed symbol.
    pub symbol: String,
    /// Fixed delay between reconnection attempts.
    pub reconnect_delay: Duration,
    /// Maximum reconnection attempts before giving up (0 = unlimited).
    pub max_reconnect_attempts: u32,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_FEED_URL.to_string(),
            origin: DEFAULT_FEED_ORIGIN.to_string(),
            symbol: "BINANCE:ADAUSD".to_string(),
            reconnect_delay: Duration::from_secs(5),
            max_reconnect_attempts: 0, // Unlimited
        }
    }
}

impl FeedSettings {
    /// Feed client configuration for these settings.
    #[must_use]
    pub fn client_config(&self) -> FeedClientConfig {
        FeedClientConfig {
            url: self.url.clone(),
            origin: self.origin.clone(),
            symbol: self.symbol.clone(),
            reconnect: RetryConfig::fixed(self.reconnect_delay)
                .with_max_attempts(self.max_reconnect_attempts),
        }
    }
}

/// How the binaries reach the message bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BusTransport {
    /// Native Kafka client; honours brokers, topic and key.
    #[default]
    Kafka,
    /// `key:value` lines on stdout/stdin for external bus tooling.
    /// The topic and brokers are not used by this transport.
    Lines,
}

impl BusTransport {
    /// Parse `kafka` or `lines` (case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for any other name.
    pub fn parse(key: &str, value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "kafka" => Ok(Self::Kafka),
            "lines" => Ok(Self::Lines),
            _ => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                value: value.to_string(),
                reason: "expected `kafka` or `lines`".to_string(),
            }),
        }
    }

    /// Transport name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Kafka => "kafka",
            Self::Lines => "lines",
        }
    }
}

impl fmt::Display for BusTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message bus settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusSettings {
    /// Bus transport.
    pub transport: BusTransport,
    /// Topic quotes are published to and consumed from.
    pub topic: String,
    /// Partition key for this deployment.
    pub key: PartitionKey,
    /// Bootstrap broker addresses.
    pub brokers: Vec<String>,
    /// Consumer group id.
    pub group_id: String,
    /// A new consumer group starts at the earliest retained offset.
    pub from_beginning: bool,
}

impl Default for BusSettings {
    fn default() -> Self {
        Self {
            transport: BusTransport::default(),
            topic: "imat3a_ADA".to_string(),
            key: PartitionKey::default(),
            brokers: vec!["localhost:9092".to_string()],
            group_id: "quote-relay-consumer".to_string(),
            from_beginning: true,
        }
    }
}

/// Time-series store settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeSeriesSettings {
    /// HTTP write endpoint; `None` selects the logging writer.
    pub endpoint: Option<String>,
    /// Database name.
    pub database: String,
    /// Table name.
    pub table: String,
    /// Measure name for every point.
    pub measure_name: String,
    /// Maximum write attempts per point.
    pub max_attempts: u32,
}

impl Default for TimeSeriesSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            database: "CryptoIcaiDatabase".to_string(),
            table: "CryptoMonedas".to_string(),
            measure_name: "ADA".to_string(),
            max_attempts: 10,
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerSettings {
    /// Health check HTTP port (0 = disabled).
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { health_port: 8083 }
    }
}

/// Complete relay configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayConfig {
    /// Upstream feed settings.
    pub feed: FeedSettings,
    /// Message bus settings.
    pub bus: BusSettings,
    /// Time-series store settings.
    pub timeseries: TimeSeriesSettings,
    /// Server port settings.
    pub server: ServerSettings,
}

impl RelayConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to an empty or unparsable value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to an empty or unparsable value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvSource(lookup);
        let defaults = Self::default();

        let feed = FeedSettings {
            url: env.string("QUOTE_FEED_URL", defaults.feed.url)?,
            origin: env.string("QUOTE_FEED_ORIGIN", defaults.feed.origin)?,
            symbol: env.string("QUOTE_SYMBOL", defaults.feed.symbol)?,
            reconnect_delay: env
                .parse::<u64>("QUOTE_RECONNECT_DELAY_SECS")?
                .map_or(defaults.feed.reconnect_delay, Duration::from_secs),
            max_reconnect_attempts: env
                .parse("QUOTE_MAX_RECONNECT_ATTEMPTS")?
                .unwrap_or(defaults.feed.max_reconnect_attempts),
        };

        let bus = BusSettings {
            transport: env
                .get("RELAY_BUS_TRANSPORT")
                .map(|v| BusTransport::parse("RELAY_BUS_TRANSPORT", &v))
                .transpose()?
                .unwrap_or(defaults.bus.transport),
            topic: env.string("RELAY_BUS_TOPIC", defaults.bus.topic)?,
            key: env
                .get("RELAY_BUS_KEY")
                .map(|v| PartitionKey::parse("RELAY_BUS_KEY", &v))
                .transpose()?
                .unwrap_or(defaults.bus.key),
            brokers: env
                .get("RELAY_BUS_BROKERS")
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|b| !b.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or(defaults.bus.brokers),
            group_id: env.string("RELAY_BUS_GROUP_ID", defaults.bus.group_id)?,
            from_beginning: env
                .parse("RELAY_BUS_FROM_BEGINNING")?
                .unwrap_or(defaults.bus.from_beginning),
        };
        if bus.transport == BusTransport::Kafka && bus.brokers.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "RELAY_BUS_BROKERS".to_string(),
                value: env.get("RELAY_BUS_BROKERS").unwrap_or_default(),
                reason: "the kafka transport needs at least one broker".to_string(),
            });
        }

        let timeseries = TimeSeriesSettings {
            endpoint: env.get("TIMESERIES_ENDPOINT").filter(|v| !v.trim().is_empty()),
            database: env.string("TIMESERIES_DATABASE", defaults.timeseries.database)?,
            table: env.string("TIMESERIES_TABLE", defaults.timeseries.table)?,
            measure_name: env.string("TIMESERIES_MEASURE_NAME", defaults.timeseries.measure_name)?,
            max_attempts: match env.parse::<u32>("TIMESERIES_MAX_ATTEMPTS")? {
                Some(0) => {
                    return Err(ConfigError::InvalidValue {
                        key: "TIMESERIES_MAX_ATTEMPTS".to_string(),
                        value: "0".to_string(),
                        reason: "at least one attempt is required".to_string(),
                    });
                }
                Some(n) => n,
                None => defaults.timeseries.max_attempts,
            },
        };

        let server = ServerSettings {
            health_port: env
                .parse("RELAY_HEALTH_PORT")?
                .unwrap_or(defaults.server.health_port),
        };

        Ok(Self {
            feed,
            bus,
            timeseries,
            server,
        })
    }
}

/// Configuration error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable could not be parsed.
    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Offending value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },
}

struct EnvSource<F>(F);

impl<F> EnvSource<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
    }

    /// Non-empty string, or `default` when unset.
    fn string(&self, key: &str, default: String) -> Result<String, ConfigError> {
        match self.get(key) {
            None => Ok(default),
            Some(v) if v.trim().is_empty() => Err(ConfigError::EmptyValue(key.to_string())),
            Some(v) => Ok(v.trim().to_string()),
        }
    }

    fn parse<T>(&self, key: &str) -> Result<Option<T>, ConfigError>
    where
        T: std::str::FromStr,
        T::Err: fmt::Display,
    {
        self.get(key)
            .map(|v| {
                v.trim().parse::<T>().map_err(|e| ConfigError::InvalidValue {
                    key: key.to_string(),
                    value: v.clone(),
                    reason: e.to_string(),
                })
            })
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use test_case::test_case;

    fn from_vars(vars: &[(&str, &str)]) -> Result<RelayConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        RelayConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let config = from_vars(&[]).unwrap();

        assert_eq!(config, RelayConfig::default());
        assert_eq!(config.feed.url, "wss://data.tradingview.com/socket.io/websocket");
        assert_eq!(config.feed.origin, "https://data.tradingview.com");
        assert_eq!(config.feed.symbol, "BINANCE:ADAUSD");
        assert_eq!(config.feed.reconnect_delay, Duration::from_secs(5));
        assert_eq!(config.bus.topic, "imat3a_ADA");
        assert_eq!(config.bus.key.as_char(), 'A');
        assert_eq!(config.bus.transport, BusTransport::Kafka);
        assert_eq!(config.bus.brokers, vec!["localhost:9092"]);
        assert_eq!(config.bus.group_id, "quote-relay-consumer");
        assert!(config.bus.from_beginning);
        assert!(config.timeseries.endpoint.is_none());
        assert_eq!(config.timeseries.database, "CryptoIcaiDatabase");
        assert_eq!(config.timeseries.table, "CryptoMonedas");
        assert_eq!(config.timeseries.measure_name, "ADA");
        assert_eq!(config.timeseries.max_attempts, 10);
        assert_eq!(config.server.health_port, 8083);
    }

    #[test]
    fn overrides_from_environment() {
        let config = from_vars(&[
            ("QUOTE_SYMBOL", "BINANCE:BTCUSD"),
            ("QUOTE_RECONNECT_DELAY_SECS", "1"),
            ("QUOTE_MAX_RECONNECT_ATTEMPTS", "3"),
            ("RELAY_BUS_TOPIC", "imat3a_BTC"),
            ("RELAY_BUS_KEY", "B"),
            ("RELAY_BUS_BROKERS", "b-1:9092, b-2:9092,"),
            ("RELAY_BUS_GROUP_ID", "relay-btc"),
            ("RELAY_BUS_FROM_BEGINNING", "false"),
            ("TIMESERIES_ENDPOINT", "http://localhost:9000"),
            ("TIMESERIES_MEASURE_NAME", "BTC"),
            ("RELAY_HEALTH_PORT", "0"),
        ])
        .unwrap();

        assert_eq!(config.feed.symbol, "BINANCE:BTCUSD");
        assert_eq!(config.bus.key.to_string(), "B");
        assert_eq!(config.bus.brokers, vec!["b-1:9092", "b-2:9092"]);
        assert_eq!(config.bus.group_id, "relay-btc");
        assert!(!config.bus.from_beginning);
        assert_eq!(
            config.timeseries.endpoint.as_deref(),
            Some("http://localhost:9000")
        );
        assert_eq!(config.timeseries.measure_name, "BTC");
        assert_eq!(config.server.health_port, 0);

        let client = config.feed.client_config();
        assert_eq!(client.symbol, "BINANCE:BTCUSD");
        assert_eq!(client.reconnect.initial_delay, Duration::from_secs(1));
        assert_eq!(client.reconnect.max_attempts, 3);
    }

    #[test_case("RELAY_BUS_KEY", "AB" ; "multi character key")]
    #[test_case("RELAY_BUS_KEY", "" ; "empty key")]
    #[test_case("RELAY_BUS_KEY", ":" ; "separator key")]
    #[test_case("RELAY_BUS_TRANSPORT", "amqp" ; "unknown transport")]
    #[test_case("RELAY_BUS_BROKERS", " , " ; "kafka without brokers")]
    #[test_case("RELAY_BUS_FROM_BEGINNING", "yes" ; "non boolean start offset")]
    #[test_case("QUOTE_RECONNECT_DELAY_SECS", "five" ; "non numeric delay")]
    #[test_case("RELAY_HEALTH_PORT", "70000" ; "port out of range")]
    #[test_case("TIMESERIES_MAX_ATTEMPTS", "0" ; "zero write attempts")]
    fn invalid_values_are_rejected(key: &str, value: &str) {
        let err = from_vars(&[(key, value)]).unwrap_err();
        assert!(
            matches!(&err, ConfigError::InvalidValue { key: k, .. } if k == key),
            "{err}"
        );
    }

    #[test]
    fn line_transport_needs_no_brokers() {
        let config = from_vars(&[
            ("RELAY_BUS_TRANSPORT", "Lines"),
            ("RELAY_BUS_BROKERS", ""),
        ])
        .unwrap();

        assert_eq!(config.bus.transport, BusTransport::Lines);
        assert!(config.bus.brokers.is_empty());
    }

    #[test]
    fn empty_symbol_is_rejected() {
        assert_eq!(
            from_vars(&[("QUOTE_SYMBOL", "  ")]).unwrap_err(),
            ConfigError::EmptyValue("QUOTE_SYMBOL".to_string())
        );
    }

    #[test]
    fn blank_endpoint_selects_logging_writer() {
        let config = from_vars(&[("TIMESERIES_ENDPOINT", "")]).unwrap();
        assert!(config.timeseries.endpoint.is_none());
    }
}

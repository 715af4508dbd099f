//! Quote Records
//!
//! A quote record is one last-price observation for the subscribed symbol,
//! stamped with the local wall-clock time at which it was extracted (not the
//! upstream event time). Records are immutable and handed straight to the
//! relay publisher.
//!
//! # Bus Encoding
//!
//! ```json
//! {"price":76812.03,"timestamp":"2025-04-08 17:37:53"}
//! ```
//!
//! Observations without a last price carry the string `"unavailable"`.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Local, Timelike};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Serialize, Serializer};
use serde_json::Value;

/// Field carrying the last traded price inside a quote value.
pub const LAST_PRICE_FIELD: &str = "lp";

/// Marker written in place of a missing last price.
pub const UNAVAILABLE: &str = "unavailable";

/// Format of capture timestamps on the bus.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// =============================================================================
// Price
// =============================================================================

/// Observed last price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Price {
    /// Last traded price reported by the feed.
    Last(Decimal),
    /// The quote update did not carry a usable last price.
    Unavailable,
}

impl Price {
    /// Read a price from a JSON value, falling back to `Unavailable`.
    #[must_use]
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Number(n) => parse_decimal(&n.to_string()).map_or(Self::Unavailable, Self::Last),
            _ => Self::Unavailable,
        }
    }

    /// Whether a last price was observed.
    #[must_use]
    pub const fn is_available(&self) -> bool {
        matches!(self, Self::Last(_))
    }

    /// The observed price, if any.
    #[must_use]
    pub const fn value(&self) -> Option<Decimal> {
        match self {
            Self::Last(price) => Some(*price),
            Self::Unavailable => None,
        }
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Last(price) => write!(f, "{price}"),
            Self::Unavailable => f.write_str(UNAVAILABLE),
        }
    }
}

impl Serialize for Price {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            // Emitted as a JSON number so the consumer can read it back as one.
            Self::Last(price) => match price.to_f64() {
                Some(value) => serializer.serialize_f64(value),
                None => serializer.serialize_str(&price.to_string()),
            },
            Self::Unavailable => serializer.serialize_str(UNAVAILABLE),
        }
    }
}

fn parse_decimal(text: &str) -> Option<Decimal> {
    Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .ok()
}

// =============================================================================
// Quote Record
// =============================================================================

/// One extracted price observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteRecord {
    symbol: String,
    price: Price,
    captured_at: DateTime<Local>,
}

impl QuoteRecord {
    /// Create a record, truncating the capture time to whole seconds.
    #[must_use]
    pub fn new(symbol: impl Into<String>, price: Price, captured_at: DateTime<Local>) -> Self {
        Self {
            symbol: symbol.into(),
            price,
            captured_at: captured_at.with_nanosecond(0).unwrap_or(captured_at),
        }
    }

    /// Subscribed symbol, e.g. `BINANCE:ADAUSD`.
    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Observed price.
    #[must_use]
    pub const fn price(&self) -> Price {
        self.price
    }

    /// Local wall-clock capture time (second precision).
    #[must_use]
    pub const fn captured_at(&self) -> DateTime<Local> {
        self.captured_at
    }

    /// Capture time in bus format (`YYYY-MM-DD HH:MM:SS`).
    #[must_use]
    pub fn timestamp(&self) -> String {
        self.captured_at.format(TIMESTAMP_FORMAT).to_string()
    }

    /// The `{price, timestamp}` object published to the bus.
    #[must_use]
    pub fn payload(&self) -> QuotePayload {
        QuotePayload {
            price: self.price,
            timestamp: self.timestamp(),
        }
    }
}

/// Bus encoding of a quote record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuotePayload {
    /// Last price or the unavailable marker.
    pub price: Price,
    /// Capture time, `YYYY-MM-DD HH:MM:SS`.
    pub timestamp: String,
}

// =============================================================================
// Extraction
// =============================================================================

/// Errors raised while extracting a quote record.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractionError {
    /// The quote value is not a JSON object.
    #[error("quote value is not an object (found {found})")]
    NotAnObject {
        /// JSON type that was found instead.
        found: &'static str,
    },
}

/// Extract the last price from a quote value, captured now.
///
/// A missing or non-numeric `lp` field yields [`Price::Unavailable`].
///
/// # Errors
///
/// Returns [`ExtractionError::NotAnObject`] if `value` is not a JSON object.
pub fn extract(symbol: &str, value: &Value) -> Result<QuoteRecord, ExtractionError> {
    extract_at(symbol, value, Local::now())
}

/// Extract the last price from a quote value with an explicit capture time.
///
/// # Errors
///
/// Returns [`ExtractionError::NotAnObject`] if `value` is not a JSON object.
pub fn extract_at(
    symbol: &str,
    value: &Value,
    captured_at: DateTime<Local>,
) -> Result<QuoteRecord, ExtractionError> {
    let fields = value.as_object().ok_or(ExtractionError::NotAnObject {
        found: json_type_name(value),
    })?;

    let price = fields
        .get(LAST_PRICE_FIELD)
        .map_or(Price::Unavailable, Price::from_json);

    Ok(QuoteRecord::new(symbol, price, captured_at))
}

const fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn at(h: u32, m: u32, s: u32, nanos: u32) -> DateTime<Local> {
        Local
            .with_ymd_and_hms(2025, 4, 8, h, m, s)
            .earliest()
            .unwrap()
            .with_nanosecond(nanos)
            .unwrap()
    }

    #[test]
    fn extracts_last_price() {
        let record = extract_at("BINANCE:ADAUSD", &json!({"lp": 0.6123}), at(17, 37, 53, 0)).unwrap();

        assert_eq!(record.symbol(), "BINANCE:ADAUSD");
        assert_eq!(record.price(), Price::Last(Decimal::new(6123, 4)));
        assert_eq!(record.timestamp(), "2025-04-08 17:37:53");
    }

    #[test]
    fn missing_last_price_is_unavailable() {
        let record = extract_at("BINANCE:ADAUSD", &json!({"ch": 0.01}), at(9, 0, 0, 0)).unwrap();
        assert_eq!(record.price(), Price::Unavailable);
        assert!(!record.price().is_available());
    }

    #[test]
    fn non_numeric_last_price_is_unavailable() {
        let record = extract_at("X", &json!({"lp": "n/a"}), at(9, 0, 0, 0)).unwrap();
        assert_eq!(record.price(), Price::Unavailable);
    }

    #[test]
    fn non_object_is_rejected() {
        let err = extract("X", &json!([1, 2])).unwrap_err();
        assert_eq!(err, ExtractionError::NotAnObject { found: "array" });
    }

    #[test]
    fn capture_time_has_second_precision() {
        let record = extract_at("X", &json!({"lp": 1}), at(12, 0, 1, 999_000_000)).unwrap();
        assert_eq!(record.captured_at().nanosecond(), 0);
        assert_eq!(record.timestamp(), "2025-04-08 12:00:01");
    }

    #[test]
    fn scientific_price_is_parsed() {
        assert_eq!(
            Price::from_json(&json!(1.5e-7)),
            Price::Last(Decimal::from_scientific("1.5e-7").unwrap())
        );
    }

    #[test]
    fn payload_serializes_price_as_number() {
        let record = QuoteRecord::new(
            "BINANCE:BTCUSD",
            Price::Last(Decimal::new(7_681_203, 2)),
            at(17, 37, 53, 0),
        );

        let json = serde_json::to_string(&record.payload()).unwrap();
        assert_eq!(json, r#"{"price":76812.03,"timestamp":"2025-04-08 17:37:53"}"#);
    }

    #[test]
    fn payload_serializes_unavailable_marker() {
        let record = QuoteRecord::new("X", Price::Unavailable, at(8, 5, 0, 0));

        let json = serde_json::to_string(&record.payload()).unwrap();
        assert_eq!(json, r#"{"price":"unavailable","timestamp":"2025-04-08 08:05:00"}"#);
    }

    #[test]
    fn price_display() {
        assert_eq!(Price::Last(Decimal::new(150, 1)).to_string(), "15.0");
        assert_eq!(Price::Unavailable.to_string(), "unavailable");
    }
}

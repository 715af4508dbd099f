//! Time-Series Points
//!
//! The unit written to the time-series store: one measure value at one
//! instant, tagged with a fixed set of dimensions.

use std::collections::BTreeMap;

/// Dimension name attached to every point.
pub const DEFAULT_DIMENSION_NAME: &str = "ICAI";

/// Dimension value attached to every point.
pub const DEFAULT_DIMENSION_VALUE: &str = "Crypto";

/// Fixed dimensions for a deployment.
pub type Dimensions = BTreeMap<String, String>;

/// The default `{"ICAI": "Crypto"}` dimension set.
#[must_use]
pub fn default_dimensions() -> Dimensions {
    Dimensions::from([(
        DEFAULT_DIMENSION_NAME.to_string(),
        DEFAULT_DIMENSION_VALUE.to_string(),
    )])
}

/// A single time-series record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeSeriesPoint {
    /// Measure name, e.g. `ADA`.
    pub measure_name: String,
    /// Fixed dimensions.
    pub dimensions: Dimensions,
    /// Measure value rendered as text.
    pub value: String,
    /// Epoch milliseconds rendered as text.
    pub time_millis: String,
}

impl TimeSeriesPoint {
    /// Create a point.
    #[must_use]
    pub fn new(
        measure_name: impl Into<String>,
        dimensions: Dimensions,
        value: impl Into<String>,
        time_millis: i64,
    ) -> Self {
        Self {
            measure_name: measure_name.into(),
            dimensions,
            value: value.into(),
            time_millis: time_millis.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_dimensions_are_fixed() {
        let dims = default_dimensions();
        assert_eq!(dims.len(), 1);
        assert_eq!(dims.get("ICAI").map(String::as_str), Some("Crypto"));
    }

    #[test]
    fn point_renders_millis_as_text() {
        let point = TimeSeriesPoint::new("ADA", default_dimensions(), "0.61", 1_744_126_673_000);
        assert_eq!(point.time_millis, "1744126673000");
        assert_eq!(point.value, "0.61");
    }
}

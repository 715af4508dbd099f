//! Payload Repair
//!
//! Bus messages may arrive with their quotes stripped by intermediate
//! tooling, e.g.
//!
//! ```text
//! {price: 76812.03, timestamp: 2025-04-08 17:37:53}
//! ```
//!
//! [`repair`] turns such text back into valid JSON:
//!
//! ```json
//! {"price": 76812.03, "timestamp": "2025-04-08 17:37:53"}
//! ```
//!
//! # Constraints
//!
//! The repair splits on commas without tracking nesting, which is only sound
//! for single-level payloads. Input containing nested objects or arrays is
//! rejected with [`RepairError::NestedStructure`] rather than mis-parsed.
//! Commas inside string values are not supported either.

/// Errors raised while repairing a payload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepairError {
    /// The payload contains a nested object or array.
    #[error("nested structure at byte {position} is not supported")]
    NestedStructure {
        /// Byte offset of the offending bracket within the object body.
        position: usize,
    },
}

/// Repair a loosely formatted, single-level object into valid JSON text.
///
/// Keys are always quoted. Bare values containing both `-` and `:` are
/// treated as date-like and quoted; every other bare value is left as is.
/// Fragments that do not split into a non-empty key and value are skipped.
///
/// The output is a fixed point: repairing it again yields the same text.
///
/// # Errors
///
/// Returns [`RepairError::NestedStructure`] if the object body contains a
/// bracket outside a quoted string.
pub fn repair(raw: &str) -> Result<String, RepairError> {
    let text = raw.trim();
    let body = text
        .strip_prefix('{')
        .and_then(|rest| rest.strip_suffix('}'))
        .unwrap_or(text);

    if let Some(position) = find_nested_bracket(body) {
        return Err(RepairError::NestedStructure { position });
    }

    let fields: Vec<String> = body.split(',').filter_map(repair_fragment).collect();

    Ok(format!("{{{}}}", fields.join(", ")))
}

fn repair_fragment(fragment: &str) -> Option<String> {
    let Some((key, value)) = fragment.split_once(':') else {
        if !fragment.trim().is_empty() {
            tracing::debug!(fragment, "Skipping fragment without key/value separator");
        }
        return None;
    };

    let key = key.trim();
    let value = value.trim();
    if key.is_empty() || value.is_empty() {
        tracing::debug!(fragment, "Skipping fragment with empty key or value");
        return None;
    }

    let key = if is_quoted(key) {
        key.to_string()
    } else {
        format!("\"{key}\"")
    };

    let value = if !is_quoted(value) && is_date_like(value) {
        format!("\"{value}\"")
    } else {
        value.to_string()
    };

    Some(format!("{key}: {value}"))
}

fn is_quoted(token: &str) -> bool {
    token.len() >= 2 && token.starts_with('"') && token.ends_with('"')
}

/// Both a date separator and a time separator.
fn is_date_like(token: &str) -> bool {
    token.contains('-') && token.contains(':')
}

fn find_nested_bracket(body: &str) -> Option<usize> {
    let mut in_string = false;
    let mut escaped = false;

    for (position, ch) in body.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' | '}' | '[' | ']' => return Some(position),
            _ => {}
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use test_case::test_case;

    #[test]
    fn repairs_unquoted_keys_and_dates() {
        let repaired = repair("{price: 76812.03, timestamp: 2025-04-08 17:37:53}").unwrap();
        assert_eq!(
            repaired,
            r#"{"price": 76812.03, "timestamp": "2025-04-08 17:37:53"}"#
        );

        let value: serde_json::Value = serde_json::from_str(&repaired).unwrap();
        assert_eq!(value["timestamp"], "2025-04-08 17:37:53");
        assert!(value["price"].is_number());
    }

    #[test_case(r#"{"price":76812.03,"timestamp":"2025-04-08 17:37:53"}"#,
                r#"{"price": 76812.03, "timestamp": "2025-04-08 17:37:53"}"# ; "compact json")]
    #[test_case("price: 1.5", r#"{"price": 1.5}"# ; "without braces")]
    #[test_case("  {price: 2}  ", r#"{"price": 2}"# ; "surrounding whitespace")]
    #[test_case("{}", "{}" ; "empty object")]
    #[test_case("{price: 3, garbage, : 4, key:}", r#"{"price": 3}"# ; "skips broken fragments")]
    #[test_case(r#"{"note": "a-b:c"}"#, r#"{"note": "a-b:c"}"# ; "quoted date-like value kept")]
    #[test_case("{delta: -0.5}", r#"{"delta": -0.5}"# ; "negative number not date-like")]
    #[test_case("{t: 12:30}", r#"{"t": 12:30}"# ; "time without date left bare")]
    fn repair_cases(input: &str, expected: &str) {
        assert_eq!(repair(input).unwrap(), expected);
    }

    #[test]
    fn time_value_keeps_everything_after_first_colon() {
        let repaired = repair("{timestamp: 2025-01-02 03:04:05}").unwrap();
        assert_eq!(repaired, r#"{"timestamp": "2025-01-02 03:04:05"}"#);
    }

    #[test]
    fn nested_object_is_rejected() {
        let err = repair("{price: 1, meta: {venue: x}}").unwrap_err();
        assert!(matches!(err, RepairError::NestedStructure { .. }));
    }

    #[test]
    fn nested_array_is_rejected() {
        let err = repair("{prices: [1, 2]}").unwrap_err();
        assert_eq!(err, RepairError::NestedStructure { position: 8 });
    }

    #[test]
    fn brackets_inside_strings_are_allowed() {
        let repaired = repair(r#"{label: "[x]"}"#).unwrap();
        assert_eq!(repaired, r#"{"label": "[x]"}"#);
    }

    prop_compose! {
        fn date_like()(
            year in 1970u32..2100, month in 1u32..=12, day in 1u32..=28,
            hour in 0u32..24, minute in 0u32..60, second in 0u32..60,
        ) -> String {
            format!("{year:04}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02}")
        }
    }

    proptest! {
        #[test]
        fn date_values_are_quoted_and_numbers_are_not(
            date in date_like(),
            price in 0.0f64..1_000_000.0,
            volume in 0u64..10_000_000,
        ) {
            let raw = format!("{{price: {price}, timestamp: {date}, volume: {volume}}}");
            let repaired = repair(&raw).unwrap();

            let expected_timestamp = format!("\"timestamp\": \"{date}\"");
            let expected_price = format!("\"price\": {price}");
            let expected_volume = format!("\"volume\": {volume}");
            prop_assert!(repaired.contains(&expected_timestamp));
            prop_assert!(repaired.contains(&expected_price));
            prop_assert!(repaired.contains(&expected_volume));

            let value: serde_json::Value = serde_json::from_str(&repaired).unwrap();
            prop_assert_eq!(value["timestamp"].as_str(), Some(date.as_str()));
            prop_assert!(value["price"].is_number());
        }

        #[test]
        fn repair_is_idempotent(
            keys in proptest::collection::vec("[a-z][a-z_]{0,8}", 0..5),
            date in date_like(),
            number in -1_000_000i64..1_000_000,
        ) {
            let mut fields: Vec<String> = keys.iter().map(|k| format!("{k}: {number}")).collect();
            fields.push(format!("stamp: {date}"));
            let once = repair(&format!("{{{}}}", fields.join(", "))).unwrap();
            let twice = repair(&once).unwrap();
            prop_assert_eq!(once, twice);
        }
    }
}

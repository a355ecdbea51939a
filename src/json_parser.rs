//! JSON payload parsers
//!
//! - Imbalance volume: records `{Time, Measurements: [{Name, Value}]}` with a
//!   decorated epoch `Time`, pivoted into one column per measurement name
//! - Imbalance price per minute: flat records keyed by `minute`, one column
//!   per numeric field

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::FormatError;
use crate::table::TimeSeriesTable;
use crate::timestamps::{classify_timestamps, parse_epoch_date};
use crate::types::{ParsedRecordSet, RawTimestamps};
use crate::values::parse_measurement;

/// Timestamp field of the per-minute price records
pub const MINUTE_FIELD: &str = "minute";

/// Columns kept from the per-minute price records
pub const PER_MINUTE_COLUMNS: [&str; 6] = [
    "systemImbalance",
    "alpha",
    "marginalIncrementalPrice",
    "marginalDecrementalPrice",
    "imbalancePriceUp",
    "imbalancePriceDown",
];

// ============================================================================
// Imbalance volume
// ============================================================================

/// Imbalance volume record
///
/// Example:
/// ```json
/// {"Time": "/Date(1632802500000+0200)/",
///  "Measurements": [{"Name": "R2_UP", "Value": 12.5}]}
/// ```
#[derive(Debug, Deserialize)]
struct VolumeRecord {
    /// Decorated epoch, see [`parse_epoch_date`]
    #[serde(rename = "Time")]
    time: String,

    #[serde(rename = "Measurements", default)]
    measurements: Vec<Measurement>,
}

#[derive(Debug, Deserialize)]
struct Measurement {
    #[serde(rename = "Name")]
    name: String,

    /// `null` when the channel has no value for this minute
    #[serde(rename = "Value")]
    value: Option<f64>,
}

fn json_error(err: serde_json::Error) -> FormatError {
    FormatError::Json(err.to_string())
}

/// Parse the imbalance volume feed
///
/// A `Time` that is not a decorated epoch fails the whole payload. Repeated
/// `(Time, Name)` pairs must agree.
///
/// # Example
///
/// ```
/// # use elia_client::json_parser::parse_imbalance_volume;
/// let json = r#"[
///   {"Time": "/Date(1632802560000+0200)/", "Measurements": [{"Name": "R2_UP", "Value": 3.0}]},
///   {"Time": "/Date(1632802500000+0200)/", "Measurements": [{"Name": "R2_UP", "Value": 1.0},
///                                                         {"Name": "R2_DOWN", "Value": 2.0}]}
/// ]"#;
///
/// let parsed = parse_imbalance_volume(json).unwrap();
/// assert_eq!(parsed.len(), 2);
/// assert_eq!(parsed.columns()[0].1, vec![Some(1.0), Some(3.0)]);
/// assert_eq!(parsed.columns()[1].1, vec![Some(2.0), None]);
/// ```
pub fn parse_imbalance_volume(json: &str) -> Result<ParsedRecordSet, FormatError> {
    let records: Vec<VolumeRecord> = serde_json::from_str(json).map_err(json_error)?;
    if records.is_empty() {
        return Err(FormatError::EmptyResponse);
    }

    let mut table = TimeSeriesTable::default();
    for record in records {
        let ts = parse_epoch_date(&record.time)?;
        for m in record.measurements {
            table.set_cell(ts, &m.name, m.value.filter(|v| v.is_finite()))?;
        }
    }

    debug!(
        "Pivoted {} imbalance volume rows into {} channels",
        table.len(),
        table.columns().len()
    );

    let (index, columns) = table.into_columns();
    ParsedRecordSet::new(RawTimestamps::Instants(index), columns)
}

// ============================================================================
// Imbalance price per minute
// ============================================================================

fn json_number(value: Option<&Value>, column: &str) -> Result<Option<f64>, FormatError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(n.as_f64().filter(|v| v.is_finite())),
        Some(Value::String(s)) => parse_measurement(Some(s.as_str())),
        Some(other) => Err(FormatError::InvalidNumber(format!("{}: {}", column, other))),
    }
}

/// True for a value that can never be read as a number
fn is_json_text(value: &Value) -> bool {
    match value {
        Value::String(s) => parse_measurement(Some(s.as_str())).is_err(),
        Value::Bool(_) | Value::Array(_) | Value::Object(_) => true,
        Value::Null | Value::Number(_) => false,
    }
}

/// Parse the per-minute imbalance price feed
///
/// Every field besides `minute` becomes a column. Fields holding only text
/// (`qualityStatus`) are dropped; a field mixing numbers with text is an
/// `InvalidNumber`. The caller narrows the result to [`PER_MINUTE_COLUMNS`].
pub fn parse_prices_per_minute(json: &str) -> Result<ParsedRecordSet, FormatError> {
    let records: Vec<Map<String, Value>> = serde_json::from_str(json).map_err(json_error)?;
    if records.is_empty() {
        return Err(FormatError::EmptyResponse);
    }

    let times = records
        .iter()
        .map(|record| match record.get(MINUTE_FIELD) {
            Some(Value::String(s)) => Ok(s.clone()),
            Some(other) => Err(FormatError::InvalidTimestamp(other.to_string())),
            None => Err(FormatError::MissingColumn(MINUTE_FIELD.to_string())),
        })
        .collect::<Result<Vec<_>, _>>()?;
    let timestamps = classify_timestamps(&times)?;

    let mut names: Vec<&str> = Vec::new();
    for key in records.iter().flat_map(|r| r.keys()) {
        if key != MINUTE_FIELD && !names.contains(&key.as_str()) {
            names.push(key);
        }
    }

    let mut columns = Vec::with_capacity(names.len());
    for name in names {
        let cells: Vec<Option<&Value>> = records.iter().map(|r| r.get(name)).collect();

        let mut present = cells.iter().flatten().filter(|v| !v.is_null()).peekable();
        if present.peek().is_some() && present.all(|v| is_json_text(v)) {
            debug!("Dropping non-numeric field {}", name);
            continue;
        }

        let values = cells
            .into_iter()
            .map(|v| json_number(v, name))
            .collect::<Result<Vec<_>, _>>()?;
        columns.push((name.to_string(), values));
    }

    debug!("Parsed {} per-minute price rows", timestamps.len());
    ParsedRecordSet::new(timestamps, columns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_volume_time_uses_leading_epoch_seconds() {
        let json = r#"[{"Time": "/Date(1632802500000+0200)/",
                        "Measurements": [{"Name": "R3_STD", "Value": 4.5}]}]"#;

        let parsed = parse_imbalance_volume(json).unwrap();

        assert_eq!(
            parsed.timestamps(),
            &RawTimestamps::Instants(vec![Utc.timestamp_opt(1632802500, 0).unwrap()])
        );
        assert_eq!(parsed.columns(), &[("R3_STD".to_string(), vec![Some(4.5)])]);
    }

    #[test]
    fn test_volume_malformed_time_is_fatal() {
        let json = r#"[
            {"Time": "/Date(1632802500000+0200)/", "Measurements": [{"Name": "R2_UP", "Value": 1}]},
            {"Time": "2021-09-28T04:16:00", "Measurements": [{"Name": "R2_UP", "Value": 2}]}
        ]"#;

        let err = parse_imbalance_volume(json).unwrap_err();
        assert!(matches!(err, FormatError::InvalidTimestamp(_)));
    }

    #[test]
    fn test_volume_null_value_is_missing() {
        let json = r#"[{"Time": "/Date(1632802500000+0200)/",
                        "Measurements": [{"Name": "IGCC_UP", "Value": null}]}]"#;
        let parsed = parse_imbalance_volume(json).unwrap();
        assert_eq!(parsed.columns()[0].1, vec![None]);
    }

    #[test]
    fn test_volume_conflicting_repeat_is_error() {
        let json = r#"[{"Time": "/Date(1632802500000+0200)/",
                        "Measurements": [{"Name": "R2_UP", "Value": 1},
                                         {"Name": "R2_UP", "Value": 2}]}]"#;
        let err = parse_imbalance_volume(json).unwrap_err();
        assert!(matches!(err, FormatError::ConflictingDuplicate { .. }));
    }

    #[test]
    fn test_volume_empty_array_is_error() {
        assert_eq!(parse_imbalance_volume("[]").unwrap_err(), FormatError::EmptyResponse);
    }

    #[test]
    fn test_volume_invalid_json() {
        assert!(matches!(
            parse_imbalance_volume("{not json").unwrap_err(),
            FormatError::Json(_)
        ));
    }

    fn minute_record(minute: &str, si: &str) -> String {
        format!(
            r#"{{"minute": "{minute}", "systemImbalance": {si}, "alpha": 0.0,
                "marginalIncrementalPrice": 120.5, "marginalDecrementalPrice": 80.25,
                "imbalancePriceUp": 121.0, "imbalancePriceDown": 79.5,
                "qualityStatus": "NotValidated", "strategicReserve": 0}}"#
        )
    }

    #[test]
    fn test_per_minute_keeps_numeric_fields() {
        let json = format!(
            "[{},{}]",
            minute_record("2024-10-24T10:01:00+02:00", "-120.3"),
            minute_record("2024-10-24T10:02:00+02:00", "null")
        );

        let parsed = parse_prices_per_minute(&json).unwrap();

        let names: Vec<&str> = parsed.columns().iter().map(|(n, _)| n.as_str()).collect();
        assert!(!names.contains(&"qualityStatus"));
        assert!(!names.contains(&MINUTE_FIELD));
        for column in PER_MINUTE_COLUMNS.iter().chain(["strategicReserve"].iter()) {
            assert!(names.contains(column), "{}", column);
        }

        let si = parsed
            .columns()
            .iter()
            .find(|(n, _)| n == "systemImbalance")
            .unwrap();
        assert_eq!(si.1, vec![Some(-120.3), None]);
        assert_eq!(
            parsed.timestamps(),
            &RawTimestamps::Instants(vec![
                Utc.with_ymd_and_hms(2024, 10, 24, 8, 1, 0).unwrap(),
                Utc.with_ymd_and_hms(2024, 10, 24, 8, 2, 0).unwrap(),
            ])
        );
    }

    #[test]
    fn test_per_minute_text_in_numeric_field_is_error() {
        let json = format!(
            "[{},{}]",
            minute_record("2024-10-24T10:01:00+02:00", "-120.3"),
            minute_record("2024-10-24T10:02:00+02:00", "\"n/a\"")
        );

        let err = parse_prices_per_minute(&json).unwrap_err();
        assert_eq!(err, FormatError::InvalidNumber("n/a".to_string()));
    }

    #[test]
    fn test_per_minute_without_minute_field() {
        let json = r#"[{"systemImbalance": 1.0}]"#;
        let err = parse_prices_per_minute(json).unwrap_err();
        assert_eq!(err, FormatError::MissingColumn(MINUTE_FIELD.to_string()));
    }
}

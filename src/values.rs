//! Value normalization
//!
//! - Numeric text → `Option<f64>` (empty text and non-finite values are missing)
//! - Forecast sentinel `-50` → missing
//! - Derived imbalance indicators `R3`, `AFRR`, `MFRR` from named channels

use crate::error::FormatError;
use crate::table::TimeSeriesTable;

/// Missing-data marker used by the solar and wind forecast feeds
pub const FORECAST_SENTINEL: f64 = -50.0;

pub const R2_UP: &str = "R2_UP";
pub const R2_DOWN: &str = "R2_DOWN";
pub const R3_STD: &str = "R3_STD";
pub const R3_FLEX: &str = "R3_FLEX";
pub const IGCC_UP: &str = "IGCC_UP";
pub const IGCC_DOWN: &str = "IGCC_DOWN";
pub const BIDS_UP: &str = "BIDS_UP";
pub const BIDS_DOWN: &str = "BIDS_DOWN";

pub const R3: &str = "R3";
pub const AFRR: &str = "AFRR";
pub const MFRR: &str = "MFRR";

/// Channels the imbalance volume feed must carry
pub const IMBALANCE_CHANNELS: [&str; 8] = [
    R2_UP, R2_DOWN, R3_STD, R3_FLEX, IGCC_UP, IGCC_DOWN, BIDS_UP, BIDS_DOWN,
];

/// Parse a numeric text node
///
/// # Examples
///
/// ```
/// # use elia_client::values::parse_measurement;
/// assert_eq!(parse_measurement(Some("123.5")).unwrap(), Some(123.5));
/// assert_eq!(parse_measurement(Some(" -7 ")).unwrap(), Some(-7.0));
/// assert_eq!(parse_measurement(Some("")).unwrap(), None);
/// assert_eq!(parse_measurement(None).unwrap(), None);
/// assert_eq!(parse_measurement(Some("NaN")).unwrap(), None);
/// assert!(parse_measurement(Some("12,5")).is_err());
/// ```
pub fn parse_measurement(text: Option<&str>) -> Result<Option<f64>, FormatError> {
    let trimmed = match text.map(str::trim) {
        None | Some("") => return Ok(None),
        Some(t) => t,
    };

    let value = trimmed
        .parse::<f64>()
        .map_err(|_| FormatError::InvalidNumber(trimmed.to_string()))?;

    Ok(value.is_finite().then_some(value))
}

/// Replace the sentinel with a missing value
///
/// # Examples
///
/// ```
/// # use elia_client::values::{mask_sentinel, FORECAST_SENTINEL};
/// assert_eq!(mask_sentinel(Some(-50.0), FORECAST_SENTINEL), None);
/// assert_eq!(mask_sentinel(Some(-49.9), FORECAST_SENTINEL), Some(-49.9));
/// assert_eq!(mask_sentinel(None, FORECAST_SENTINEL), None);
/// ```
pub fn mask_sentinel(value: Option<f64>, sentinel: f64) -> Option<f64> {
    value.filter(|v| *v != sentinel)
}

/// Parse a forecast value, applying the `-50` sentinel
pub fn parse_forecast_value(text: Option<&str>) -> Result<Option<f64>, FormatError> {
    Ok(mask_sentinel(parse_measurement(text)?, FORECAST_SENTINEL))
}

/// Signed sum of aligned columns; a missing term makes the row missing
fn signed_sum(terms: &[(f64, &[Option<f64>])], len: usize) -> Vec<Option<f64>> {
    (0..len)
        .map(|i| {
            terms.iter().try_fold(0.0, |acc, (sign, column)| {
                column.get(i).copied().flatten().map(|v| acc + sign * v)
            })
        })
        .collect()
}

fn required_column(table: &TimeSeriesTable, name: &str) -> Result<Vec<Option<f64>>, FormatError> {
    table
        .column(name)
        .ok_or_else(|| FormatError::MissingChannel(name.to_string()))
}

/// Add `R3`, `AFRR` and `MFRR` to an imbalance volume table
///
/// - `R3 = R3_FLEX + R3_STD`
/// - `AFRR = R2_UP - R2_DOWN + IGCC_UP - IGCC_DOWN`
/// - `MFRR = BIDS_UP - BIDS_DOWN + R3`
///
/// Every input channel must be present as a column; absent channels are an
/// error rather than zero.
pub fn derive_imbalance_indicators(table: &mut TimeSeriesTable) -> Result<(), FormatError> {
    let len = table.len();

    let r2_up = required_column(table, R2_UP)?;
    let r2_down = required_column(table, R2_DOWN)?;
    let r3_std = required_column(table, R3_STD)?;
    let r3_flex = required_column(table, R3_FLEX)?;
    let igcc_up = required_column(table, IGCC_UP)?;
    let igcc_down = required_column(table, IGCC_DOWN)?;
    let bids_up = required_column(table, BIDS_UP)?;
    let bids_down = required_column(table, BIDS_DOWN)?;

    let r3 = signed_sum(&[(1.0, r3_flex.as_slice()), (1.0, r3_std.as_slice())], len);
    let afrr = signed_sum(
        &[
            (1.0, r2_up.as_slice()),
            (-1.0, r2_down.as_slice()),
            (1.0, igcc_up.as_slice()),
            (-1.0, igcc_down.as_slice()),
        ],
        len,
    );
    let mfrr = signed_sum(
        &[
            (1.0, bids_up.as_slice()),
            (-1.0, bids_down.as_slice()),
            (1.0, r3.as_slice()),
        ],
        len,
    );

    table.set_column(R3, r3)?;
    table.set_column(AFRR, afrr)?;
    table.set_column(MFRR, mfrr)?;
    Ok(())
}

//! Shared cell helpers for the spreadsheet parsers

use calamine::{Data, DataType};
use chrono::NaiveDateTime;

use crate::error::FormatError;
use crate::timestamps::{parse_day_first, parse_iso_naive};
use crate::values::parse_measurement;

/// Header names of a row, trimmed; non-text cells render as text
pub fn header_names(row: &[Data]) -> Vec<String> {
    row.iter()
        .map(|cell| cell_text(cell).unwrap_or_default())
        .collect()
}

/// Helper to get a cell by column name
///
/// # Arguments
///
/// * `row` - Data row
/// * `headers` - Header names, as returned by [`header_names`]
/// * `column` - Column name to look up
///
/// # Returns
///
/// * `Ok(&Data)` - The cell (`Data::Empty` when the row is shorter than the header)
/// * `Err(FormatError::MissingColumn)` - Column not found in the header
///
/// # Example
///
/// ```rust
/// use calamine::Data;
/// use elia_client::sheet_utils::get_cell;
///
/// let headers = vec!["Date".to_string(), "Quarter".to_string(), "NRV".to_string()];
/// let row = vec![
///     Data::String("27/10/2024".to_string()),
///     Data::String("00:00 - 00:15".to_string()),
///     Data::Float(-12.5),
/// ];
///
/// assert_eq!(get_cell(&row, &headers, "NRV").unwrap(), &Data::Float(-12.5));
/// assert!(get_cell(&row, &headers, "SI").is_err());
/// ```
pub fn get_cell<'a>(row: &'a [Data], headers: &[String], column: &str) -> Result<&'a Data, FormatError> {
    let idx = headers
        .iter()
        .position(|h| h == column)
        .ok_or_else(|| FormatError::MissingColumn(column.to_string()))?;

    Ok(row.get(idx).unwrap_or(&Data::Empty))
}

/// Text rendering of a cell; `None` for empty and error cells
pub fn cell_text(cell: &Data) -> Option<String> {
    match cell {
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Data::Float(f) => Some(f.to_string()),
        Data::Int(i) => Some(i.to_string()),
        Data::Bool(b) => Some(b.to_string()),
        Data::DateTime(_) => cell
            .as_datetime()
            .map(|dt| dt.format("%d/%m/%Y %H:%M:%S").to_string()),
        Data::Error(_) | Data::Empty => None,
    }
}

/// Numeric value of a cell
///
/// Numbers pass through, empty cells are missing, text goes through
/// [`parse_measurement`].
pub fn cell_number(cell: &Data) -> Result<Option<f64>, FormatError> {
    match cell {
        Data::Float(f) => Ok(f.is_finite().then_some(*f)),
        Data::Int(i) => Ok(Some(*i as f64)),
        Data::Empty => Ok(None),
        Data::String(s) => parse_measurement(Some(s.as_str())),
        other => Err(FormatError::InvalidNumber(format!("{:?}", other))),
    }
}

/// True for a filled cell that can never be read as a number
pub fn is_textual(cell: &Data) -> bool {
    matches!(cell, Data::String(s) if parse_measurement(Some(s.as_str())).is_err())
        || matches!(cell, Data::DateTime(_) | Data::DateTimeIso(_) | Data::Bool(_))
}

/// Local date-time of a cell: a spreadsheet date, ISO text or day-first text
pub fn cell_datetime(cell: &Data) -> Result<NaiveDateTime, FormatError> {
    match cell {
        Data::DateTime(_) => cell
            .as_datetime()
            .ok_or_else(|| FormatError::InvalidTimestamp(format!("{:?}", cell))),
        Data::DateTimeIso(s) => parse_iso_naive(s),
        Data::String(s) => parse_day_first(s),
        other => Err(FormatError::InvalidTimestamp(format!("{:?}", other))),
    }
}

/// Day-first date text of a cell, for combining with a quarter label
pub fn cell_date_text(cell: &Data) -> Result<String, FormatError> {
    match cell {
        Data::DateTime(_) => cell
            .as_date()
            .map(|d| d.format("%d/%m/%Y").to_string())
            .ok_or_else(|| FormatError::InvalidTimestamp(format!("{:?}", cell))),
        other => cell_text(other).ok_or_else(|| FormatError::InvalidTimestamp("empty date cell".to_string())),
    }
}

/// True when every cell of the row is empty
pub fn is_blank_row(row: &[Data]) -> bool {
    row.iter().all(|cell| matches!(cell, Data::Empty))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_get_cell_short_row_is_empty() {
        let headers = vec!["a".to_string(), "b".to_string()];
        let row = vec![Data::Int(1)];
        assert_eq!(get_cell(&row, &headers, "b").unwrap(), &Data::Empty);
    }

    #[test]
    fn test_cell_number_variants() {
        assert_eq!(cell_number(&Data::Float(1.5)).unwrap(), Some(1.5));
        assert_eq!(cell_number(&Data::Int(-3)).unwrap(), Some(-3.0));
        assert_eq!(cell_number(&Data::Empty).unwrap(), None);
        assert_eq!(cell_number(&Data::String("42.1".to_string())).unwrap(), Some(42.1));
        assert!(cell_number(&Data::String("n/a".to_string())).is_err());
    }

    #[test]
    fn test_is_textual() {
        assert!(is_textual(&Data::String("00:00 - 00:15".to_string())));
        assert!(!is_textual(&Data::String("12".to_string())));
        assert!(!is_textual(&Data::Float(12.0)));
        assert!(!is_textual(&Data::Empty));
    }

    #[test]
    fn test_cell_datetime_from_text() {
        let dt = cell_datetime(&Data::String("24/10/2024 13:45".to_string())).unwrap();
        assert_eq!(
            dt,
            NaiveDate::from_ymd_opt(2024, 10, 24)
                .unwrap()
                .and_hms_opt(13, 45, 0)
                .unwrap()
        );
    }

    #[test]
    fn test_cell_datetime_rejects_number() {
        assert!(cell_datetime(&Data::Float(45000.5)).is_err());
    }

    #[test]
    fn test_header_names_trim() {
        let row = vec![Data::String(" DateTime ".to_string()), Data::Empty];
        assert_eq!(header_names(&row), vec!["DateTime".to_string(), String::new()]);
    }
}

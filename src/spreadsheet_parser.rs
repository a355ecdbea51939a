//! Spreadsheet payload parser
//!
//! Reads the first worksheet of an `.xlsx` workbook and builds a
//! [`ParsedRecordSet`] indexed by local wall-clock time.
//!
//! | Dataset | Header row | Timestamp |
//! |---------|------------|-----------|
//! | forecast-load | 0 | `DateTime` column, day-first |
//! | imbalance-price-per-quarter-excel | 1 | `Date` + first 5 chars of `Quarter`, day-first |
//!
//! Every other column is kept under its header. A column whose filled cells
//! are all text is dropped with a warning; text among numbers is an error.

use std::io::Cursor;

use calamine::{Data, Reader, Xlsx};
use chrono::NaiveDateTime;
use tracing::{debug, warn};

use crate::error::FormatError;
use crate::sheet_utils::{
    cell_date_text, cell_datetime, cell_number, cell_text, get_cell, header_names, is_blank_row,
    is_textual,
};
use crate::timestamps::parse_date_and_quarter;
use crate::types::{Column, ParsedRecordSet, RawTimestamps};

pub const LOAD_DATETIME_COLUMN: &str = "DateTime";
pub const EXCEL_DATE_COLUMN: &str = "Date";
pub const EXCEL_QUARTER_COLUMN: &str = "Quarter";

const LOAD_HEADER_ROW: usize = 0;
const PRICE_HEADER_ROW: usize = 1;

/// Where the row timestamp comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampSource {
    /// One column holding a full local date-time
    Column(&'static str),
    /// A date column plus a quarter label column (`"HH:MM - HH:MM"`)
    DateAndQuarter {
        date: &'static str,
        quarter: &'static str,
    },
}

impl TimestampSource {
    fn columns(&self) -> Vec<&'static str> {
        match self {
            TimestampSource::Column(name) => vec![*name],
            TimestampSource::DateAndQuarter { date, quarter } => vec![*date, *quarter],
        }
    }

    fn read(&self, row: &[Data], headers: &[String]) -> Result<NaiveDateTime, FormatError> {
        match self {
            TimestampSource::Column(name) => cell_datetime(get_cell(row, headers, name)?),
            TimestampSource::DateAndQuarter { date, quarter } => {
                let date = cell_date_text(get_cell(row, headers, date)?)?;
                let quarter = cell_text(get_cell(row, headers, quarter)?).ok_or_else(|| {
                    FormatError::InvalidTimestamp(format!("empty {} cell", quarter))
                })?;
                parse_date_and_quarter(&date, &quarter)
            }
        }
    }
}

/// Rows of the first worksheet of an `.xlsx` workbook
pub fn read_first_sheet(bytes: &[u8]) -> Result<Vec<Vec<Data>>, FormatError> {
    let cursor = Cursor::new(bytes);
    let mut workbook: Xlsx<_> = Xlsx::new(cursor)
        .map_err(|e| FormatError::Spreadsheet(format!("Failed to open workbook: {}", e)))?;

    let sheet_names = workbook.sheet_names().to_vec();
    let first = sheet_names
        .first()
        .ok_or_else(|| FormatError::Spreadsheet("No sheets found in workbook".to_string()))?;

    let range = workbook
        .worksheet_range(first)
        .map_err(|e| FormatError::Spreadsheet(format!("Failed to read worksheet {}: {}", first, e)))?;

    Ok(range.rows().map(|row| row.to_vec()).collect())
}

/// Build a record set from sheet rows
///
/// # Arguments
///
/// * `rows` - All rows of the sheet, header included
/// * `header_row` - Zero-based index of the header row; rows above it are ignored
/// * `source` - How to derive the row timestamp
///
/// # Returns
///
/// * `Ok(ParsedRecordSet)` - Local timestamps plus every numeric column
/// * `Err(FormatError)` - Missing header or timestamp column, bad timestamp or number, no data rows
pub fn parse_sheet_rows(
    rows: &[Vec<Data>],
    header_row: usize,
    source: TimestampSource,
) -> Result<ParsedRecordSet, FormatError> {
    let headers = rows
        .get(header_row)
        .map(|row| header_names(row))
        .ok_or_else(|| FormatError::Spreadsheet(format!("No header at row {}", header_row)))?;

    for name in source.columns() {
        if !headers.iter().any(|h| h == name) {
            return Err(FormatError::MissingColumn(name.to_string()));
        }
    }

    let data: Vec<&Vec<Data>> = rows[header_row + 1..]
        .iter()
        .filter(|row| !is_blank_row(row))
        .collect();

    if data.is_empty() {
        return Err(FormatError::Spreadsheet("No data rows".to_string()));
    }

    let timestamps = data
        .iter()
        .map(|row| source.read(row, &headers))
        .collect::<Result<Vec<_>, _>>()?;

    let index_columns = source.columns();
    let mut columns: Vec<Column> = Vec::new();

    for (idx, name) in headers.iter().enumerate() {
        if index_columns.iter().any(|c| name.as_str() == *c) {
            continue;
        }
        if name.is_empty() {
            warn!("Dropping spreadsheet column {} without header", idx);
            continue;
        }

        let cells: Vec<&Data> = data
            .iter()
            .map(|row| row.get(idx).unwrap_or(&Data::Empty))
            .collect();

        let mut present = cells.iter().filter(|c| cell_text(c).is_some()).peekable();
        if present.peek().is_some() && present.all(|c| is_textual(c)) {
            warn!("Dropping non-numeric spreadsheet column {}", name);
            continue;
        }

        let values = cells
            .into_iter()
            .map(cell_number)
            .collect::<Result<Vec<_>, _>>()?;
        columns.push((name.clone(), values));
    }

    debug!(
        "Parsed {} spreadsheet rows with {} numeric columns",
        timestamps.len(),
        columns.len()
    );
    ParsedRecordSet::new(RawTimestamps::Local(timestamps), columns)
}

/// Parse the load forecast workbook
pub fn parse_load_forecast(bytes: &[u8]) -> Result<ParsedRecordSet, FormatError> {
    let rows = read_first_sheet(bytes)?;
    parse_sheet_rows(
        &rows,
        LOAD_HEADER_ROW,
        TimestampSource::Column(LOAD_DATETIME_COLUMN),
    )
}

/// Parse one day of the per-quarter imbalance price workbook
pub fn parse_imbalance_prices_excel(bytes: &[u8]) -> Result<ParsedRecordSet, FormatError> {
    let rows = read_first_sheet(bytes)?;
    parse_sheet_rows(
        &rows,
        PRICE_HEADER_ROW,
        TimestampSource::DateAndQuarter {
            date: EXCEL_DATE_COLUMN,
            quarter: EXCEL_QUARTER_COLUMN,
        },
    )
}

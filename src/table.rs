//! Canonical time series table
//!
//! One row per distinct UTC instant, rows kept in ascending timestamp order,
//! each row holding one optional numeric cell per named column.
//!
//! # Duplicate timestamps
//!
//! Blocks fetched for overlapping windows may carry the same instant. When
//! rows collide:
//! - cells that are equal (or missing on either side) are merged silently
//! - cells with two different present values fail with
//!   [`FormatError::ConflictingDuplicate`]
//!
//! # Example
//!
//! ```rust
//! use chrono::{TimeZone, Utc};
//! use elia_client::table::TimeSeriesTable;
//!
//! let t0 = Utc.with_ymd_and_hms(2024, 10, 24, 23, 45, 0).unwrap();
//! let t1 = Utc.with_ymd_and_hms(2024, 10, 25, 0, 0, 0).unwrap();
//!
//! let day1 = TimeSeriesTable::from_columns(
//!     vec![t0, t1],
//!     vec![("NRV".to_string(), vec![Some(10.0), Some(12.0)])],
//! )
//! .unwrap();
//! let day2 = TimeSeriesTable::from_columns(
//!     vec![t1],
//!     vec![("NRV".to_string(), vec![Some(12.0)])],
//! )
//! .unwrap();
//!
//! let merged = TimeSeriesTable::concat(vec![day1, day2]).unwrap();
//! assert_eq!(merged.len(), 2); // shared midnight row kept once
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::FormatError;
use crate::types::Column;

/// Header of the timestamp column in CSV output
pub const TIMESTAMP_COLUMN: &str = "timestamp_utc";

/// Time-indexed table of numeric columns
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeSeriesTable {
    columns: Vec<String>,
    rows: BTreeMap<DateTime<Utc>, Vec<Option<f64>>>,
}

fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn merge_cell(
    existing: &mut Option<f64>,
    incoming: Option<f64>,
    ts: &DateTime<Utc>,
    column: &str,
) -> Result<(), FormatError> {
    match (*existing, incoming) {
        (Some(a), Some(b)) if a != b => Err(FormatError::ConflictingDuplicate {
            timestamp: format_ts(ts),
            column: column.to_string(),
        }),
        (None, Some(b)) => {
            *existing = Some(b);
            Ok(())
        }
        _ => Ok(()),
    }
}

impl TimeSeriesTable {
    /// Empty table with the given columns
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: BTreeMap::new(),
        }
    }

    /// Build a table from a timestamp index and aligned columns
    ///
    /// Fails if any column length differs from the index, or if a repeated
    /// timestamp within the block carries conflicting values.
    pub fn from_columns(
        index: Vec<DateTime<Utc>>,
        columns: Vec<Column>,
    ) -> Result<Self, FormatError> {
        for (name, values) in &columns {
            if values.len() != index.len() {
                return Err(FormatError::LengthMismatch {
                    field: name.clone(),
                    expected: index.len(),
                    actual: values.len(),
                });
            }
        }

        let names: Vec<String> = columns.iter().map(|(name, _)| name.clone()).collect();
        let mut table = Self::new(names);

        for (i, ts) in index.into_iter().enumerate() {
            let row = columns.iter().map(|(_, values)| values[i]).collect();
            table.insert_row(ts, row)?;
        }

        Ok(table)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Timestamps in ascending order
    pub fn timestamps(&self) -> impl Iterator<Item = &DateTime<Utc>> + '_ {
        self.rows.keys()
    }

    /// Rows in ascending timestamp order
    pub fn rows(&self) -> impl Iterator<Item = (&DateTime<Utc>, &[Option<f64>])> + '_ {
        self.rows.iter().map(|(ts, row)| (ts, row.as_slice()))
    }

    /// Values of one column in timestamp order
    pub fn column(&self, name: &str) -> Option<Vec<Option<f64>>> {
        let idx = self.column_index(name)?;
        Some(self.rows.values().map(|row| row[idx]).collect())
    }

    /// Single cell; `None` when the row, the column or the value is missing
    pub fn value(&self, ts: &DateTime<Utc>, column: &str) -> Option<f64> {
        let idx = self.column_index(column)?;
        self.rows.get(ts).and_then(|row| row[idx])
    }

    /// Append a column, creating it (missing for existing rows) if needed
    fn ensure_column(&mut self, name: &str) -> usize {
        if let Some(idx) = self.column_index(name) {
            return idx;
        }
        self.columns.push(name.to_string());
        for row in self.rows.values_mut() {
            row.push(None);
        }
        self.columns.len() - 1
    }

    /// Insert one row, merging with an existing row at the same timestamp
    pub fn insert_row(
        &mut self,
        ts: DateTime<Utc>,
        values: Vec<Option<f64>>,
    ) -> Result<(), FormatError> {
        if values.len() != self.columns.len() {
            return Err(FormatError::LengthMismatch {
                field: format!("row {}", format_ts(&ts)),
                expected: self.columns.len(),
                actual: values.len(),
            });
        }

        match self.rows.get_mut(&ts) {
            Some(existing) => {
                for (idx, incoming) in values.into_iter().enumerate() {
                    merge_cell(&mut existing[idx], incoming, &ts, &self.columns[idx])?;
                }
            }
            None => {
                self.rows.insert(ts, values);
            }
        }
        Ok(())
    }

    /// Set one cell, creating the row and the column as needed
    ///
    /// Used to pivot long-format records into wide columns.
    pub fn set_cell(
        &mut self,
        ts: DateTime<Utc>,
        column: &str,
        value: Option<f64>,
    ) -> Result<(), FormatError> {
        let idx = self.ensure_column(column);
        let width = self.columns.len();
        let row = self.rows.entry(ts).or_insert_with(|| vec![None; width]);
        merge_cell(&mut row[idx], value, &ts, column)
    }

    /// Replace or add a whole column, aligned to the current row order
    pub fn set_column(&mut self, name: &str, values: Vec<Option<f64>>) -> Result<(), FormatError> {
        if values.len() != self.rows.len() {
            return Err(FormatError::LengthMismatch {
                field: name.to_string(),
                expected: self.rows.len(),
                actual: values.len(),
            });
        }

        let idx = self.ensure_column(name);
        for (row, value) in self.rows.values_mut().zip(values) {
            row[idx] = value;
        }
        Ok(())
    }

    /// Split into the timestamp index and its aligned columns
    pub fn into_columns(self) -> (Vec<DateTime<Utc>>, Vec<Column>) {
        let index: Vec<DateTime<Utc>> = self.rows.keys().cloned().collect();
        let columns = self
            .columns
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.clone(), self.rows.values().map(|row| row[idx]).collect()))
            .collect();
        (index, columns)
    }

    /// Project onto a subset of columns, in the given order
    pub fn select(&self, names: &[&str]) -> Result<Self, FormatError> {
        let indices = names
            .iter()
            .map(|name| {
                self.column_index(name)
                    .ok_or_else(|| FormatError::MissingColumn(name.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let rows = self
            .rows
            .iter()
            .map(|(ts, row)| (*ts, indices.iter().map(|&i| row[i]).collect()))
            .collect();

        Ok(Self {
            columns: names.iter().map(|n| n.to_string()).collect(),
            rows,
        })
    }

    /// Merge another block into this one
    ///
    /// Columns are unioned; duplicate timestamps follow the module-level policy.
    pub fn merge(&mut self, other: TimeSeriesTable) -> Result<(), FormatError> {
        let mapping: Vec<usize> = other
            .columns
            .iter()
            .map(|name| self.ensure_column(name))
            .collect();
        let width = self.columns.len();

        for (ts, values) in other.rows {
            let row = self.rows.entry(ts).or_insert_with(|| vec![None; width]);
            for (src, incoming) in values.into_iter().enumerate() {
                let dst = mapping[src];
                merge_cell(&mut row[dst], incoming, &ts, &self.columns[dst])?;
            }
        }
        Ok(())
    }

    /// Concatenate blocks (e.g. one per fetched day) into one table
    pub fn concat(blocks: Vec<TimeSeriesTable>) -> Result<Self, FormatError> {
        let mut iter = blocks.into_iter();
        let mut table = iter.next().unwrap_or_default();
        for block in iter {
            table.merge(block)?;
        }
        Ok(table)
    }

    /// Serialize as CSV: timestamp column first, missing cells empty
    pub fn to_csv(&self) -> Result<String, FormatError> {
        let mut writer = csv::Writer::from_writer(Vec::new());

        let mut header = vec![TIMESTAMP_COLUMN.to_string()];
        header.extend(self.columns.iter().cloned());
        writer
            .write_record(&header)
            .map_err(|e| FormatError::Csv(e.to_string()))?;

        for (ts, row) in &self.rows {
            let mut record = vec![format_ts(ts)];
            record.extend(row.iter().map(|v| v.map(|x| x.to_string()).unwrap_or_default()));
            writer
                .write_record(&record)
                .map_err(|e| FormatError::Csv(e.to_string()))?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| FormatError::Csv(e.to_string()))?;
        String::from_utf8(bytes).map_err(|e| FormatError::Csv(e.to_string()))
    }

    /// Parse CSV written by [`TimeSeriesTable::to_csv`]
    pub fn from_csv(text: &str) -> Result<Self, FormatError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(text.as_bytes());

        let headers = reader
            .headers()
            .map_err(|e| FormatError::Csv(format!("Failed to read CSV headers: {}", e)))?
            .clone();

        if headers.get(0) != Some(TIMESTAMP_COLUMN) {
            return Err(FormatError::MissingColumn(TIMESTAMP_COLUMN.to_string()));
        }

        let mut table = Self::new(headers.iter().skip(1).map(str::to_string).collect());

        for result in reader.records() {
            let record = result.map_err(|e| FormatError::Csv(format!("CSV parse error: {}", e)))?;

            let raw_ts = record.get(0).unwrap_or_default();
            let ts = DateTime::parse_from_rfc3339(raw_ts)
                .map_err(|_| FormatError::InvalidTimestamp(raw_ts.to_string()))?
                .with_timezone(&Utc);

            let values = record
                .iter()
                .skip(1)
                .map(|cell| crate::values::parse_measurement(Some(cell)))
                .collect::<Result<Vec<_>, _>>()?;

            table.insert_row(ts, values)?;
        }

        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 10, 26, h, m, 0).unwrap()
    }

    fn block(index: Vec<DateTime<Utc>>, nrv: Vec<Option<f64>>) -> TimeSeriesTable {
        TimeSeriesTable::from_columns(index, vec![("NRV".to_string(), nrv)]).unwrap()
    }

    #[test]
    fn test_rows_sorted_by_timestamp() {
        let table = block(vec![ts(1, 0), ts(0, 0), ts(0, 30)], vec![Some(3.0), Some(1.0), Some(2.0)]);

        let order: Vec<_> = table.timestamps().cloned().collect();
        assert_eq!(order, vec![ts(0, 0), ts(0, 30), ts(1, 0)]);
        assert_eq!(table.column("NRV").unwrap(), vec![Some(1.0), Some(2.0), Some(3.0)]);
    }

    #[test]
    fn test_from_columns_length_mismatch() {
        let result = TimeSeriesTable::from_columns(
            vec![ts(0, 0), ts(0, 15)],
            vec![("NRV".to_string(), vec![Some(1.0)])],
        );
        assert!(matches!(result, Err(FormatError::LengthMismatch { .. })));
    }

    #[test]
    fn test_merge_overlapping_midnight_keeps_single_row() {
        let day1 = block(vec![ts(23, 45), ts(0, 0)], vec![Some(5.0), Some(6.0)]);
        let day2 = block(vec![ts(0, 0), ts(0, 15)], vec![Some(6.0), Some(7.0)]);

        let merged = TimeSeriesTable::concat(vec![day1, day2]).unwrap();

        assert_eq!(merged.len(), 3);
        assert_eq!(merged.value(&ts(0, 0), "NRV"), Some(6.0));
    }

    #[test]
    fn test_merge_conflicting_values_is_error() {
        let mut day1 = block(vec![ts(0, 0)], vec![Some(6.0)]);
        let day2 = block(vec![ts(0, 0)], vec![Some(6.5)]);

        let err = day1.merge(day2).unwrap_err();
        assert_eq!(
            err,
            FormatError::ConflictingDuplicate {
                timestamp: "2024-10-26T00:00:00Z".to_string(),
                column: "NRV".to_string(),
            }
        );
    }

    #[test]
    fn test_merge_fills_missing_cell() {
        let mut day1 = block(vec![ts(0, 0)], vec![None]);
        let day2 = block(vec![ts(0, 0)], vec![Some(4.0)]);

        day1.merge(day2).unwrap();
        assert_eq!(day1.value(&ts(0, 0), "NRV"), Some(4.0));
    }

    #[test]
    fn test_merge_unions_columns() {
        let mut left = block(vec![ts(0, 0)], vec![Some(1.0)]);
        let right = TimeSeriesTable::from_columns(
            vec![ts(0, 15)],
            vec![("SI".to_string(), vec![Some(-20.0)])],
        )
        .unwrap();

        left.merge(right).unwrap();

        assert_eq!(left.columns(), &["NRV".to_string(), "SI".to_string()]);
        assert_eq!(left.column("NRV").unwrap(), vec![Some(1.0), None]);
        assert_eq!(left.column("SI").unwrap(), vec![None, Some(-20.0)]);
    }

    #[test]
    fn test_set_cell_pivots_long_records() {
        let mut table = TimeSeriesTable::default();
        table.set_cell(ts(0, 1), "B", Some(2.0)).unwrap();
        table.set_cell(ts(0, 0), "A", Some(1.0)).unwrap();
        table.set_cell(ts(0, 1), "A", Some(3.0)).unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(table.column("A").unwrap(), vec![Some(1.0), Some(3.0)]);
        assert_eq!(table.column("B").unwrap(), vec![None, Some(2.0)]);
    }

    #[test]
    fn test_select_missing_column() {
        let table = block(vec![ts(0, 0)], vec![Some(1.0)]);
        assert_eq!(
            table.select(&["SI"]).unwrap_err(),
            FormatError::MissingColumn("SI".to_string())
        );
    }

    #[test]
    fn test_csv_keeps_sub_second_timestamps() {
        let base = ts(0, 0);
        let table = block(
            vec![base, base + chrono::Duration::milliseconds(250)],
            vec![Some(1.0), Some(2.0)],
        );

        let csv = table.to_csv().unwrap();
        assert!(csv.contains("2024-10-26T00:00:00Z,1\n"));
        assert!(csv.contains("2024-10-26T00:00:00.250Z,2\n"));

        let parsed = TimeSeriesTable::from_csv(&csv).unwrap();
        assert_eq!(parsed, table);
    }

    #[test]
    fn test_csv_round_trip_preserves_rows_and_timestamps() {
        let table = TimeSeriesTable::from_columns(
            vec![ts(0, 0), ts(0, 15), ts(0, 30)],
            vec![
                ("most_recent".to_string(), vec![Some(0.1), None, Some(1234.567)]),
                ("day_ahead".to_string(), vec![Some(-3.0), Some(2.0), None]),
            ],
        )
        .unwrap();

        let csv = table.to_csv().unwrap();
        assert!(csv.starts_with("timestamp_utc,most_recent,day_ahead\n"));

        let parsed = TimeSeriesTable::from_csv(&csv).unwrap();
        assert_eq!(parsed.len(), table.len());
        assert!(parsed.timestamps().eq(table.timestamps()));
        assert_eq!(parsed, table);
    }

    #[test]
    fn test_concat_empty() {
        let table = TimeSeriesTable::concat(Vec::new()).unwrap();
        assert!(table.is_empty());
    }
}

//! Data model for Elia publication requests and intermediate parse results
//!
//! A [`DatasetRequest`] is created by the caller, each fetch produces a
//! [`RawPayload`], the matching parser turns it into a [`ParsedRecordSet`]
//! and the normalizers assemble the final
//! [`TimeSeriesTable`](crate::table::TimeSeriesTable).

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::error::{EliaError, FormatError};

/// Wire format served by a publication endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    Xml,
    Spreadsheet,
    Json,
}

/// Text encoding used to decode a response body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Utf8,
    /// ISO-8859-1, declared by the XML publication services
    Latin1,
}

impl TextEncoding {
    /// Decode raw body bytes
    ///
    /// # Examples
    ///
    /// ```
    /// # use elia_client::types::TextEncoding;
    /// assert_eq!(TextEncoding::Latin1.decode(&[0x42, 0xE9]).unwrap(), "Bé");
    /// assert!(TextEncoding::Utf8.decode(&[0xFF]).is_err());
    /// ```
    pub fn decode(&self, bytes: &[u8]) -> Result<String, FormatError> {
        match self {
            TextEncoding::Utf8 => String::from_utf8(bytes.to_vec())
                .map_err(|e| FormatError::Encoding(format!("invalid UTF-8: {}", e))),
            // Every Latin-1 byte is the Unicode scalar with the same value
            TextEncoding::Latin1 => Ok(bytes.iter().map(|&b| char::from(b)).collect()),
        }
    }
}

/// How a dataset's date window is split into fetches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchGranularity {
    /// One fetch covers the whole `[start, end]` range
    WholeRange,
    /// One fetch per calendar day, `start..=end`
    PerDay,
    /// Endpoint only serves the latest published hour
    Latest,
}

/// Logical dataset published by Elia
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatasetKind {
    SolarForecast,
    WindForecast,
    LoadForecast,
    ImbalanceVolume,
    ImbalancePricePerQuarter,
    ImbalancePricePerQuarterExcel,
    ImbalancePricePerMinute,
}

impl DatasetKind {
    pub const ALL: [DatasetKind; 7] = [
        DatasetKind::SolarForecast,
        DatasetKind::WindForecast,
        DatasetKind::LoadForecast,
        DatasetKind::ImbalanceVolume,
        DatasetKind::ImbalancePricePerQuarter,
        DatasetKind::ImbalancePricePerQuarterExcel,
        DatasetKind::ImbalancePricePerMinute,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            DatasetKind::SolarForecast => "forecast-solar",
            DatasetKind::WindForecast => "forecast-wind",
            DatasetKind::LoadForecast => "forecast-load",
            DatasetKind::ImbalanceVolume => "imbalance-volume",
            DatasetKind::ImbalancePricePerQuarter => "imbalance-price-per-quarter",
            DatasetKind::ImbalancePricePerQuarterExcel => "imbalance-price-per-quarter-excel",
            DatasetKind::ImbalancePricePerMinute => "imbalance-price-per-minute",
        }
    }

    pub fn wire_format(&self) -> WireFormat {
        match self {
            DatasetKind::SolarForecast
            | DatasetKind::WindForecast
            | DatasetKind::ImbalancePricePerQuarter => WireFormat::Xml,
            DatasetKind::LoadForecast | DatasetKind::ImbalancePricePerQuarterExcel => {
                WireFormat::Spreadsheet
            }
            DatasetKind::ImbalanceVolume | DatasetKind::ImbalancePricePerMinute => WireFormat::Json,
        }
    }

    pub fn encoding(&self) -> TextEncoding {
        match self {
            DatasetKind::ImbalanceVolume => TextEncoding::Utf8,
            _ => TextEncoding::Latin1,
        }
    }

    pub fn granularity(&self) -> FetchGranularity {
        match self {
            DatasetKind::SolarForecast | DatasetKind::WindForecast | DatasetKind::LoadForecast => {
                FetchGranularity::WholeRange
            }
            DatasetKind::ImbalancePricePerQuarter | DatasetKind::ImbalancePricePerQuarterExcel => {
                FetchGranularity::PerDay
            }
            DatasetKind::ImbalanceVolume | DatasetKind::ImbalancePricePerMinute => {
                FetchGranularity::Latest
            }
        }
    }
}

/// Date window of a request or of a single fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateWindow {
    /// Inclusive calendar date range
    Range { start: NaiveDate, end: NaiveDate },
    /// Single calendar date
    Day(NaiveDate),
    /// Latest published data, no date parameter
    Latest,
}

/// Caller-created request for one dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatasetRequest {
    kind: DatasetKind,
    window: DateWindow,
}

impl DatasetRequest {
    /// Validate and build a request
    ///
    /// Ranged datasets need `start <= end` (a `Day` is accepted as a one-day
    /// range); latest-only datasets take no date at all.
    ///
    /// # Examples
    ///
    /// ```
    /// # use chrono::NaiveDate;
    /// # use elia_client::types::{DatasetKind, DatasetRequest, DateWindow};
    /// let d = |day| NaiveDate::from_ymd_opt(2024, 10, day).unwrap();
    ///
    /// assert!(DatasetRequest::new(
    ///     DatasetKind::WindForecast,
    ///     DateWindow::Range { start: d(24), end: d(25) },
    /// )
    /// .is_ok());
    ///
    /// // start after end
    /// assert!(DatasetRequest::new(
    ///     DatasetKind::WindForecast,
    ///     DateWindow::Range { start: d(25), end: d(24) },
    /// )
    /// .is_err());
    ///
    /// // latest-only endpoint given a date
    /// assert!(DatasetRequest::new(DatasetKind::ImbalanceVolume, DateWindow::Day(d(24))).is_err());
    /// ```
    pub fn new(kind: DatasetKind, window: DateWindow) -> Result<Self, EliaError> {
        let window = match (kind.granularity(), window) {
            (FetchGranularity::Latest, DateWindow::Latest) => DateWindow::Latest,
            (FetchGranularity::Latest, _) => {
                return Err(EliaError::InvalidRequest(format!(
                    "{} only serves the latest hour and takes no date",
                    kind.name()
                )));
            }
            (_, DateWindow::Latest) => {
                return Err(EliaError::InvalidRequest(format!(
                    "{} requires a date range",
                    kind.name()
                )));
            }
            (_, DateWindow::Day(day)) => DateWindow::Range {
                start: day,
                end: day,
            },
            (_, DateWindow::Range { start, end }) => {
                if start > end {
                    return Err(EliaError::InvalidRequest(format!(
                        "start ({}) must be <= end ({})",
                        start, end
                    )));
                }
                DateWindow::Range { start, end }
            }
        };

        Ok(Self { kind, window })
    }

    pub fn kind(&self) -> DatasetKind {
        self.kind
    }

    pub fn window(&self) -> DateWindow {
        self.window
    }
}

/// Response body of one fetch, discarded after parsing
#[derive(Debug, Clone, PartialEq)]
pub struct RawPayload {
    pub bytes: Vec<u8>,
    pub encoding: TextEncoding,
    pub format: WireFormat,
}

impl RawPayload {
    pub fn new(bytes: Vec<u8>, encoding: TextEncoding, format: WireFormat) -> Self {
        Self {
            bytes,
            encoding,
            format,
        }
    }

    /// Decoded body text; empty bodies are a format error
    pub fn text(&self) -> Result<String, FormatError> {
        if self.bytes.is_empty() {
            return Err(FormatError::EmptyResponse);
        }
        self.encoding.decode(&self.bytes)
    }
}

/// Raw timestamp index extracted by a parser
#[derive(Debug, Clone, PartialEq)]
pub enum RawTimestamps {
    /// Already resolved instants (explicit offset or epoch encoded)
    Instants(Vec<DateTime<Utc>>),
    /// Wall-clock times in the source region, not yet localized
    Local(Vec<NaiveDateTime>),
}

impl RawTimestamps {
    pub fn len(&self) -> usize {
        match self {
            RawTimestamps::Instants(v) => v.len(),
            RawTimestamps::Local(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One named numeric column of a parsed payload
pub type Column = (String, Vec<Option<f64>>);

/// Ephemeral output of a format parser
///
/// Every column has exactly one entry per timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRecordSet {
    timestamps: RawTimestamps,
    columns: Vec<Column>,
}

impl ParsedRecordSet {
    /// Build a record set, failing on any column whose length differs from the index
    pub fn new(timestamps: RawTimestamps, columns: Vec<Column>) -> Result<Self, FormatError> {
        let expected = timestamps.len();
        for (name, values) in &columns {
            if values.len() != expected {
                return Err(FormatError::LengthMismatch {
                    field: name.clone(),
                    expected,
                    actual: values.len(),
                });
            }
        }

        Ok(Self {
            timestamps,
            columns,
        })
    }

    pub fn timestamps(&self) -> &RawTimestamps {
        &self.timestamps
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn into_parts(self) -> (RawTimestamps, Vec<Column>) {
        (self.timestamps, self.columns)
    }
}

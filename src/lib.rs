//! Elia Client - grid data from the Elia publication services
//!
//! Retrieves Belgian transmission grid publications (solar, wind and load
//! forecasts, imbalance volumes and imbalance prices) and normalizes XML,
//! spreadsheet and JSON responses into one [`TimeSeriesTable`] keyed by UTC
//! instant.
//!
//! # Features
//! - Endpoint catalog with per-range, per-day and latest-hour routing
//! - Namespaced XML extraction, spreadsheet header offsets, decorated-epoch JSON
//! - Localization of wall-clock timestamps with DST inference
//! - Sentinel masking and derived imbalance indicators (R3, aFRR, mFRR)
//! - Deterministic merge of day blocks (duplicate rows collapse, conflicts fail)
//!
//! # Pipeline
//!
//! ```text
//! DatasetRequest → catalog::route_request → Fetch → RawPayload
//!     → {xml,spreadsheet,json}_parser → ParsedRecordSet
//!     → timestamps::normalize → TimeSeriesTable (per block) → merge
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use chrono::NaiveDate;
//! use elia_client::{ClientConfig, EliaClient};
//!
//! let client = EliaClient::new(ClientConfig::default()).unwrap();
//! let day = NaiveDate::from_ymd_opt(2024, 10, 24).unwrap();
//!
//! let wind = client.forecast_wind(day, day).unwrap();
//! println!("{}", wind.to_csv().unwrap());
//! ```

pub mod catalog;
pub mod error;
pub mod fetcher;
pub mod json_parser;
pub mod sheet_utils;
pub mod spreadsheet_parser;
pub mod table;
pub mod timestamps;
pub mod types;
pub mod values;
pub mod xml_parser;

// Re-export public types for easier access
pub use catalog::{QueryPlan, DEFAULT_BASE_URL};
pub use error::{AmbiguousTimeError, EliaError, FormatError, NetworkError};
pub use fetcher::{Fetch, HttpFetcher};
pub use table::TimeSeriesTable;
pub use types::{DatasetKind, DatasetRequest, DateWindow, RawPayload, WireFormat};

use std::time::Duration;

use chrono::NaiveDate;
use chrono_tz::Tz;
use tracing::{debug, info};

use crate::types::ParsedRecordSet;

/// Default per-fetch timeout
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Civil timezone of the naive timestamps in the publications
pub const SOURCE_TIMEZONE: Tz = chrono_tz::Europe::Brussels;

pub const ENV_BASE_URL: &str = "ELIA_BASE_URL";
pub const ENV_TIMEOUT_SECS: &str = "ELIA_TIMEOUT_SECS";
pub const ENV_USER_AGENT: &str = "ELIA_USER_AGENT";

// ============================================================================
// Configuration
// ============================================================================

/// Client configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Publication services base URL
    pub base_url: String,

    /// Timeout applied to every single fetch
    pub timeout: Duration,

    pub user_agent: String,

    /// Timezone used to localize timestamps without an offset
    pub source_timezone: Tz,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent: concat!("elia-client/", env!("CARGO_PKG_VERSION")).to_string(),
            source_timezone: SOURCE_TIMEZONE,
        }
    }
}

impl ClientConfig {
    /// Build from environment variables, loading `.env` first when present
    ///
    /// Reads `ELIA_BASE_URL`, `ELIA_TIMEOUT_SECS` and `ELIA_USER_AGENT`; unset
    /// variables keep their default, invalid ones are an error.
    pub fn from_env() -> Result<Self, EliaError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup
    ///
    /// # Examples
    ///
    /// ```
    /// # use std::time::Duration;
    /// # use elia_client::ClientConfig;
    /// let config = ClientConfig::from_lookup(|key| match key {
    ///     "ELIA_TIMEOUT_SECS" => Some("5".to_string()),
    ///     _ => None,
    /// })
    /// .unwrap();
    /// assert_eq!(config.timeout, Duration::from_secs(5));
    ///
    /// assert!(ClientConfig::from_lookup(|key| match key {
    ///     "ELIA_TIMEOUT_SECS" => Some("soon".to_string()),
    ///     _ => None,
    /// })
    /// .is_err());
    /// ```
    pub fn from_lookup<L>(lookup: L) -> Result<Self, EliaError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(base_url) = lookup(ENV_BASE_URL) {
            let base_url = base_url.trim().to_string();
            if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
                return Err(EliaError::InvalidRequest(format!(
                    "{} must be an http(s) URL, got {:?}",
                    ENV_BASE_URL, base_url
                )));
            }
            config.base_url = base_url;
        }

        if let Some(raw) = lookup(ENV_TIMEOUT_SECS) {
            let secs: u64 = raw.trim().parse().map_err(|_| {
                EliaError::InvalidRequest(format!(
                    "{} must be a whole number of seconds, got {:?}",
                    ENV_TIMEOUT_SECS, raw
                ))
            })?;
            if secs == 0 {
                return Err(EliaError::InvalidRequest(format!(
                    "{} must be greater than zero",
                    ENV_TIMEOUT_SECS
                )));
            }
            config.timeout = Duration::from_secs(secs);
        }

        if let Some(user_agent) = lookup(ENV_USER_AGENT) {
            config.user_agent = user_agent;
        }

        Ok(config)
    }
}

// ============================================================================
// Client
// ============================================================================

/// Client for the Elia publication services
///
/// Generic over the transport so tests and offline tools can supply their
/// own [`Fetch`] implementation.
#[derive(Debug, Clone)]
pub struct EliaClient<F: Fetch = HttpFetcher> {
    config: ClientConfig,
    fetcher: F,
}

impl EliaClient<HttpFetcher> {
    /// Client over HTTP, configured by `config`
    pub fn new(config: ClientConfig) -> Result<Self, EliaError> {
        let fetcher = HttpFetcher::new(config.timeout, &config.user_agent)?;
        Ok(Self { config, fetcher })
    }
}

impl<F: Fetch> EliaClient<F> {
    pub fn with_fetcher(config: ClientConfig, fetcher: F) -> Self {
        Self { config, fetcher }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Fetch, parse and assemble one dataset request
    ///
    /// Per-day datasets are fetched day by day; any single failure fails the
    /// whole call and no partial table is returned.
    pub fn fetch(&self, request: &DatasetRequest) -> Result<TimeSeriesTable, EliaError> {
        let kind = request.kind();
        let plans = catalog::route_request(request, &self.config.base_url)?;
        info!("Fetching {} in {} request(s)", kind.name(), plans.len());

        let blocks = plans
            .iter()
            .map(|plan| {
                let payload = fetcher::fetch_payload(&self.fetcher, plan)?;
                parse_payload(kind, &payload, self.config.source_timezone)
            })
            .collect::<Result<Vec<_>, EliaError>>()?;

        let table = TimeSeriesTable::concat(blocks)?;
        info!("Assembled {} rows for {}", table.len(), kind.name());
        Ok(table)
    }

    fn fetch_range(
        &self,
        kind: DatasetKind,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<TimeSeriesTable, EliaError> {
        self.fetch(&DatasetRequest::new(kind, DateWindow::Range { start, end })?)
    }

    /// Solar forecast: `most_recent`, `day_ahead`, `real_time`
    pub fn forecast_solar(&self, start: NaiveDate, end: NaiveDate) -> Result<TimeSeriesTable, EliaError> {
        self.fetch_range(DatasetKind::SolarForecast, start, end)
    }

    /// Wind forecast: `most_recent`, `day_ahead`, `real_time`
    pub fn forecast_wind(&self, start: NaiveDate, end: NaiveDate) -> Result<TimeSeriesTable, EliaError> {
        self.fetch_range(DatasetKind::WindForecast, start, end)
    }

    /// Load forecast with the numeric columns of the source workbook
    pub fn forecast_load(&self, start: NaiveDate, end: NaiveDate) -> Result<TimeSeriesTable, EliaError> {
        self.fetch_range(DatasetKind::LoadForecast, start, end)
    }

    /// Latest hour of imbalance measurements plus `R3`, `AFRR`, `MFRR`
    pub fn imbalance_volume(&self) -> Result<TimeSeriesTable, EliaError> {
        self.fetch(&DatasetRequest::new(DatasetKind::ImbalanceVolume, DateWindow::Latest)?)
    }

    /// Quarter-hour imbalance prices, one XML fetch per day
    pub fn imbalance_prices_per_quarter(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<TimeSeriesTable, EliaError> {
        self.fetch_range(DatasetKind::ImbalancePricePerQuarter, start, end)
    }

    /// Quarter-hour imbalance prices, one workbook per day
    pub fn imbalance_prices_per_quarter_via_excel(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<TimeSeriesTable, EliaError> {
        self.fetch_range(DatasetKind::ImbalancePricePerQuarterExcel, start, end)
    }

    /// Latest hour of per-minute imbalance prices
    pub fn imbalance_prices_per_minute(&self) -> Result<TimeSeriesTable, EliaError> {
        self.fetch(&DatasetRequest::new(DatasetKind::ImbalancePricePerMinute, DateWindow::Latest)?)
    }
}

// ============================================================================
// Parsing
// ============================================================================

fn parse_record_set(kind: DatasetKind, payload: &RawPayload) -> Result<ParsedRecordSet, FormatError> {
    match kind {
        DatasetKind::SolarForecast | DatasetKind::WindForecast => {
            xml_parser::parse_forecast_xml(&payload.text()?, kind)
        }
        DatasetKind::ImbalancePricePerQuarter => {
            xml_parser::parse_imbalance_prices_xml(&payload.text()?)
        }
        DatasetKind::LoadForecast | DatasetKind::ImbalancePricePerQuarterExcel => {
            if payload.bytes.is_empty() {
                return Err(FormatError::EmptyResponse);
            }
            if kind == DatasetKind::LoadForecast {
                spreadsheet_parser::parse_load_forecast(&payload.bytes)
            } else {
                spreadsheet_parser::parse_imbalance_prices_excel(&payload.bytes)
            }
        }
        DatasetKind::ImbalanceVolume => json_parser::parse_imbalance_volume(&payload.text()?),
        DatasetKind::ImbalancePricePerMinute => {
            json_parser::parse_prices_per_minute(&payload.text()?)
        }
    }
}

/// Parse and normalize one raw payload into a table block
///
/// Pure: the same payload always yields the same table.
///
/// # Arguments
///
/// * `kind` - Dataset the payload was fetched for
/// * `payload` - Raw body with its encoding and wire format
/// * `source_tz` - Timezone of timestamps that carry no offset
///
/// # Returns
///
/// * `Ok(TimeSeriesTable)` - One row per distinct UTC instant
/// * `Err(EliaError)` - Wire format mismatch, format or DST inference failure
pub fn parse_payload(
    kind: DatasetKind,
    payload: &RawPayload,
    source_tz: Tz,
) -> Result<TimeSeriesTable, EliaError> {
    if payload.format != kind.wire_format() {
        return Err(EliaError::InvalidRequest(format!(
            "{} expects a {:?} payload, got {:?}",
            kind.name(),
            kind.wire_format(),
            payload.format
        )));
    }

    let (raw, columns) = parse_record_set(kind, payload)?.into_parts();
    let index = timestamps::normalize(raw, source_tz)?;
    let mut table = TimeSeriesTable::from_columns(index, columns)?;

    match kind {
        DatasetKind::ImbalanceVolume => values::derive_imbalance_indicators(&mut table)?,
        DatasetKind::ImbalancePricePerMinute => {
            table = table.select(&json_parser::PER_MINUTE_COLUMNS)?;
        }
        _ => {}
    }

    debug!("Normalized {} block: {} rows", kind.name(), table.len());
    Ok(table)
}

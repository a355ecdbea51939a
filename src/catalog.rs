//! Endpoint catalog for the Elia publication services
//!
//! Maps each [`DatasetKind`] to a URL template and expands a validated
//! [`DatasetRequest`] into the list of fetches needed to serve it.
//!
//! # Routing
//!
//! | Dataset | Format | Fetches |
//! |---------|--------|---------|
//! | forecast-solar / wind / load | XML / XML / spreadsheet | 1 for the whole range |
//! | imbalance-price-per-quarter (+ excel) | XML / spreadsheet | 1 per calendar day |
//! | imbalance-volume / price-per-minute | JSON | 1, latest hour |
//!
//! # Example
//!
//! ```rust
//! use chrono::NaiveDate;
//! use elia_client::catalog::route_request;
//! use elia_client::types::{DatasetKind, DatasetRequest, DateWindow};
//!
//! let request = DatasetRequest::new(
//!     DatasetKind::ImbalancePricePerQuarter,
//!     DateWindow::Range {
//!         start: NaiveDate::from_ymd_opt(2024, 10, 26).unwrap(),
//!         end: NaiveDate::from_ymd_opt(2024, 10, 27).unwrap(),
//!     },
//! )
//! .unwrap();
//!
//! let plans = route_request(&request, "https://publications.elia.be/Publications/Publications").unwrap();
//! assert_eq!(plans.len(), 2); // one fetch per day
//! ```

use chrono::{Days, NaiveDate};

use crate::error::{EliaError, NetworkError};
use crate::types::{DatasetKind, DatasetRequest, DateWindow, FetchGranularity};

/// Production base URL of the publication services
pub const DEFAULT_BASE_URL: &str = "https://publications.elia.be/Publications/Publications";

/// Date format used in every query parameter
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// One HTTP GET against a publication endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    pub kind: DatasetKind,

    /// Window served by this single fetch (`Day` for per-day datasets)
    pub window: DateWindow,

    /// Full URL, ready for GET
    pub url: String,
}

/// URL path template (relative to the base URL) for a dataset
///
/// Placeholders: `{start}`, `{end}` for ranged endpoints, `{day}` for per-day endpoints.
pub fn url_template(kind: DatasetKind) -> &'static str {
    match kind {
        DatasetKind::SolarForecast => {
            "SolarForecasting.v4.svc/GetChartDataForZoneXml?dateFrom={start}&dateTo={end}&sourceId=1"
        }
        DatasetKind::WindForecast => {
            "WindForecasting.v2.svc/GetForecastGraphDataXml?beginDate={start}&endDate={end}&isEliaConnected=&isOffshore="
        }
        DatasetKind::LoadForecast => {
            "LoadForecasting.v2.svc/GetLoadForecastingExcel?fromDate={start}&toDate={end}"
        }
        DatasetKind::ImbalanceVolume => "SystemImbalance.v1.svc/GetLastHourMeasurements",
        DatasetKind::ImbalancePricePerQuarter => {
            "ImbalanceNrvPrice.v1.svc/GetImbalanceNrvPrices?day={day}"
        }
        DatasetKind::ImbalancePricePerQuarterExcel => {
            "ImbalanceNrvPrice.v3.svc/GetImbalanceNrvPricesExcel?day={day}"
        }
        DatasetKind::ImbalancePricePerMinute => {
            "ImbalancePricePerMinute.v1.svc/GetLastHourImbalancePrices"
        }
    }
}

/// Build the full URL of one fetch
///
/// # Examples
///
/// ```
/// # use chrono::NaiveDate;
/// # use elia_client::catalog::build_api_url;
/// # use elia_client::types::{DatasetKind, DateWindow};
/// let day = NaiveDate::from_ymd_opt(2020, 3, 20).unwrap();
/// let url = build_api_url(
///     "https://publications.elia.be/Publications/Publications/",
///     DatasetKind::ImbalancePricePerQuarter,
///     DateWindow::Day(day),
/// )
/// .unwrap();
/// assert_eq!(
///     url,
///     "https://publications.elia.be/Publications/Publications/ImbalanceNrvPrice.v1.svc/GetImbalanceNrvPrices?day=2020-03-20"
/// );
/// ```
pub fn build_api_url(
    base_url: &str,
    kind: DatasetKind,
    window: DateWindow,
) -> Result<String, EliaError> {
    let base = base_url.trim_end_matches('/');
    if !(base.starts_with("http://") || base.starts_with("https://")) {
        return Err(NetworkError::InvalidUrl(base_url.to_string()).into());
    }

    let template = url_template(kind);
    let path = match window {
        DateWindow::Range { start, end } => template
            .replace("{start}", &start.format(DATE_FORMAT).to_string())
            .replace("{end}", &end.format(DATE_FORMAT).to_string()),
        DateWindow::Day(day) => template.replace("{day}", &day.format(DATE_FORMAT).to_string()),
        DateWindow::Latest => template.to_string(),
    };

    if path.contains('{') {
        return Err(EliaError::InvalidRequest(format!(
            "window {:?} does not fill URL template for {}",
            window,
            kind.name()
        )));
    }

    Ok(format!("{}/{}", base, path))
}

/// Validate an inclusive date range
///
/// # Examples
///
/// ```
/// # use chrono::NaiveDate;
/// # use elia_client::catalog::validate_date_range;
/// let d = |day| NaiveDate::from_ymd_opt(2024, 10, day).unwrap();
/// assert!(validate_date_range(d(24), d(25)).is_ok());
/// assert!(validate_date_range(d(24), d(24)).is_ok());
/// assert!(validate_date_range(d(25), d(24)).is_err());
/// ```
pub fn validate_date_range(start: NaiveDate, end: NaiveDate) -> Result<(), EliaError> {
    if start > end {
        return Err(EliaError::InvalidRequest(format!(
            "Invalid date range: start ({}) must be <= end ({})",
            start, end
        )));
    }
    Ok(())
}

/// Calendar days `start..=end`
pub fn days_inclusive(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut days = Vec::new();
    let mut current = start;
    while current <= end {
        days.push(current);
        match current.checked_add_days(Days::new(1)) {
            Some(next) => current = next,
            None => break,
        }
    }
    days
}

/// Expand a request into the fetches that serve it
pub fn route_request(request: &DatasetRequest, base_url: &str) -> Result<Vec<QueryPlan>, EliaError> {
    let kind = request.kind();

    let windows = match (kind.granularity(), request.window()) {
        (FetchGranularity::Latest, _) => vec![DateWindow::Latest],
        (FetchGranularity::WholeRange, DateWindow::Range { start, end }) => {
            validate_date_range(start, end)?;
            vec![DateWindow::Range { start, end }]
        }
        (FetchGranularity::PerDay, DateWindow::Range { start, end }) => {
            validate_date_range(start, end)?;
            days_inclusive(start, end)
                .into_iter()
                .map(DateWindow::Day)
                .collect()
        }
        (_, window) => {
            return Err(EliaError::InvalidRequest(format!(
                "{} cannot be served for window {:?}",
                kind.name(),
                window
            )));
        }
    };

    windows
        .into_iter()
        .map(|window| {
            Ok(QueryPlan {
                kind,
                window,
                url: build_api_url(base_url, kind, window)?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_build_api_url_range() {
        let url = build_api_url(
            "https://api.example.com",
            DatasetKind::WindForecast,
            DateWindow::Range {
                start: date(2024, 10, 24),
                end: date(2024, 10, 25),
            },
        )
        .unwrap();

        assert!(url.starts_with("https://api.example.com/WindForecasting.v2.svc/"));
        assert!(url.contains("beginDate=2024-10-24"));
        assert!(url.contains("endDate=2024-10-25"));
    }

    #[test]
    fn test_build_api_url_latest() {
        let url = build_api_url(
            "https://api.example.com/",
            DatasetKind::ImbalanceVolume,
            DateWindow::Latest,
        )
        .unwrap();
        assert_eq!(
            url,
            "https://api.example.com/SystemImbalance.v1.svc/GetLastHourMeasurements"
        );
    }

    #[test]
    fn test_build_api_url_rejects_unfilled_template() {
        let result = build_api_url(
            "https://api.example.com",
            DatasetKind::ImbalancePricePerQuarter,
            DateWindow::Latest,
        );
        assert!(matches!(result, Err(EliaError::InvalidRequest(_))));
    }

    #[test]
    fn test_build_api_url_rejects_non_http_base() {
        let result = build_api_url("ftp://example.com", DatasetKind::ImbalanceVolume, DateWindow::Latest);
        assert!(matches!(
            result,
            Err(EliaError::Network(NetworkError::InvalidUrl(_)))
        ));
    }

    #[test]
    fn test_days_inclusive_crosses_month() {
        let days = days_inclusive(date(2024, 10, 30), date(2024, 11, 2));
        assert_eq!(
            days,
            vec![
                date(2024, 10, 30),
                date(2024, 10, 31),
                date(2024, 11, 1),
                date(2024, 11, 2)
            ]
        );
    }

    #[test]
    fn test_days_inclusive_single_day() {
        assert_eq!(
            days_inclusive(date(2024, 10, 27), date(2024, 10, 27)),
            vec![date(2024, 10, 27)]
        );
    }

    #[test]
    fn test_route_forecast_is_single_fetch() {
        let request = DatasetRequest::new(
            DatasetKind::SolarForecast,
            DateWindow::Range {
                start: date(2024, 10, 1),
                end: date(2024, 10, 7),
            },
        )
        .unwrap();

        let plans = route_request(&request, DEFAULT_BASE_URL).unwrap();
        assert_eq!(plans.len(), 1);
        assert!(plans[0].url.contains("dateFrom=2024-10-01"));
        assert!(plans[0].url.contains("dateTo=2024-10-07"));
    }

    #[test]
    fn test_route_per_day_excel() {
        let request = DatasetRequest::new(
            DatasetKind::ImbalancePricePerQuarterExcel,
            DateWindow::Range {
                start: date(2024, 10, 26),
                end: date(2024, 10, 28),
            },
        )
        .unwrap();

        let plans = route_request(&request, DEFAULT_BASE_URL).unwrap();
        assert_eq!(plans.len(), 3);
        assert_eq!(plans[1].window, DateWindow::Day(date(2024, 10, 27)));
        assert!(plans[1].url.ends_with("GetImbalanceNrvPricesExcel?day=2024-10-27"));
    }

    #[test]
    fn test_route_latest() {
        let request =
            DatasetRequest::new(DatasetKind::ImbalancePricePerMinute, DateWindow::Latest).unwrap();
        let plans = route_request(&request, DEFAULT_BASE_URL).unwrap();
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].window, DateWindow::Latest);
    }

    #[test]
    fn test_every_kind_routes() {
        let range = DateWindow::Range {
            start: date(2024, 10, 24),
            end: date(2024, 10, 24),
        };
        for kind in DatasetKind::ALL {
            let window = match kind.granularity() {
                FetchGranularity::Latest => DateWindow::Latest,
                _ => range,
            };
            let request = DatasetRequest::new(kind, window).unwrap();
            let plans = route_request(&request, DEFAULT_BASE_URL).unwrap();
            assert_eq!(plans.len(), 1, "{}", kind.name());
            assert!(!plans[0].url.contains('{'), "{}", plans[0].url);
        }
    }
}

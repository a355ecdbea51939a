//! XML payload parser
//!
//! The XML publication services wrap repeated items in a namespaced
//! envelope. Values are located by element path (namespace + local name per
//! step, relative to the document root) and collected as parallel sequences,
//! one entry per matching element. An element with no text (`<X/>`,
//! `<X i:nil="true"/>`, `<X></X>`) yields a missing entry so positions stay
//! aligned.
//!
//! Supported layouts:
//! - wind forecast: `ForecastGraphItems/WindForecastingGraphItem/*`
//! - solar forecast: `SolarForecastingChartDataForZoneItems/SolarForecastingChartDataForZoneItem/*`
//! - imbalance price per quarter: `ImbalanceNrvPrices/ImbalanceNrvPrice/*`

use quick_xml::events::Event;
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::NsReader;
use tracing::debug;

use crate::error::FormatError;
use crate::timestamps::classify_timestamps;
use crate::types::{DatasetKind, ParsedRecordSet};
use crate::values::{parse_forecast_value, parse_measurement};

const DATA_CONTRACT_NS: &str = "http://schemas.datacontract.org/2004/07/";
const SYSTEM_NS: &str = "http://schemas.datacontract.org/2004/07/System";
const WIND_NS: &str =
    "http://schemas.datacontract.org/2004/07/Elia.PublicationService.DomainInterface.WindForecasting.v2";
const SOLAR_NS: &str =
    "http://schemas.datacontract.org/2004/07/Elia.PublicationService.DomainInterface.SolarForecasting.v4";
const IMBALANCE_NS: &str =
    "http://schemas.datacontract.org/2004/07/Elia.PublicationService.DomainInterface.ImbalanceNrvPrice.V1";

pub const MOST_RECENT: &str = "most_recent";
pub const DAY_AHEAD: &str = "day_ahead";
pub const REAL_TIME: &str = "real_time";

/// Output columns of the forecast datasets, in table order
pub const FORECAST_COLUMNS: [&str; 3] = [MOST_RECENT, DAY_AHEAD, REAL_TIME];

/// Output columns of the per-quarter imbalance price dataset
pub const IMBALANCE_PRICE_COLUMNS: [&str; 8] =
    ["Alpha", "Beta", "MDP", "MIP", "NRV", "SI", "PPos", "PNeg"];

const IMBALANCE_DATETIME: &str = "DateTime";

/// One step of an element path: namespace URI and local name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathStep {
    pub namespace: String,
    pub local: String,
}

impl PathStep {
    pub fn new(namespace: &str, local: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            local: local.to_string(),
        }
    }
}

/// Element path below the document root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementPath(pub Vec<PathStep>);

impl ElementPath {
    /// Path whose steps all live in one namespace
    pub fn in_namespace(namespace: &str, locals: &[&str]) -> Self {
        Self(locals.iter().map(|l| PathStep::new(namespace, l)).collect())
    }

    /// Append a step in another namespace
    pub fn then(mut self, namespace: &str, local: &str) -> Self {
        self.0.push(PathStep::new(namespace, local));
        self
    }

    fn matches(&self, stack: &[PathStep]) -> bool {
        self.0.as_slice() == stack
    }
}

impl std::fmt::Display for ElementPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let rendered: Vec<String> = self
            .0
            .iter()
            .map(|s| {
                let ns = s
                    .namespace
                    .strip_prefix(DATA_CONTRACT_NS)
                    .unwrap_or(s.namespace.as_str());
                format!("{{{}}}{}", ns, s.local)
            })
            .collect();
        write!(f, "{}", rendered.join("/"))
    }
}

fn xml_error(err: quick_xml::Error) -> FormatError {
    FormatError::Xml(err.to_string())
}

fn resolved_step(ns: ResolveResult, local: &[u8]) -> Result<PathStep, FormatError> {
    let namespace = match ns {
        ResolveResult::Bound(Namespace(uri)) => String::from_utf8_lossy(uri).into_owned(),
        ResolveResult::Unbound => String::new(),
        ResolveResult::Unknown(prefix) => {
            return Err(FormatError::Xml(format!(
                "unknown namespace prefix {}",
                String::from_utf8_lossy(&prefix)
            )));
        }
    };
    Ok(PathStep {
        namespace,
        local: String::from_utf8_lossy(local).into_owned(),
    })
}

/// Collect the text of every element matching each path, in document order
///
/// Returns one sequence per requested path.
pub fn collect_paths(
    xml: &str,
    paths: &[ElementPath],
) -> Result<Vec<Vec<Option<String>>>, FormatError> {
    let mut reader = NsReader::from_str(xml);
    reader.trim_text(true);

    let mut results: Vec<Vec<Option<String>>> = vec![Vec::new(); paths.len()];
    // Root element is not part of any path
    let mut stack: Vec<PathStep> = Vec::new();
    // (path index, depth of the matched element, text collected so far)
    let mut capture: Option<(usize, usize, Option<String>)> = None;

    loop {
        let (ns, event) = reader.read_resolved_event().map_err(xml_error)?;
        match event {
            Event::Start(e) => {
                let step = resolved_step(ns, e.local_name().as_ref())?;
                stack.push(step);
                if capture.is_none() && stack.len() > 1 {
                    if let Some(idx) = paths.iter().position(|p| p.matches(&stack[1..])) {
                        capture = Some((idx, stack.len(), None));
                    }
                }
            }
            Event::Empty(e) => {
                let step = resolved_step(ns, e.local_name().as_ref())?;
                stack.push(step);
                if capture.is_none() && stack.len() > 1 {
                    if let Some(idx) = paths.iter().position(|p| p.matches(&stack[1..])) {
                        results[idx].push(None);
                    }
                }
                stack.pop();
            }
            Event::Text(e) => {
                if let Some((_, depth, text)) = capture.as_mut() {
                    if *depth == stack.len() {
                        let value = e.unescape().map_err(xml_error)?;
                        text.get_or_insert_with(String::new).push_str(&value);
                    }
                }
            }
            Event::End(_) => {
                if let Some((idx, depth, _)) = capture.as_ref() {
                    if *depth == stack.len() {
                        let idx = *idx;
                        let text = capture.take().and_then(|(_, _, t)| t);
                        results[idx].push(text.filter(|t| !t.trim().is_empty()));
                    }
                }
                stack.pop();
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(results)
}

struct ForecastLayout {
    namespace: &'static str,
    items: &'static str,
    item: &'static str,
    real_time: &'static str,
}

fn forecast_layout(kind: DatasetKind) -> Result<ForecastLayout, FormatError> {
    match kind {
        DatasetKind::WindForecast => Ok(ForecastLayout {
            namespace: WIND_NS,
            items: "ForecastGraphItems",
            item: "WindForecastingGraphItem",
            real_time: "Realtime",
        }),
        DatasetKind::SolarForecast => Ok(ForecastLayout {
            namespace: SOLAR_NS,
            items: "SolarForecastingChartDataForZoneItems",
            item: "SolarForecastingChartDataForZoneItem",
            real_time: "RealTime",
        }),
        other => Err(FormatError::Xml(format!(
            "{} is not an XML forecast dataset",
            other.name()
        ))),
    }
}

/// Parse a wind or solar forecast payload
///
/// Produces columns `most_recent`, `day_ahead`, `real_time`; the `-50`
/// sentinel becomes a missing value.
pub fn parse_forecast_xml(xml: &str, kind: DatasetKind) -> Result<ParsedRecordSet, FormatError> {
    let layout = forecast_layout(kind)?;
    let item = |local: &str| {
        ElementPath::in_namespace(layout.namespace, &[layout.items, layout.item, local])
    };

    let time_path = item("StartsOn").then(SYSTEM_NS, "DateTime");
    let paths = vec![
        item("MostRecentForecast"),
        item("DayAheadForecast"),
        item(layout.real_time),
        time_path.clone(),
    ];

    let mut collected = collect_paths(xml, &paths)?;
    let times = collected.pop().unwrap_or_default();
    if times.is_empty() {
        return Err(FormatError::ElementPathNotFound(time_path.to_string()));
    }

    let columns = FORECAST_COLUMNS
        .iter()
        .zip(collected)
        .map(|(name, raw)| {
            let values = raw
                .iter()
                .map(|t| parse_forecast_value(t.as_deref()))
                .collect::<Result<Vec<_>, _>>()?;
            Ok((name.to_string(), values))
        })
        .collect::<Result<Vec<_>, FormatError>>()?;

    let timestamps = classify_timestamps(&required_texts(times, &time_path)?)?;
    debug!("Parsed {} {} rows", timestamps.len(), kind.name());
    ParsedRecordSet::new(timestamps, columns)
}

/// Parse one day of per-quarter imbalance prices
///
/// Each `DateTime` carries its own offset and is resolved row by row. A
/// payload without any price item is a format failure.
pub fn parse_imbalance_prices_xml(xml: &str) -> Result<ParsedRecordSet, FormatError> {
    let item = |local: &str| {
        ElementPath::in_namespace(
            IMBALANCE_NS,
            &["ImbalanceNrvPrices", "ImbalanceNrvPrice", local],
        )
    };

    let time_path = item(IMBALANCE_DATETIME);
    let mut paths: Vec<ElementPath> = IMBALANCE_PRICE_COLUMNS.iter().map(|c| item(c)).collect();
    paths.push(time_path.clone());

    let mut collected = collect_paths(xml, &paths)?;
    let times = collected.pop().unwrap_or_default();
    if times.is_empty() {
        return Err(FormatError::ElementPathNotFound(time_path.to_string()));
    }

    let columns = IMBALANCE_PRICE_COLUMNS
        .iter()
        .zip(collected)
        .map(|(name, raw)| {
            let values = raw
                .iter()
                .map(|t| parse_measurement(t.as_deref()))
                .collect::<Result<Vec<_>, _>>()?;
            Ok((name.to_string(), values))
        })
        .collect::<Result<Vec<_>, FormatError>>()?;

    let timestamps = classify_timestamps(&required_texts(times, &time_path)?)?;
    debug!("Parsed {} imbalance price rows", timestamps.len());
    ParsedRecordSet::new(timestamps, columns)
}

/// Timestamps may not be missing
fn required_texts(
    texts: Vec<Option<String>>,
    path: &ElementPath,
) -> Result<Vec<String>, FormatError> {
    texts
        .into_iter()
        .map(|t| t.ok_or_else(|| FormatError::InvalidTimestamp(format!("empty {}", path))))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RawTimestamps;
    use chrono::{TimeZone, Utc};

    fn wind_item(time: &str, most_recent: &str, day_ahead: &str, real_time: &str) -> String {
        let field = |tag: &str, value: &str| {
            if value.is_empty() {
                format!("<{tag} i:nil=\"true\"/>")
            } else {
                format!("<{tag}>{value}</{tag}>")
            }
        };
        format!(
            "<WindForecastingGraphItem>{}{}{}<StartsOn><a:DateTime>{}</a:DateTime><a:OffsetMinutes>0</a:OffsetMinutes></StartsOn></WindForecastingGraphItem>",
            field("DayAheadForecast", day_ahead),
            field("MostRecentForecast", most_recent),
            field("Realtime", real_time),
            time
        )
    }

    fn wind_document(items: &[String]) -> String {
        format!(
            r#"<?xml version="1.0" encoding="iso-8859-1"?>
<WindForecastingGraph xmlns="{WIND_NS}" xmlns:i="http://www.w3.org/2001/XMLSchema-instance" xmlns:a="{SYSTEM_NS}">
  <ForecastGraphItems>{}</ForecastGraphItems>
  <MonitoredCapacity>2262.1</MonitoredCapacity>
</WindForecastingGraph>"#,
            items.join("\n")
        )
    }

    #[test]
    fn test_wind_empty_realtime_is_missing_at_position() {
        let xml = wind_document(&[
            wind_item("2024-10-24T22:00:00Z", "501.2", "480", "510.7"),
            wind_item("2024-10-24T22:15:00Z", "502.3", "481", "512.0"),
            wind_item("2024-10-24T22:30:00Z", "503.4", "482", ""),
            wind_item("2024-10-24T22:45:00Z", "504.5", "483", "515.1"),
        ]);

        let parsed = parse_forecast_xml(&xml, DatasetKind::WindForecast).unwrap();

        assert_eq!(parsed.len(), 4);
        let (_, real_time) = &parsed.columns()[2];
        assert_eq!(real_time.len(), 4);
        assert_eq!(real_time.iter().filter(|v| v.is_none()).count(), 1);
        assert_eq!(real_time[2], None);
        assert_eq!(real_time[3], Some(515.1));
    }

    #[test]
    fn test_wind_sentinel_is_missing() {
        let xml = wind_document(&[wind_item("2024-10-24T22:00:00Z", "-50", "-50.0", "0")]);
        let parsed = parse_forecast_xml(&xml, DatasetKind::WindForecast).unwrap();

        let names: Vec<&str> = parsed.columns().iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, FORECAST_COLUMNS);
        assert_eq!(parsed.columns()[0].1, vec![None]);
        assert_eq!(parsed.columns()[1].1, vec![None]);
        assert_eq!(parsed.columns()[2].1, vec![Some(0.0)]);
    }

    #[test]
    fn test_wind_timestamps_with_offset_are_instants() {
        let xml = wind_document(&[wind_item("2024-10-24T22:00:00Z", "1", "2", "3")]);
        let parsed = parse_forecast_xml(&xml, DatasetKind::WindForecast).unwrap();

        assert_eq!(
            parsed.timestamps(),
            &RawTimestamps::Instants(vec![Utc.with_ymd_and_hms(2024, 10, 24, 22, 0, 0).unwrap()])
        );
    }

    #[test]
    fn test_wrong_dataset_kind_is_path_not_found() {
        let xml = wind_document(&[wind_item("2024-10-24T22:00:00Z", "1", "2", "3")]);
        let err = parse_forecast_xml(&xml, DatasetKind::SolarForecast).unwrap_err();
        assert!(matches!(err, FormatError::ElementPathNotFound(_)));
    }

    #[test]
    fn test_missing_value_element_is_length_mismatch() {
        let xml = wind_document(&[
            wind_item("2024-10-24T22:00:00Z", "1", "2", "3"),
            "<WindForecastingGraphItem><DayAheadForecast>2</DayAheadForecast><MostRecentForecast>1</MostRecentForecast><StartsOn><a:DateTime>2024-10-24T22:15:00Z</a:DateTime></StartsOn></WindForecastingGraphItem>".to_string(),
        ]);

        let err = parse_forecast_xml(&xml, DatasetKind::WindForecast).unwrap_err();
        assert_eq!(
            err,
            FormatError::LengthMismatch {
                field: REAL_TIME.to_string(),
                expected: 2,
                actual: 1,
            }
        );
    }

    #[test]
    fn test_solar_forecast() {
        let xml = format!(
            r#"<SolarForecastingChartDataForZone xmlns="{SOLAR_NS}" xmlns:a="{SYSTEM_NS}">
<SolarForecastingChartDataForZoneItems>
  <SolarForecastingChartDataForZoneItem>
    <DayAheadForecast>12.5</DayAheadForecast>
    <MostRecentForecast>13.25</MostRecentForecast>
    <RealTime>-50</RealTime>
    <StartsOn><a:DateTime>2024-06-01T10:00:00Z</a:DateTime></StartsOn>
  </SolarForecastingChartDataForZoneItem>
</SolarForecastingChartDataForZoneItems>
</SolarForecastingChartDataForZone>"#
        );

        let parsed = parse_forecast_xml(&xml, DatasetKind::SolarForecast).unwrap();
        assert_eq!(parsed.columns()[0].1, vec![Some(13.25)]);
        assert_eq!(parsed.columns()[1].1, vec![Some(12.5)]);
        assert_eq!(parsed.columns()[2].1, vec![None]);
    }

    fn price_item(time: &str, nrv: &str) -> String {
        format!(
            "<ImbalanceNrvPrice><Alpha>0</Alpha><Beta>0.5</Beta><DateTime>{time}</DateTime><MDP>80.1</MDP><MIP>120.2</MIP><NRV>{nrv}</NRV><PNeg>80.1</PNeg><PPos>120.2</PPos><SI>-{nrv}</SI></ImbalanceNrvPrice>"
        )
    }

    fn price_document(items: &[String]) -> String {
        format!(
            r#"<ImbalanceNrvPriceList xmlns="{IMBALANCE_NS}"><ImbalanceNrvPrices>{}</ImbalanceNrvPrices></ImbalanceNrvPriceList>"#,
            items.join("")
        )
    }

    #[test]
    fn test_imbalance_prices_resolve_offset_per_row() {
        let xml = price_document(&[
            price_item("2024-10-27T02:45:00+02:00", "100"),
            price_item("2024-10-27T02:00:00+01:00", "110"),
        ]);

        let parsed = parse_imbalance_prices_xml(&xml).unwrap();

        let names: Vec<&str> = parsed.columns().iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, IMBALANCE_PRICE_COLUMNS);
        assert_eq!(
            parsed.timestamps(),
            &RawTimestamps::Instants(vec![
                Utc.with_ymd_and_hms(2024, 10, 27, 0, 45, 0).unwrap(),
                Utc.with_ymd_and_hms(2024, 10, 27, 1, 0, 0).unwrap(),
            ])
        );
        assert_eq!(parsed.columns()[4].1, vec![Some(100.0), Some(110.0)]);
        assert_eq!(parsed.columns()[5].1, vec![Some(-100.0), Some(-110.0)]);
    }

    #[test]
    fn test_imbalance_prices_empty_day_fails() {
        let err = parse_imbalance_prices_xml(&price_document(&[])).unwrap_err();
        assert!(matches!(err, FormatError::ElementPathNotFound(_)));
    }

    #[test]
    fn test_malformed_xml_is_error() {
        let err = collect_paths("<a><b></a>", &[]).unwrap_err();
        assert!(matches!(err, FormatError::Xml(_)));
    }
}

//! Timestamp normalization
//!
//! Raw timestamps arrive in four shapes:
//!
//! 1. **Offset-bearing ISO text**: `"2024-10-27T02:15:00+01:00"` → instant, converted row by row
//! 2. **Naive ISO text**: `"2024-10-27T02:15:00"` → wall-clock time in the source region
//! 3. **Day-first text**: `"27/10/2024 02:15"` or `Date` + `Quarter` label → wall-clock time
//! 4. **Decorated epoch**: `"/Date(1632802500000+0200)/"` → epoch seconds in UTC, suffix ignored
//!
//! Wall-clock times are localized to the source timezone with the DST
//! "infer" policy (see [`localize_infer`]) and then converted to UTC.
//!
//! # Example
//!
//! ```rust
//! use chrono::{TimeZone, Utc};
//! use elia_client::timestamps::{localize_infer, parse_day_first};
//!
//! let local = vec![
//!     parse_day_first("27/10/2024 02:30").unwrap(),
//!     parse_day_first("27/10/2024 02:30").unwrap(),
//! ];
//! let utc = localize_infer(&local, chrono_tz::Europe::Brussels).unwrap();
//!
//! // First 02:30 is summer time (+02:00), the repeat is winter time (+01:00)
//! assert_eq!(utc[0], Utc.with_ymd_and_hms(2024, 10, 27, 0, 30, 0).unwrap());
//! assert_eq!(utc[1], Utc.with_ymd_and_hms(2024, 10, 27, 1, 30, 0).unwrap());
//! ```

use chrono::{DateTime, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::error::{AmbiguousTimeError, FormatError};
use crate::types::RawTimestamps;

const DAY_FIRST_FORMATS: &[&str] = &[
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%d-%m-%Y %H:%M:%S",
    "%d-%m-%Y %H:%M",
    "%d.%m.%Y %H:%M:%S",
    "%d.%m.%Y %H:%M",
];

const DAY_FIRST_DATE_FORMATS: &[&str] = &["%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y"];

const ISO_NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

const QUARTER_LABEL_LEN: usize = 5;

// ============================================================================
// Text parsing
// ============================================================================

/// Parse a naive ISO 8601 timestamp (no offset)
pub fn parse_iso_naive(text: &str) -> Result<NaiveDateTime, FormatError> {
    let trimmed = text.trim();
    ISO_NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
        .ok_or_else(|| FormatError::InvalidTimestamp(text.to_string()))
}

/// Parse a day-first local timestamp
///
/// Accepts `/`, `-` or `.` as date separator, with or without seconds, and
/// a bare date (midnight). Year-first ISO text is accepted too, since an
/// unambiguous year-first value is never misread as day-first.
///
/// # Examples
///
/// ```
/// # use chrono::NaiveDate;
/// # use elia_client::timestamps::parse_day_first;
/// let expected = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap().and_hms_opt(13, 15, 0).unwrap();
/// assert_eq!(parse_day_first("04/03/2024 13:15").unwrap(), expected);
/// assert_eq!(parse_day_first("04.03.2024 13:15:00").unwrap(), expected);
/// assert_eq!(parse_day_first("2024-03-04T13:15:00").unwrap(), expected);
/// assert!(parse_day_first("2024/03/04 13:15").is_err());
/// ```
pub fn parse_day_first(text: &str) -> Result<NaiveDateTime, FormatError> {
    let trimmed = text.trim();

    if let Some(dt) = DAY_FIRST_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
    {
        return Ok(dt);
    }

    if let Some(date) = DAY_FIRST_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
    {
        return date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| FormatError::InvalidTimestamp(text.to_string()));
    }

    parse_iso_naive(trimmed)
}

/// Combine a date cell and a quarter label such as `"02:15 - 02:30"`
///
/// Only the first five characters of the label (`HH:MM`) are used.
///
/// # Examples
///
/// ```
/// # use chrono::NaiveDate;
/// # use elia_client::timestamps::parse_date_and_quarter;
/// let ts = parse_date_and_quarter("27/10/2024", "02:15 - 02:30").unwrap();
/// assert_eq!(ts, NaiveDate::from_ymd_opt(2024, 10, 27).unwrap().and_hms_opt(2, 15, 0).unwrap());
/// ```
pub fn parse_date_and_quarter(date: &str, quarter: &str) -> Result<NaiveDateTime, FormatError> {
    let label: String = quarter.trim_start().chars().take(QUARTER_LABEL_LEN).collect();
    if label.chars().count() < QUARTER_LABEL_LEN {
        return Err(FormatError::InvalidTimestamp(format!(
            "quarter label too short: {:?}",
            quarter
        )));
    }
    parse_day_first(&format!("{} {}", date.trim(), label))
}

/// Parse ISO text carrying an explicit UTC offset and convert it to UTC
///
/// # Examples
///
/// ```
/// # use chrono::{TimeZone, Utc};
/// # use elia_client::timestamps::parse_offset_datetime;
/// let summer = parse_offset_datetime("2024-07-01T00:15:00+02:00").unwrap();
/// assert_eq!(summer, Utc.with_ymd_and_hms(2024, 6, 30, 22, 15, 0).unwrap());
/// assert!(parse_offset_datetime("2024-07-01T00:15:00").is_err());
/// ```
pub fn parse_offset_datetime(text: &str) -> Result<DateTime<Utc>, FormatError> {
    let trimmed = text.trim();
    DateTime::parse_from_rfc3339(trimmed)
        .or_else(|_| DateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f%z"))
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| FormatError::InvalidTimestamp(text.to_string()))
}

/// Decode a `/Date(<epoch ms><±hhmm>)/` value
///
/// The leading 10 digits are epoch seconds in UTC; the offset suffix is
/// checked for shape and otherwise ignored.
///
/// # Examples
///
/// ```
/// # use chrono::{TimeZone, Utc};
/// # use elia_client::timestamps::parse_epoch_date;
/// let ts = parse_epoch_date("/Date(1632802500000+0200)/").unwrap();
/// assert_eq!(ts, Utc.timestamp_opt(1632802500, 0).unwrap());
/// assert!(parse_epoch_date("2021-09-28T04:15:00").is_err());
/// ```
pub fn parse_epoch_date(text: &str) -> Result<DateTime<Utc>, FormatError> {
    let invalid = || FormatError::InvalidTimestamp(text.to_string());

    let inner = text
        .trim()
        .strip_prefix("/Date(")
        .and_then(|rest| rest.strip_suffix(")/"))
        .ok_or_else(invalid)?;

    let digits_end = inner
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(inner.len());
    let (digits, suffix) = inner.split_at(digits_end);

    let suffix_ok = suffix.is_empty()
        || (suffix.len() == 5
            && (suffix.starts_with('+') || suffix.starts_with('-'))
            && suffix[1..].chars().all(|c| c.is_ascii_digit()));

    if digits.len() < 10 || !suffix_ok {
        return Err(invalid());
    }

    let seconds: i64 = digits[..10].parse().map_err(|_| invalid())?;
    Utc.timestamp_opt(seconds, 0).single().ok_or_else(invalid)
}

/// Classify a column of timestamp texts
///
/// Every entry must share one shape: offset-bearing or epoch-decorated
/// (instants), or naive (wall-clock). A column mixing both is malformed.
pub fn classify_timestamps<S: AsRef<str>>(texts: &[S]) -> Result<RawTimestamps, FormatError> {
    let Some(first) = texts.first() else {
        return Ok(RawTimestamps::Instants(Vec::new()));
    };

    let first = first.as_ref();
    if first.trim_start().starts_with("/Date(") {
        return texts
            .iter()
            .map(|t| parse_epoch_date(t.as_ref()))
            .collect::<Result<Vec<_>, _>>()
            .map(RawTimestamps::Instants);
    }

    if parse_offset_datetime(first).is_ok() {
        texts
            .iter()
            .map(|t| parse_offset_datetime(t.as_ref()))
            .collect::<Result<Vec<_>, _>>()
            .map(RawTimestamps::Instants)
    } else {
        texts
            .iter()
            .map(|t| parse_iso_naive(t.as_ref()))
            .collect::<Result<Vec<_>, _>>()
            .map(RawTimestamps::Local)
    }
}

// ============================================================================
// Localization
// ============================================================================

#[derive(Clone, Copy)]
enum Resolution {
    Fixed(DateTime<Utc>),
    Ambiguous {
        early: DateTime<Utc>,
        late: DateTime<Utc>,
    },
}

/// Localize wall-clock times to `tz` and convert to UTC, inferring DST
///
/// Unambiguous times map directly. For each contiguous run of ambiguous
/// times (the repeated hour of a fall-back transition) the run must step
/// backwards exactly once: entries before the step take the summer offset,
/// entries from the step on take the winter offset.
///
/// # Errors
///
/// - [`AmbiguousTimeError::NonExistent`] for a time inside a spring-forward gap
/// - [`AmbiguousTimeError::NoRepeatedTimes`] for an ambiguous run that never repeats
/// - [`AmbiguousTimeError::InconsistentOrder`] for a run that steps back more than once
pub fn localize_infer(
    local: &[NaiveDateTime],
    tz: Tz,
) -> Result<Vec<DateTime<Utc>>, AmbiguousTimeError> {
    let resolutions = local
        .iter()
        .map(|naive| match tz.from_local_datetime(naive) {
            LocalResult::Single(dt) => Ok(Resolution::Fixed(dt.with_timezone(&Utc))),
            LocalResult::Ambiguous(a, b) => {
                let (a, b) = (a.with_timezone(&Utc), b.with_timezone(&Utc));
                Ok(Resolution::Ambiguous {
                    early: a.min(b),
                    late: a.max(b),
                })
            }
            LocalResult::None => Err(AmbiguousTimeError::NonExistent(format!(
                "{} does not exist in {}",
                naive,
                tz.name()
            ))),
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut out = Vec::with_capacity(local.len());
    let mut i = 0;
    while i < resolutions.len() {
        match resolutions[i] {
            Resolution::Fixed(dt) => {
                out.push(dt);
                i += 1;
            }
            Resolution::Ambiguous { .. } => {
                let start = i;
                let mut candidates = Vec::new();
                while let Some(Resolution::Ambiguous { early, late }) = resolutions.get(i) {
                    candidates.push((*early, *late));
                    i += 1;
                }
                out.extend(resolve_ambiguous_run(&local[start..i], &candidates, tz)?);
            }
        }
    }

    Ok(out)
}

/// Pick the earlier or later instant of each `(early, late)` pair in a run
fn resolve_ambiguous_run(
    local: &[NaiveDateTime],
    candidates: &[(DateTime<Utc>, DateTime<Utc>)],
    tz: Tz,
) -> Result<Vec<DateTime<Utc>>, AmbiguousTimeError> {
    let steps_back: Vec<usize> = (1..local.len())
        .filter(|&j| local[j] <= local[j - 1])
        .collect();

    let switch = match steps_back.as_slice() {
        [] => {
            return Err(AmbiguousTimeError::NoRepeatedTimes(format!(
                "cannot infer DST offset for {} in {}: no repeated times",
                local[0],
                tz.name()
            )));
        }
        [j] => *j,
        _ => {
            return Err(AmbiguousTimeError::InconsistentOrder(format!(
                "ambiguous times starting at {} step back {} times",
                local[0],
                steps_back.len()
            )));
        }
    };

    Ok(candidates
        .iter()
        .enumerate()
        .map(|(idx, &(early, late))| if idx < switch { early } else { late })
        .collect())
}

/// Resolve a raw timestamp index to UTC instants
///
/// Instants pass through; wall-clock times go through [`localize_infer`].
pub fn normalize(raw: RawTimestamps, tz: Tz) -> Result<Vec<DateTime<Utc>>, AmbiguousTimeError> {
    match raw {
        RawTimestamps::Instants(instants) => Ok(instants),
        RawTimestamps::Local(local) => localize_infer(&local, tz),
    }
}

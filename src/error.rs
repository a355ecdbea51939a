//! Error types for the Elia client
//!
//! Every failure is terminal for the call in progress:
//! - Network errors (unreachable host, non-2xx status, timeout)
//! - Format errors (expected structure absent, malformed timestamps, missing channels)
//! - Ambiguous time errors (DST inference failed)

use std::fmt;

/// Top-level error type for the Elia client
///
/// Supports automatic conversion from specific error types via From trait
#[derive(Debug)]
pub enum EliaError {
    /// Fetch failure
    Network(NetworkError),

    /// Payload did not have the expected structure
    Format(FormatError),

    /// Local timestamps could not be resolved to UTC
    AmbiguousTime(AmbiguousTimeError),

    /// Request or configuration rejected before any fetch
    InvalidRequest(String),
}

impl fmt::Display for EliaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EliaError::Network(e) => write!(f, "Network error: {}", e),
            EliaError::Format(e) => write!(f, "Format error: {}", e),
            EliaError::AmbiguousTime(e) => write!(f, "Ambiguous time error: {}", e),
            EliaError::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
        }
    }
}

impl std::error::Error for EliaError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EliaError::Network(e) => Some(e),
            EliaError::Format(e) => Some(e),
            EliaError::AmbiguousTime(e) => Some(e),
            EliaError::InvalidRequest(_) => None,
        }
    }
}

impl From<NetworkError> for EliaError {
    fn from(err: NetworkError) -> Self {
        EliaError::Network(err)
    }
}

impl From<FormatError> for EliaError {
    fn from(err: FormatError) -> Self {
        EliaError::Format(err)
    }
}

impl From<AmbiguousTimeError> for EliaError {
    fn from(err: AmbiguousTimeError) -> Self {
        EliaError::AmbiguousTime(err)
    }
}

/// Fetch errors
///
/// Occurs while retrieving a raw payload from a publication endpoint
#[derive(Debug, Clone)]
pub enum NetworkError {
    /// Server answered with a non-2xx status
    ///
    /// The body is kept (truncated) for debugging
    HttpError { status: u16, body: String },

    /// Per-fetch timeout elapsed before the response completed
    Timeout { url: String },

    /// Connection, DNS or TLS failure
    Transport(String),

    /// URL could not be built from the endpoint template
    InvalidUrl(String),
}

impl fmt::Display for NetworkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkError::HttpError { status, body } => {
                write!(f, "HTTP {} error: {}", status, body)
            }
            NetworkError::Timeout { url } => write!(f, "Request timed out: {}", url),
            NetworkError::Transport(msg) => write!(f, "Transport failure: {}", msg),
            NetworkError::InvalidUrl(url) => write!(f, "Invalid URL: '{}'", url),
        }
    }
}

impl std::error::Error for NetworkError {}

/// Payload structure errors
///
/// Occurs when a response does not look like the dataset it was fetched as
#[derive(Debug, Clone, PartialEq)]
pub enum FormatError {
    /// Expected element path matched nothing
    ///
    /// Example: a solar payload parsed with the wind element paths
    ElementPathNotFound(String),

    /// A field yielded a different number of entries than the timestamp index
    LengthMismatch {
        field: String,
        expected: usize,
        actual: usize,
    },

    /// Timestamp text did not match the expected representation
    ///
    /// Example: "/Date(abc)/" in an imbalance volume record
    InvalidTimestamp(String),

    /// Numeric cell could not be parsed
    InvalidNumber(String),

    /// Named measurement channel absent from a response
    ///
    /// Example: no "R3_FLEX" measurement in the imbalance volume feed
    MissingChannel(String),

    /// Required table column absent
    MissingColumn(String),

    /// Two blocks disagree on the value of a shared timestamp
    ConflictingDuplicate { timestamp: String, column: String },

    /// XML syntax error
    Xml(String),

    /// JSON syntax or schema error
    Json(String),

    /// Workbook could not be opened or read
    Spreadsheet(String),

    /// CSV serialization error
    Csv(String),

    /// Body bytes are not valid in the declared text encoding
    Encoding(String),

    /// Response body was empty where data was expected
    EmptyResponse,
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatError::ElementPathNotFound(path) => {
                write!(
                    f,
                    "No elements found at path '{}' (wrong dataset kind or upstream schema change)",
                    path
                )
            }
            FormatError::LengthMismatch {
                field,
                expected,
                actual,
            } => {
                write!(
                    f,
                    "Field '{}' has {} entries, expected {} (one per timestamp)",
                    field, actual, expected
                )
            }
            FormatError::InvalidTimestamp(val) => write!(f, "Invalid timestamp: '{}'", val),
            FormatError::InvalidNumber(val) => write!(f, "Invalid number: '{}'", val),
            FormatError::MissingChannel(name) => {
                write!(f, "Missing measurement channel: '{}'", name)
            }
            FormatError::MissingColumn(col) => write!(f, "Missing required column: '{}'", col),
            FormatError::ConflictingDuplicate { timestamp, column } => {
                write!(
                    f,
                    "Conflicting values for column '{}' at duplicate timestamp {}",
                    column, timestamp
                )
            }
            FormatError::Xml(msg) => write!(f, "XML error: {}", msg),
            FormatError::Json(msg) => write!(f, "JSON error: {}", msg),
            FormatError::Spreadsheet(msg) => write!(f, "Spreadsheet error: {}", msg),
            FormatError::Csv(msg) => write!(f, "CSV error: {}", msg),
            FormatError::Encoding(msg) => write!(f, "Text decoding error: {}", msg),
            FormatError::EmptyResponse => write!(f, "Response body is empty"),
        }
    }
}

impl std::error::Error for FormatError {}

/// DST resolution errors
///
/// Occurs when local wall-clock times cannot be mapped to a single UTC instant
#[derive(Debug, Clone, PartialEq)]
pub enum AmbiguousTimeError {
    /// Ambiguous local times without a repeat to infer the transition from
    NoRepeatedTimes(String),

    /// Local time falls in the spring-forward gap
    NonExistent(String),

    /// Ambiguous run goes backwards more than once
    InconsistentOrder(String),
}

impl fmt::Display for AmbiguousTimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AmbiguousTimeError::NoRepeatedTimes(local) => {
                write!(
                    f,
                    "Cannot infer DST offset for {}: no repeated local times in block",
                    local
                )
            }
            AmbiguousTimeError::NonExistent(local) => {
                write!(f, "Local time {} does not exist (DST gap)", local)
            }
            AmbiguousTimeError::InconsistentOrder(local) => {
                write!(
                    f,
                    "Cannot infer DST offset for {}: ambiguous block is not chronological",
                    local
                )
            }
        }
    }
}

impl std::error::Error for AmbiguousTimeError {}

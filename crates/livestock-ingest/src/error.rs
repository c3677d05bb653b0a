//! Error taxonomy for the ingestion pipeline
//!
//! - [`FetchError`] and [`ParseError`] abort a run.
//! - [`NormalizationError`] is per record; the record is skipped and counted.
//! - [`UploadError`] is per row; sibling rows in the same batch still commit.

use reqwest::StatusCode;
use thiserror::Error;

/// Result type for run-level operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// Failure that aborts an ingestion run
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Upstream request failed
#[derive(Debug, Error)]
#[error(
    "Fetch failed for {url}{}: {reason}",
    .status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default()
)]
pub struct FetchError {
    pub url: String,
    pub status: Option<u16>,
    pub reason: String,
    retriable: bool,
}

impl FetchError {
    /// Connection-level failure; timeouts and connect errors are transient
    pub fn transport(url: impl Into<String>, err: &reqwest::Error) -> Self {
        Self {
            url: url.into(),
            status: err.status().map(|s| s.as_u16()),
            reason: err.to_string(),
            retriable: err.is_timeout() || err.is_connect() || err.is_request(),
        }
    }

    /// Non-success HTTP status; 5xx and 429 are transient
    pub fn http(url: impl Into<String>, status: StatusCode, reason: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status: Some(status.as_u16()),
            reason: reason.into(),
            retriable: status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS,
        }
    }

    /// The request succeeded but the requested report does not exist
    pub fn missing(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status: None,
            reason: reason.into(),
            retriable: false,
        }
    }

    pub fn is_retriable(&self) -> bool {
        self.retriable
    }
}

/// Upstream payload could not be decoded; never retried
#[derive(Debug, Error)]
#[error("Failed to parse {context}: {message}")]
pub struct ParseError {
    pub context: String,
    pub message: String,
}

impl ParseError {
    pub fn new(context: impl Into<String>, message: impl ToString) -> Self {
        Self {
            context: context.into(),
            message: message.to_string(),
        }
    }
}

/// A single raw record could not be mapped to an observation row
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizationError {
    #[error("Missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("Invalid date in {field}: {value:?}")]
    InvalidDate { field: &'static str, value: String },

    #[error("Date offset {offset} cannot be resolved without a report date")]
    UnresolvableDateOffset { offset: i64 },

    #[error("Unrecognized category: {category:?}")]
    UnrecognizedCategory { category: String },
}

impl NormalizationError {
    /// Stable label used to group failures in run summaries
    pub fn kind(&self) -> &'static str {
        match self {
            NormalizationError::MissingField { .. } => "missing_field",
            NormalizationError::InvalidDate { .. } => "invalid_date",
            NormalizationError::UnresolvableDateOffset { .. } => "unresolvable_date_offset",
            NormalizationError::UnrecognizedCategory { .. } => "unrecognized_category",
        }
    }
}

/// The destination store did not persist a row
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadError {
    /// The store rejected this row; other rows in the batch are unaffected
    #[error("Row rejected: {0}")]
    Rejected(String),

    /// The batch transaction could not be opened or committed
    #[error("Batch aborted: {0}")]
    BatchAborted(String),
}

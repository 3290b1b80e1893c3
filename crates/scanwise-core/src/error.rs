//! Error types for Scanwise
//!
//! `Error` covers storage, configuration and I/O. Pipeline stages have their
//! own closed error enums in `pipeline`, which all map onto [`ErrorKind`].

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Prompt error: {0}")]
    Prompt(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Closed set of failure kinds a caller can render for a user
///
/// Every stage error in the pipeline, the summarizer and the code analyzer
/// reports one of these through its `kind()` method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Input text was empty
    EmptyInput,
    /// Language model unreachable, rate limited, timed out or returned an error
    UpstreamFailure,
    /// Model output was not JSON after fence stripping
    MalformedJson,
    /// Model output was JSON but did not match the receipt schema
    SchemaMismatch,
    /// No items or a zero total, so spending cannot be aggregated
    InsufficientData,
    /// Text extraction returned an error marker or nothing
    ExtractionFailed,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EmptyInput => "empty_input",
            Self::UpstreamFailure => "upstream_failure",
            Self::MalformedJson => "malformed_json",
            Self::SchemaMismatch => "schema_mismatch",
            Self::InsufficientData => "insufficient_data",
            Self::ExtractionFailed => "extraction_failed",
        }
    }

    /// Short message suitable for showing to an end user
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::EmptyInput => "No text was provided to analyze.",
            Self::UpstreamFailure => {
                "The AI service could not be reached or did not respond in time. Please try again."
            }
            Self::MalformedJson => "The AI service returned an unreadable response.",
            Self::SchemaMismatch => "The receipt could not be read: the total or items were missing or invalid.",
            Self::InsufficientData => "The receipt has no items or a zero total, so spending cannot be analyzed.",
            Self::ExtractionFailed => "No text could be extracted from the uploaded file.",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

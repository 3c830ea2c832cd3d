//! Error types for tcqc
//!
//! One [`Error`] enum covers every crate of the workspace.
//!
//! Errors are local to the entity that produced them: ingestion rejects a single
//! record, the hierarchy walk drops a single leg, the classifier fails a single
//! aggregate. Callers collect them into reports instead of aborting the batch.

use std::io;
use thiserror::Error;

/// Result type alias for tcqc operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for tcqc
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (reading a stored record or a config file)
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// A required record field is absent
    #[error("Missing field '{field}' in {context}")]
    MissingField {
        /// Dotted path of the missing field
        field: String,
        /// Record the field was expected in
        context: String,
    },

    /// A record field is present but has the wrong shape
    #[error("Invalid field '{field}': {reason}")]
    InvalidField {
        /// Dotted path of the field
        field: String,
        /// What was wrong with it
        reason: String,
    },

    /// Test-type code outside the fixed enumeration
    #[error("Unrecognized test type code: {0}")]
    UnknownTestType(String),

    /// Device could not be found by serial number
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// Serial number does not match any known layout pattern
    #[error("Unrecognized serial number pattern: {0}")]
    UnrecognizedSerial(String),

    /// Session name matches neither the warm nor the cold rules
    #[error("Unrecognized section: {0}")]
    UnrecognizedSection(String),

    /// More than one candidate satisfied a match that must be unique
    #[error("Ambiguous {what}: {candidates} candidates")]
    AmbiguousMatch {
        /// What was being matched
        what: String,
        /// Number of candidates found
        candidates: usize,
    },

    /// A disambiguation step produced no answer
    #[error("Unresolved {0}")]
    Unresolved(String),

    /// A results series could not be read as numbers
    #[error("Malformed series '{code}': {reason}")]
    MalformedSeries {
        /// Results code of the series
        code: String,
        /// What was wrong with it
        reason: String,
    },

    /// Scan name is not listed in the run's scans
    #[error("Scan not found: {0}")]
    ScanNotFound(String),

    /// Configuration could not be parsed or is invalid
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::SerializationError(e.to_string())
    }
}

impl Error {
    /// Build a `MissingField` error
    pub fn missing(field: impl Into<String>, context: impl Into<String>) -> Self {
        Error::MissingField {
            field: field.into(),
            context: context.into(),
        }
    }

    /// Build an `InvalidField` error
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error only affects one aggregate and should not stop the batch
    ///
    /// I/O and configuration failures happen before any record is classified,
    /// so they are the only ones that end an invocation.
    pub fn is_local(&self) -> bool {
        !matches!(self, Error::IoError(_) | Error::ConfigError(_))
    }
}

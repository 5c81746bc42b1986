//! Error types for the median-stream pipeline.
//!
//! Clean error handling using `thiserror` for ergonomic error definitions.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, MedianStreamError>;

/// Main error type for pipeline operations.
#[derive(Error, Debug)]
pub enum MedianStreamError {
    /// Configuration is missing or inconsistent (fatal at startup)
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Input file does not exist
    #[error("Input file not found: {0}")]
    FileNotFound(PathBuf),

    /// Input path exists but is not a regular file
    #[error("Not a regular file: {0}")]
    NotRegularFile(PathBuf),

    /// Initial memory-mapping of an input file failed (fatal for that reader)
    #[error("Failed to map {path}: {reason}")]
    MappingFailure { path: PathBuf, reason: String },

    /// Quantile requested outside the valid [0, 1] domain
    #[error("Quantile {0} is outside [0, 1]")]
    QuantileOutOfRange(f64),

    /// Quantile requested before any value was added
    #[error("Quantile requested on an empty digest")]
    EmptyDigest,

    /// Write to the output sink failed (fatal, triggers shutdown)
    #[error("Output sink failure on {path}: {source}")]
    Output {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Generic I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with context
    #[error("Error: {0}")]
    Generic(String),
}

impl MedianStreamError {
    /// Create an `InvalidConfig` error from any string-like type.
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        MedianStreamError::InvalidConfig(msg.into())
    }

    /// Create a generic error from any string-like type.
    pub fn generic(msg: impl Into<String>) -> Self {
        MedianStreamError::Generic(msg.into())
    }
}

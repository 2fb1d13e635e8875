//! Error types for the vmg-thread-viewer library.
//!
//! This module provides custom error types using `thiserror` for better error handling
//! and more specific error messages throughout the application.

use thiserror::Error;

/// Errors that can occur in the vmg-thread-viewer library.
#[derive(Error, Debug)]
pub enum VmgError {
    /// Raw text does not match the VMG structure
    #[error("Failed to parse VMG content in {filename}: {reason}")]
    Parse {
        /// Name of the offending file
        filename: String,
        /// What was missing or malformed
        reason: String,
    },

    /// A message handed to the repository breaks the message invariants
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// Backing key-value store failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV writer errors
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// File bytes could not be decoded as UTF-16 or UTF-8 text
    #[error("Text decoding error: {0}")]
    Decode(String),

    /// A snapshot failed structural validation before import
    #[error("Invalid snapshot: {0}")]
    InvalidSnapshot(String),

    /// Import would exceed the configured storage budget
    #[error("Storage quota exceeded: {required} bytes required, limit is {limit} bytes")]
    QuotaExceeded {
        /// Estimated bytes after the import
        required: usize,
        /// Configured budget
        limit: usize,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Convenience type alias for Result with `VmgError`
pub type Result<T> = std::result::Result<T, VmgError>;

impl VmgError {
    /// Build a parse error for `filename`
    pub fn parse(filename: &str, reason: impl Into<String>) -> Self {
        Self::Parse {
            filename: filename.to_string(),
            reason: reason.into(),
        }
    }

    /// True for errors that only affect a single input file
    #[must_use]
    pub const fn is_per_file(&self) -> bool {
        matches!(self, Self::Parse { .. } | Self::Decode(_))
    }
}

impl From<sled::Error> for VmgError {
    fn from(err: sled::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

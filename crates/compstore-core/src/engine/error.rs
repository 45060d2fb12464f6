//! # Compstore Engine Errors
//!
//! Defines the crate-wide [`Error`] type.
//!
//! Each subsystem owns a typed error enum ([`XmlError`],
//! [`SerializationError`], [`StorageSystemError`], [`StoreError`]); this
//! module folds them into one error so storage backends, sessions and stores
//! can propagate with `?` regardless of where a failure started.
use std::path::PathBuf;
use std::result::Result as StdResult;

use thiserror::Error as ThisError;

use crate::serialization::error::SerializationError;
use crate::storage::error::StorageSystemError;
use crate::store::error::StoreError;
use crate::xml::error::XmlError;

/// Custom error type for the persistence engine
#[derive(Debug, ThisError)]
pub enum Error {
    /// Storage document could not be parsed
    #[error("XML error: {0}")]
    Xml(#[from] XmlError),

    /// A component state did not match its expected shape
    #[error("Serialization error: {0}")]
    Serialization(#[from] SerializationError),

    /// Specific, typed storage system error
    #[error("Storage system error: {0}")]
    StorageSystem(#[from] StorageSystemError),

    /// Store lifecycle, version or read-only failure
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Engine configuration could not be read or written
    #[error("Configuration error in {format}: {message}")]
    Config { format: String, message: String },

    /// One or more storages failed during a save; the rest were committed
    #[error("Save failed for {} target(s): {}", failures.len(), summarize(failures))]
    SaveFailed { failures: Vec<OperationFailure> },

    /// Generic error with message
    #[error("Error: {0}")]
    Other(String),
}

/// A failure isolated to one component or one storage.
#[derive(Debug)]
pub struct OperationFailure {
    /// Component name or storage key the failure belongs to
    pub target: String,
    pub error: Error,
}

impl OperationFailure {
    pub fn new(target: impl Into<String>, error: impl Into<Error>) -> Self {
        Self {
            target: target.into(),
            error: error.into(),
        }
    }
}

fn summarize(failures: &[OperationFailure]) -> String {
    failures
        .iter()
        .map(|failure| format!("{} ({})", failure.target, failure.error))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Shorthand for Result with our Error type
pub type Result<T> = StdResult<T, Error>;

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Other(msg.to_string())
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Other(msg)
    }
}

// Helper to create an I/O error with context, wraps StorageSystemError::Io
impl Error {
    pub fn io(source: std::io::Error, operation: impl Into<String>, path: PathBuf) -> Self {
        Error::StorageSystem(StorageSystemError::io(source, operation, path))
    }

    pub fn config(format: impl Into<String>, message: impl ToString) -> Self {
        Error::Config {
            format: format.into(),
            message: message.to_string(),
        }
    }

    /// True when the error (or the storage error inside it) reports read-only files.
    pub fn is_read_only(&self) -> bool {
        matches!(
            self,
            Error::Store(StoreError::ReadOnlyFiles(_))
                | Error::StorageSystem(StorageSystemError::ReadOnly(_))
        )
    }
}

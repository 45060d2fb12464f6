//! # Compstore Storage System Errors
//!
//! Defines error types specific to storage backends and their manager.
//!
//! This module includes [`StorageSystemError`], covering file I/O with path
//! and operation context, unparsable storage files, macro resolution
//! failures, splitter failures and session misuse.
use std::path::PathBuf;

use thiserror::Error;

use crate::xml::error::XmlError;

#[derive(Debug, Error)]
pub enum StorageSystemError {
    #[error("I/O error during operation '{operation}' on path '{path}': {source}")]
    Io {
        path: PathBuf,
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Storage file '{path}' could not be parsed: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: XmlError,
    },

    #[error("Path template '{template}' has unresolved macros: {}", unresolved.join(", "))]
    PathResolutionFailed {
        template: String,
        unresolved: Vec<String>,
    },

    #[error("Invalid path provided: '{path}': {reason}")]
    InvalidPath { path: PathBuf, reason: String },

    #[error("Attempted to write to a read-only resource: {0}")]
    ReadOnly(PathBuf),

    #[error("Splitter '{splitter}' failed: {message}")]
    Splitter { splitter: String, message: String },

    #[error("No storage class registered under '{0}'")]
    UnknownStorageClass(String),

    #[error("A save session is already open for this storage manager")]
    SessionInProgress,

    #[error("Lock guarding {0} was poisoned by a panicking thread")]
    LockPoisoned(String),
}

// Helper for creating Io errors, ensuring path is always included.
impl StorageSystemError {
    pub fn io(source: std::io::Error, operation: impl Into<String>, path: PathBuf) -> Self {
        StorageSystemError::Io {
            source,
            operation: operation.into(),
            path,
        }
    }

    pub fn splitter(splitter: impl Into<String>, message: impl Into<String>) -> Self {
        StorageSystemError::Splitter {
            splitter: splitter.into(),
            message: message.into(),
        }
    }
}

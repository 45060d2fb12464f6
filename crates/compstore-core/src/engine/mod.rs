//! Crate-wide plumbing: the aggregated error type, fixed names used in the
//! storage format and the engine configuration.
pub mod config;
pub mod constants;
pub mod error;

pub use config::{ConfigFormat, EngineConfig};
pub use error::{Error, OperationFailure, Result};

// Test module declaration
#[cfg(test)]
mod tests;

//! Error types for the servo server
//!
//! `ServoError` covers everything a single command can fail with and is always
//! turned into an `error` response. `ServerError` covers the listener itself.

use crate::driver::DriverError;
use thiserror::Error;

/// Failure of one servo bank operation
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ServoError {
    /// Servo index outside `0..=max`
    #[error("Servo index {index} out of range (0-{max})")]
    Range { index: i64, max: usize },

    /// Rejected parameters, such as a zero sweep step or an inverted pulse range
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The board refused or failed a write
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),
}

/// Failure of the listening server
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

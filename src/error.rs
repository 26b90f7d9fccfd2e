//! Error types for jitterbuf
//!
//! Defines the crate error type using thiserror for clear error propagation.
//!
//! Runtime overrun and malformed frames are deliberately *not* represented
//! here: the buffer's contract is best-effort smoothing that never fails the
//! producer, so those conditions are recovered locally, counted, and logged.

use std::time::Duration;
use thiserror::Error;

/// Main error type for jitterbuf
#[derive(Error, Debug)]
pub enum Error {
    /// Rejected configuration at construction
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Rejected call argument (e.g. a payload that can never be stored)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Bounded mutex acquisition exceeded its timeout
    #[error("Lock timeout in {op} after {timeout:?}")]
    LockTimeout {
        op: &'static str,
        timeout: Duration,
    },

    /// Worker thread could not be spawned
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type using the jitterbuf Error
pub type Result<T> = std::result::Result<T, Error>;

//! Server error types.

use thiserror::Error;

/// Result type for server operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Server error types.
#[derive(Error, Debug)]
pub enum Error {
    /// Messaging failure.
    #[error("bus error: {0}")]
    Bus(#[from] tpxgate_bus::Error),

    /// Socket or thread error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Sink file error.
    #[error("sink error: {0}")]
    Sink(#[from] tpxgate_io::Error),

    /// Configuration file could not be parsed.
    #[error("config parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),

    /// Configuration values out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Detector control link failure.
    #[error("control link error: {0}")]
    Link(String),

    /// Worker could not be wired into the pipeline.
    #[error("failed to wire {worker}: {reason}")]
    Wiring { worker: String, reason: String },

    /// A worker stopped with a fault and took the pipeline down.
    #[error("worker {worker} failed: {reason}")]
    WorkerFailed { worker: String, reason: String },
}

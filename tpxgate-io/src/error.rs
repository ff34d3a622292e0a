//! I/O error types.

use thiserror::Error;

/// Result type for I/O operations.
pub type Result<T> = std::result::Result<T, Error>;

/// I/O error types.
#[derive(Error, Debug)]
pub enum Error {
    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid file format.
    #[error("invalid file format: {0}")]
    InvalidFormat(String),

    /// Decoder error.
    #[error("decode error: {0}")]
    Decode(#[from] tpxgate_tpx::Error),

    /// Core library error.
    #[error("core error: {0}")]
    CoreError(#[from] tpxgate_core::Error),
}

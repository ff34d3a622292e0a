//! TPX3-specific error types.

use thiserror::Error;

/// Result type for TPX3 operations.
pub type Result<T> = std::result::Result<T, Error>;

/// TPX3-specific error types.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    /// Buffer length is not a whole number of 64-bit words.
    #[error("received a chunk of {0} bytes; expected a multiple of 8")]
    InvalidLength(usize),
}

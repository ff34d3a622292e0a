//! Error types for tpxgate-core.

use thiserror::Error;

/// Result type alias for tpxgate-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    /// A packed record buffer whose length is not a multiple of 8.
    #[error("packed buffer length {0} is not a multiple of 8")]
    InvalidPackedLength(usize),
}

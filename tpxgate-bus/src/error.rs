//! Bus error types.

use std::time::Duration;
use thiserror::Error;

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Bus error types.
#[derive(Error, Debug)]
pub enum Error {
    /// Socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Address that is not `tcp://host:port` or does not resolve.
    #[error("invalid endpoint address: {0}")]
    InvalidAddress(String),

    /// Frame length prefix above the accepted maximum.
    #[error("frame of {0} bytes exceeds the maximum frame length")]
    FrameTooLarge(usize),

    /// Control message with a size that is not a whole number of words.
    #[error("malformed control message ({0} bytes)")]
    MalformedMessage(usize),

    /// No reply within the client timeout.
    #[error("no reply within {0:?}")]
    Timeout(Duration),

    /// The remote end closed the connection.
    #[error("peer disconnected")]
    Disconnected,
}

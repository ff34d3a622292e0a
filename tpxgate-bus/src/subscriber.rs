//! Data-plane subscriber.

use crate::frame::{FrameReader, ReadStatus};
use crate::{EndpointAddress, Result};
use std::net::TcpStream;

/// Outcome of one [`Subscriber::poll`].
#[derive(Debug, PartialEq, Eq)]
pub enum Delivery {
    /// One published message.
    Message(Vec<u8>),
    /// Nothing available right now.
    Empty,
    /// The publisher went away.
    Disconnected,
}

/// Receives frames from one [`Publisher`](crate::Publisher).
pub struct Subscriber {
    stream: TcpStream,
    reader: FrameReader,
    address: EndpointAddress,
    disconnected: bool,
}

impl Subscriber {
    /// Connects to a publisher.
    ///
    /// # Errors
    /// Returns an error if the address does not resolve or the connection
    /// is refused.
    pub fn connect(address: &EndpointAddress) -> Result<Self> {
        let stream = TcpStream::connect(address.socket_addr()?)?;
        stream.set_nonblocking(true)?;
        stream.set_nodelay(true)?;
        Ok(Self {
            stream,
            reader: FrameReader::new(),
            address: address.clone(),
            disconnected: false,
        })
    }

    /// Publisher address.
    #[must_use]
    pub fn address(&self) -> &EndpointAddress {
        &self.address
    }

    /// Returns at most one message without blocking.
    ///
    /// # Errors
    /// Returns an error on a socket failure or a corrupt frame.
    pub fn poll(&mut self) -> Result<Delivery> {
        if self.disconnected {
            return Ok(Delivery::Disconnected);
        }
        match self.reader.poll(&mut self.stream)? {
            ReadStatus::Frame(payload) => Ok(Delivery::Message(payload)),
            ReadStatus::Pending => Ok(Delivery::Empty),
            ReadStatus::Closed => {
                self.disconnected = true;
                Ok(Delivery::Disconnected)
            }
        }
    }
}

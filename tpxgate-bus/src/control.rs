//! Control-plane request/reply endpoints.

use crate::frame::{encode_frame, FrameReader, ReadStatus};
use crate::protocol::{self, Reply, Request};
use crate::{EndpointAddress, Error, Result};
use std::io::{ErrorKind, Write};
use std::net::{TcpListener, TcpStream};
use std::time::{Duration, Instant};

const REPLY_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

struct ControlPeer {
    stream: TcpStream,
    reader: FrameReader,
}

/// Writes a whole frame on a non-blocking stream, blocking briefly.
fn write_frame_blocking(stream: &mut TcpStream, payload: &[u8]) -> Result<()> {
    let frame = encode_frame(payload)?;
    stream.set_nonblocking(false)?;
    stream.set_write_timeout(Some(REPLY_WRITE_TIMEOUT))?;
    let result = stream.write_all(&frame);
    stream.set_nonblocking(true)?;
    result.map_err(Error::from)
}

/// Reply side of the control plane.
///
/// Several clients may be connected; each [`poll`](Self::poll) serves at
/// most one request and writes exactly one reply for it.
pub struct ControlServer {
    listener: TcpListener,
    address: EndpointAddress,
    peers: Vec<ControlPeer>,
    next_peer: usize,
}

impl ControlServer {
    /// Binds to `port` on `host`; port 0 picks a free one.
    ///
    /// # Errors
    /// Returns an error if the socket cannot be bound.
    pub fn bind(host: &str, port: u16) -> Result<Self> {
        let listener = TcpListener::bind((host, port))?;
        listener.set_nonblocking(true)?;
        let address = EndpointAddress::from_socket_addr(listener.local_addr()?);
        log::debug!("control server bound at {address}");
        Ok(Self {
            listener,
            address,
            peers: Vec::new(),
            next_peer: 0,
        })
    }

    /// Address clients connect to.
    #[must_use]
    pub fn address(&self) -> &EndpointAddress {
        &self.address
    }

    /// Serves at most one parsed request.
    ///
    /// Malformed requests are answered with `INVALID_COMMAND_DATA` without
    /// calling `handler`. Returns whether a request was served.
    ///
    /// # Errors
    /// Returns an error on a listener failure.
    pub fn poll<F>(&mut self, handler: F) -> Result<bool>
    where
        F: FnOnce(&Request) -> Reply,
    {
        self.poll_raw(|raw| protocol::respond(raw, handler))
    }

    /// Serves at most one request, handing the raw bytes to `handler` and
    /// sending back whatever it returns.
    ///
    /// # Errors
    /// Returns an error on a listener failure.
    pub fn poll_raw<F>(&mut self, handler: F) -> Result<bool>
    where
        F: FnOnce(&[u8]) -> Vec<u8>,
    {
        self.accept_pending()?;

        let Some((index, request)) = self.next_request() else {
            return Ok(false);
        };
        let reply = handler(&request);
        if let Err(e) = write_frame_blocking(&mut self.peers[index].stream, &reply) {
            log::warn!("{}: dropping control client: {e}", self.address);
            self.peers.swap_remove(index);
        }
        Ok(true)
    }

    /// Finds the next complete request, visiting peers round-robin and
    /// removing closed ones.
    fn next_request(&mut self) -> Option<(usize, Vec<u8>)> {
        let mut visited = 0;
        while visited < self.peers.len() {
            let index = self.next_peer % self.peers.len();
            let peer = &mut self.peers[index];
            match peer.reader.poll(&mut peer.stream) {
                Ok(ReadStatus::Frame(raw)) => {
                    self.next_peer = index + 1;
                    return Some((index, raw));
                }
                Ok(ReadStatus::Pending) => {
                    self.next_peer = index + 1;
                    visited += 1;
                }
                Ok(ReadStatus::Closed) => {
                    self.peers.swap_remove(index);
                }
                Err(e) => {
                    log::warn!("{}: dropping control client: {e}", self.address);
                    self.peers.swap_remove(index);
                }
            }
        }
        None
    }

    fn accept_pending(&mut self) -> Result<()> {
        loop {
            match self.listener.accept() {
                Ok((stream, _)) => {
                    stream.set_nonblocking(true)?;
                    stream.set_nodelay(true)?;
                    self.peers.push(ControlPeer {
                        stream,
                        reader: FrameReader::new(),
                    });
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(()),
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Request side of the control plane.
///
/// Requests block until the reply arrives or the timeout expires. After a
/// timeout the connection is discarded and re-established on the next
/// request, so a late reply can never be mistaken for the next one.
pub struct ControlClient {
    address: EndpointAddress,
    stream: Option<TcpStream>,
    reader: FrameReader,
    timeout: Option<Duration>,
}

impl ControlClient {
    /// Connects to a control server.
    ///
    /// # Errors
    /// Returns an error if the connection cannot be made.
    pub fn connect(address: &EndpointAddress, timeout: Option<Duration>) -> Result<Self> {
        let mut client = Self {
            address: address.clone(),
            stream: None,
            reader: FrameReader::new(),
            timeout,
        };
        client.ensure_connected()?;
        Ok(client)
    }

    /// Server address.
    #[must_use]
    pub fn address(&self) -> &EndpointAddress {
        &self.address
    }

    /// Whether a connection is currently open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Sends a request and waits for the reply.
    ///
    /// # Errors
    /// Returns an error on timeout, disconnection or a malformed reply.
    pub fn request(&mut self, request: &Request) -> Result<Reply> {
        let raw = self.request_raw(&request.encode())?;
        Reply::decode(&raw)
    }

    /// Sends raw request bytes and returns the raw reply.
    ///
    /// # Errors
    /// Returns an error on timeout or disconnection.
    pub fn request_raw(&mut self, raw: &[u8]) -> Result<Vec<u8>> {
        let result = self.exchange(raw);
        if result.is_err() {
            self.disconnect();
        }
        result
    }

    fn exchange(&mut self, raw: &[u8]) -> Result<Vec<u8>> {
        let frame = encode_frame(raw)?;
        let timeout = self.timeout;
        let deadline = timeout.map(|t| Instant::now() + t);
        let stream = self.ensure_connected()?;
        stream.set_write_timeout(timeout)?;
        stream.write_all(&frame)?;

        loop {
            let wait = match deadline {
                Some(deadline) => {
                    let left = deadline.saturating_duration_since(Instant::now());
                    if left.is_zero() {
                        return Err(Error::Timeout(timeout.unwrap_or_default()));
                    }
                    Some(left)
                }
                None => None,
            };
            let stream = self.stream.as_mut().ok_or(Error::Disconnected)?;
            stream.set_read_timeout(wait)?;
            match self.reader.poll(stream)? {
                ReadStatus::Frame(reply) => return Ok(reply),
                ReadStatus::Pending => {}
                ReadStatus::Closed => return Err(Error::Disconnected),
            }
        }
    }

    fn ensure_connected(&mut self) -> Result<&mut TcpStream> {
        if self.stream.is_none() {
            let addr = self.address.socket_addr()?;
            let stream = match self.timeout {
                Some(t) => TcpStream::connect_timeout(&addr, t)?,
                None => TcpStream::connect(addr)?,
            };
            stream.set_nodelay(true)?;
            self.reader.clear();
            self.stream = Some(stream);
        }
        self.stream.as_mut().ok_or(Error::Disconnected)
    }

    fn disconnect(&mut self) {
        self.stream = None;
        self.reader.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Command, ErrorCode};
    use std::thread;

    fn serve_until<F>(mut server: ControlServer, requests: usize, mut handler: F)
    where
        F: FnMut(&Request) -> Reply,
    {
        let mut served = 0;
        let deadline = Instant::now() + Duration::from_secs(10);
        while served < requests && Instant::now() < deadline {
            if server.poll(&mut handler).unwrap() {
                served += 1;
            } else {
                thread::sleep(Duration::from_millis(1));
            }
        }
    }

    #[test]
    fn test_request_reply() {
        let server = ControlServer::bind("127.0.0.1", 0).unwrap();
        let address = server.address().clone();
        let handle = thread::spawn(move || {
            serve_until(server, 1, |req| Reply::ok_with(req, vec![req.payload[0] + 1]));
        });

        let mut client = ControlClient::connect(&address, Some(Duration::from_secs(5))).unwrap();
        let reply = client
            .request(&Request::with_payload(Command::SetUdpPort, vec![41]))
            .unwrap();
        assert_eq!(reply.code, Command::SetUdpPort.code());
        assert_eq!(reply.payload, vec![42]);
        handle.join().unwrap();
    }

    #[test]
    fn test_timeout_drops_connection() {
        let server = ControlServer::bind("127.0.0.1", 0).unwrap();
        let address = server.address().clone();
        let mut client =
            ControlClient::connect(&address, Some(Duration::from_millis(50))).unwrap();
        let result = client.request(&Request::new(Command::Nop));
        assert!(matches!(result, Err(Error::Timeout(_))));
        assert!(!client.is_connected());

        // the stale request is answered on the old connection and lost;
        // the next exchange gets its own reply
        let handle = thread::spawn(move || {
            serve_until(server, 2, Reply::ok);
        });
        client.timeout = Some(Duration::from_secs(5));
        let reply = client
            .request(&Request::new(Command::GetCameraId))
            .unwrap();
        assert_eq!(reply.code, Command::GetCameraId.code());
        handle.join().unwrap();
    }

    #[test]
    fn test_malformed_request_gets_reply() {
        let server = ControlServer::bind("127.0.0.1", 0).unwrap();
        let address = server.address().clone();
        let handle = thread::spawn(move || {
            serve_until(server, 1, |_| Reply::error(ErrorCode::ErrorOccurred));
        });
        let mut client = ControlClient::connect(&address, Some(Duration::from_secs(5))).unwrap();
        let raw = client.request_raw(&[1, 2, 3, 4, 5, 6]).unwrap();
        let reply = Reply::decode(&raw).unwrap();
        assert_eq!(reply.error_code(), Some(ErrorCode::InvalidCommandData));
        handle.join().unwrap();
    }
}

//! Data-plane publisher.

use crate::frame::encode_frame;
use crate::{EndpointAddress, Result};
use bytes::Bytes;
use std::io::{ErrorKind, Write};
use std::net::{TcpListener, TcpStream};

/// A frame partly written to a subscriber socket.
struct PendingFrame {
    data: Bytes,
    offset: usize,
}

struct Peer {
    stream: TcpStream,
    pending: Option<PendingFrame>,
}

enum WriteOutcome {
    Done,
    Partial(usize),
    Dead,
}

fn write_some(stream: &mut TcpStream, data: &[u8]) -> WriteOutcome {
    let mut written = 0;
    while written < data.len() {
        match stream.write(&data[written..]) {
            Ok(0) => return WriteOutcome::Dead,
            Ok(n) => written += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) if e.kind() == ErrorKind::WouldBlock => return WriteOutcome::Partial(written),
            Err(_) => return WriteOutcome::Dead,
        }
    }
    WriteOutcome::Done
}

impl Peer {
    /// Pushes any pending bytes. Returns false if the peer is gone.
    fn drain(&mut self) -> bool {
        let Some(pending) = self.pending.as_mut() else {
            return true;
        };
        match write_some(&mut self.stream, &pending.data[pending.offset..]) {
            WriteOutcome::Done => {
                self.pending = None;
                true
            }
            WriteOutcome::Partial(n) => {
                pending.offset += n;
                true
            }
            WriteOutcome::Dead => false,
        }
    }
}

/// Best-effort fan-out of frames to every connected subscriber.
///
/// Never blocks. Each subscriber holds at most one partially sent frame;
/// while it is pending, new messages for that subscriber are dropped.
/// Subscribers whose sockets fail are removed.
pub struct Publisher {
    listener: TcpListener,
    address: EndpointAddress,
    peers: Vec<Peer>,
    published: u64,
    dropped: u64,
}

impl Publisher {
    /// Binds to an OS-assigned port on `host`.
    ///
    /// # Errors
    /// Returns an error if the socket cannot be bound.
    pub fn bind(host: &str) -> Result<Self> {
        let listener = TcpListener::bind((host, 0))?;
        listener.set_nonblocking(true)?;
        let address = EndpointAddress::from_socket_addr(listener.local_addr()?);
        log::debug!("publisher bound at {address}");
        Ok(Self {
            listener,
            address,
            peers: Vec::new(),
            published: 0,
            dropped: 0,
        })
    }

    /// Address subscribers connect to.
    #[must_use]
    pub fn address(&self) -> &EndpointAddress {
        &self.address
    }

    /// Connected subscribers, as of the last publish or service call.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.peers.len()
    }

    /// Messages handed to [`publish`](Self::publish).
    #[must_use]
    pub fn published(&self) -> u64 {
        self.published
    }

    /// Per-subscriber deliveries skipped because a frame was still pending.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Sends one message to every subscriber without blocking.
    ///
    /// # Errors
    /// Returns an error on a listener failure or an oversized payload.
    pub fn publish(&mut self, payload: &[u8]) -> Result<()> {
        let frame = encode_frame(payload)?;
        self.accept_pending()?;
        self.published += 1;

        let mut dropped = 0;
        self.peers.retain_mut(|peer| {
            if !peer.drain() {
                return false;
            }
            if peer.pending.is_some() {
                dropped += 1;
                return true;
            }
            match write_some(&mut peer.stream, &frame) {
                WriteOutcome::Done => true,
                WriteOutcome::Partial(n) => {
                    peer.pending = Some(PendingFrame {
                        data: frame.clone(),
                        offset: n,
                    });
                    true
                }
                WriteOutcome::Dead => false,
            }
        });
        self.dropped += dropped;
        Ok(())
    }

    /// Accepts new subscribers and drains pending frames.
    ///
    /// # Errors
    /// Returns an error on a listener failure.
    pub fn service(&mut self) -> Result<()> {
        self.accept_pending()?;
        self.peers.retain_mut(Peer::drain);
        Ok(())
    }

    fn accept_pending(&mut self) -> Result<()> {
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    stream.set_nonblocking(true)?;
                    stream.set_nodelay(true)?;
                    log::debug!("{}: subscriber {peer} connected", self.address);
                    self.peers.push(Peer {
                        stream,
                        pending: None,
                    });
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(()),
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
    }
}

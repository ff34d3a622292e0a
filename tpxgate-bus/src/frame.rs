//! Length-prefixed framing.
//!
//! A frame is a `u32` big-endian payload length followed by the payload.
//! Encoding and decoding go through [`LengthDelimitedCodec`]; the sockets
//! themselves stay plain std streams, so the codec is driven by hand.

use crate::{Error, Result};
use bytes::{Bytes, BytesMut};
use std::io::{ErrorKind, Read};
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

/// Largest payload accepted from a peer.
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

const PREFIX_LEN: usize = 4;
const READ_CHUNK: usize = 64 * 1024;

fn codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .big_endian()
        .length_field_length(PREFIX_LEN)
        .max_frame_length(MAX_FRAME_LEN)
        .new_codec()
}

/// Encodes one frame.
///
/// # Errors
/// Returns [`Error::FrameTooLarge`] for payloads above [`MAX_FRAME_LEN`].
pub fn encode_frame(payload: &[u8]) -> Result<Bytes> {
    if payload.len() > MAX_FRAME_LEN {
        return Err(Error::FrameTooLarge(payload.len()));
    }
    let mut dst = BytesMut::with_capacity(PREFIX_LEN + payload.len());
    codec().encode(Bytes::copy_from_slice(payload), &mut dst)?;
    Ok(dst.freeze())
}

/// Outcome of one [`FrameReader::poll`].
#[derive(Debug, PartialEq, Eq)]
pub enum ReadStatus {
    /// A complete payload.
    Frame(Vec<u8>),
    /// No complete frame yet.
    Pending,
    /// The stream reached EOF.
    Closed,
}

/// Reassembles frames from a byte stream.
///
/// Works on non-blocking streams (`WouldBlock` means [`ReadStatus::Pending`])
/// and on blocking streams with a read timeout (`TimedOut` likewise).
#[derive(Debug)]
pub struct FrameReader {
    codec: LengthDelimitedCodec,
    buf: BytesMut,
}

impl Default for FrameReader {
    fn default() -> Self {
        Self {
            codec: codec(),
            buf: BytesMut::new(),
        }
    }
}

impl FrameReader {
    /// Creates an empty reader.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the next frame if one can be assembled without blocking.
    ///
    /// # Errors
    /// Returns an error on a socket failure or an oversized length prefix.
    pub fn poll<R: Read>(&mut self, src: &mut R) -> Result<ReadStatus> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            if let Some(frame) = self.take_frame()? {
                return Ok(ReadStatus::Frame(frame));
            }
            match src.read(&mut chunk) {
                Ok(0) => return Ok(ReadStatus::Closed),
                Ok(n) => self.buf.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    return Ok(ReadStatus::Pending);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Bytes buffered towards the next frame.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Discards any partial frame.
    pub fn clear(&mut self) {
        self.buf.clear();
        self.codec = codec();
    }

    fn take_frame(&mut self) -> Result<Option<Vec<u8>>> {
        match self.codec.decode(&mut self.buf) {
            Ok(frame) => Ok(frame.map(|f| f.to_vec())),
            // The codec leaves the prefix in place when it rejects a length.
            Err(e) if e.kind() == ErrorKind::InvalidData => {
                let len = self
                    .buf
                    .get(..PREFIX_LEN)
                    .and_then(|p| <[u8; PREFIX_LEN]>::try_from(p).ok())
                    .map_or(0, |p| u32::from_be_bytes(p) as usize);
                Err(Error::FrameTooLarge(len))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Yields its bytes in fixed-size pieces, then `WouldBlock`.
    struct Trickle {
        data: Vec<u8>,
        pos: usize,
        step: usize,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pos == self.data.len() {
                return Err(ErrorKind::WouldBlock.into());
            }
            let n = self.step.min(buf.len()).min(self.data.len() - self.pos);
            buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    #[test]
    fn test_frame_prefix() {
        assert_eq!(&encode_frame(b"ab").unwrap()[..], &[0, 0, 0, 2, b'a', b'b']);
        assert_eq!(&encode_frame(b"").unwrap()[..], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_reassembles_split_frames() {
        let mut data = encode_frame(b"hello").unwrap().to_vec();
        data.extend_from_slice(&encode_frame(b"").unwrap());
        data.extend_from_slice(&encode_frame(b"world!").unwrap());
        let mut src = Trickle { data, pos: 0, step: 3 };
        let mut reader = FrameReader::new();

        assert_eq!(reader.poll(&mut src).unwrap(), ReadStatus::Frame(b"hello".to_vec()));
        assert_eq!(reader.poll(&mut src).unwrap(), ReadStatus::Frame(Vec::new()));
        assert_eq!(reader.poll(&mut src).unwrap(), ReadStatus::Frame(b"world!".to_vec()));
        assert_eq!(reader.poll(&mut src).unwrap(), ReadStatus::Pending);
        assert_eq!(reader.buffered(), 0);
    }

    #[test]
    fn test_eof_is_closed() {
        let mut src = Cursor::new(vec![0u8, 0, 0]);
        let mut reader = FrameReader::new();
        assert_eq!(reader.poll(&mut src).unwrap(), ReadStatus::Closed);
    }

    #[test]
    fn test_rejects_oversized_prefix() {
        let mut src = Cursor::new(u32::MAX.to_be_bytes().to_vec());
        let mut reader = FrameReader::new();
        match reader.poll(&mut src) {
            Err(Error::FrameTooLarge(len)) => assert_eq!(len, u32::MAX as usize),
            other => panic!("expected FrameTooLarge, got {other:?}"),
        }
    }

    #[test]
    fn test_clear_drops_partial_frame() {
        let data = encode_frame(b"abcdef").unwrap();
        let mut src = Trickle { data: data[..5].to_vec(), pos: 0, step: 5 };
        let mut reader = FrameReader::new();
        assert_eq!(reader.poll(&mut src).unwrap(), ReadStatus::Pending);
        assert_eq!(reader.buffered(), 1);

        reader.clear();
        let mut next = Trickle { data: encode_frame(b"xy").unwrap().to_vec(), pos: 0, step: 8 };
        assert_eq!(reader.poll(&mut next).unwrap(), ReadStatus::Frame(b"xy".to_vec()));
    }
}

//! UDP ingest: datagrams in, packed hits out.

use crate::events::EventSender;
use crate::worker::Worker;
use crate::Result;
use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::path::Path;
use std::time::{Duration, Instant};
use tpxgate_algorithms::RateCounter;
use tpxgate_bus::protocol::unpack_string;
use tpxgate_bus::{Command, EndpointAddress, ErrorCode, Publisher, Reply, Request};
use tpxgate_io::RawChunkWriter;
use tpxgate_tpx::PacketDecoder;

/// Largest datagram accepted; longer ones are truncated by the socket.
pub const UDP_BUFFER_SIZE: usize = 40_000;

const REPORT_INTERVAL: Duration = Duration::from_secs(1);

/// Receives detector datagrams and publishes their pixel hits.
pub struct DecoderWorker {
    socket: UdpSocket,
    local: SocketAddr,
    buffer: Vec<u8>,
    decoder: PacketDecoder,
    packed: Vec<u8>,
    publisher: Publisher,
    raw_sink: Option<RawChunkWriter>,
    rate: RateCounter,
    events: EventSender,
}

impl DecoderWorker {
    /// Binds the UDP socket on `host:port` and the hit publisher on `host`.
    ///
    /// # Errors
    /// Returns an error if either socket cannot be bound.
    pub fn bind(
        host: &str,
        port: u16,
        correct_rollover: bool,
        events: &EventSender,
    ) -> Result<Self> {
        let socket = UdpSocket::bind((host, port))?;
        socket.set_nonblocking(true)?;
        let local = socket.local_addr()?;
        let publisher = Publisher::bind(host)?;
        let events = events.with_source("decoder");
        events.info(format!(
            "listening on udp {local}, publishing hits at {}",
            publisher.address()
        ));
        Ok(Self {
            socket,
            local,
            buffer: vec![0; UDP_BUFFER_SIZE],
            decoder: PacketDecoder::new(correct_rollover),
            packed: Vec::new(),
            publisher,
            raw_sink: None,
            rate: RateCounter::new(REPORT_INTERVAL, Instant::now()),
            events,
        })
    }

    /// Bound UDP address.
    #[must_use]
    pub fn udp_address(&self) -> SocketAddr {
        self.local
    }

    /// Address of the packed hit stream.
    #[must_use]
    pub fn hit_address(&self) -> &EndpointAddress {
        self.publisher.address()
    }

    /// Starts saving raw datagrams to `path`, or stops with `None`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created; saving is then off.
    pub fn set_raw_path(&mut self, path: Option<&Path>) -> Result<()> {
        self.close_raw_sink();
        if let Some(path) = path {
            self.raw_sink = Some(RawChunkWriter::create(path)?);
            self.events.info(format!("saving raw data to {}", path.display()));
        }
        Ok(())
    }

    fn close_raw_sink(&mut self) {
        if let Some(mut sink) = self.raw_sink.take() {
            if let Err(e) = sink.flush() {
                self.events.error(format!("raw file {}: {e}", sink.path().display()));
            }
        }
    }

    fn save_raw(&mut self, len: usize) {
        let Some(sink) = self.raw_sink.as_mut() else {
            return;
        };
        if let Err(e) = sink.write_datagram(&self.buffer[..len]) {
            self.events.error(format!(
                "raw file {}: {e}; raw saving disabled",
                sink.path().display()
            ));
            self.raw_sink = None;
        }
    }
}

impl Worker for DecoderWorker {
    fn name(&self) -> &'static str {
        "decoder"
    }

    fn handle_command(&mut self, request: &Request) -> Reply {
        match request.kind() {
            Some(Command::SetRawTpx3Path) => {
                let path = unpack_string(&request.payload);
                let target = (!path.is_empty()).then(|| Path::new(&path));
                match self.set_raw_path(target) {
                    Ok(()) => Reply::echo(request),
                    Err(e) => {
                        self.events.error(format!("cannot open raw file {path}: {e}"));
                        Reply::error(ErrorCode::CantOpenFile)
                    }
                }
            }
            Some(Command::GetRawDataServerPath) => {
                Reply::ok_string(request, &self.publisher.address().to_string())
            }
            _ => Reply::error(ErrorCode::UnknownCommand),
        }
    }

    fn poll(&mut self) -> Result<bool> {
        self.publisher.service()?;
        if let Some(report) = self.rate.tick(Instant::now()) {
            if report.count > 0 {
                self.events
                    .debug(format!("{:.0} hits/s", report.per_second()));
            }
        }

        let len = match self.socket.recv_from(&mut self.buffer) {
            Ok((len, _)) => len,
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted) => {
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        };

        self.save_raw(len);

        self.packed.clear();
        match self.decoder.decode_packed(&self.buffer[..len], &mut self.packed) {
            Ok(0) => {}
            Ok(hits) => {
                self.rate.add(hits as u64);
                self.publisher.publish(&self.packed)?;
            }
            Err(e) => self.events.warn(format!("dropping datagram: {e}")),
        }
        Ok(true)
    }

    fn shutdown(&mut self) {
        self.close_raw_sink();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::event_channel;
    use tpxgate_bus::protocol::pack_string;
    use tpxgate_bus::{Delivery, Subscriber};
    use tpxgate_core::PixelHit;
    use tpxgate_tpx::Tpx3Word;

    fn datagram(words: &[Tpx3Word]) -> Vec<u8> {
        words.iter().flat_map(|w| w.0.to_le_bytes()).collect()
    }

    fn poll_until_busy(worker: &mut DecoderWorker) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !worker.poll().unwrap() {
            assert!(Instant::now() < deadline, "no datagram arrived");
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_publishes_decoded_hits() {
        let (events, _log) = event_channel(64);
        let mut worker = DecoderWorker::bind("127.0.0.1", 0, true, &events).unwrap();
        let mut sub = Subscriber::connect(worker.hit_address()).unwrap();

        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        let words = [
            Tpx3Word(0x4000_0000_0000_0000),
            Tpx3Word::encode_pixel(10, 20, 30, 1000),
        ];
        sender.send_to(&datagram(&words), worker.udp_address()).unwrap();
        poll_until_busy(&mut worker);

        let deadline = Instant::now() + Duration::from_secs(5);
        let payload = loop {
            match sub.poll().unwrap() {
                Delivery::Message(bytes) => break bytes,
                _ => assert!(Instant::now() < deadline),
            }
        };
        let hits: Vec<PixelHit> = PixelHit::iter_packed(&payload).unwrap().collect();
        assert_eq!(hits, vec![PixelHit::new(10, 20, 1000, 30)]);
    }

    #[test]
    fn test_partial_word_datagram_is_dropped() {
        let (events, log) = event_channel(64);
        let mut worker = DecoderWorker::bind("127.0.0.1", 0, false, &events).unwrap();
        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        sender.send_to(&[0u8; 12], worker.udp_address()).unwrap();
        poll_until_busy(&mut worker);
        assert!(log
            .try_iter()
            .any(|e| e.level == log::Level::Warn && e.message.contains("dropping datagram")));
    }

    #[test]
    fn test_raw_path_commands() {
        let (events, _log) = event_channel(64);
        let mut worker = DecoderWorker::bind("127.0.0.1", 0, false, &events).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.tpx3");

        let reply = worker.handle_command(&Request::with_payload(
            Command::SetRawTpx3Path,
            pack_string(path.to_str().unwrap()),
        ));
        assert!(!reply.is_error());
        assert_eq!(reply.payload, pack_string(path.to_str().unwrap()));

        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        let words = [Tpx3Word::encode_pixel(1, 2, 3, 4)];
        sender.send_to(&datagram(&words), worker.udp_address()).unwrap();
        poll_until_busy(&mut worker);
        worker.shutdown();
        let data = std::fs::read(&path).unwrap();
        assert_eq!(&data[..4], b"TPX3");
        assert_eq!(data.len(), 16);

        let missing = dir.path().join("no/such/dir/capture.tpx3");
        let reply = worker.handle_command(&Request::with_string(
            Command::SetRawTpx3Path,
            missing.to_str().unwrap(),
        ));
        assert_eq!(reply.error_code(), Some(ErrorCode::CantOpenFile));

        let reply = worker.handle_command(&Request::new(Command::GetRawDataServerPath));
        assert_eq!(reply.payload_string(), worker.hit_address().to_string());

        let reply = worker.handle_command(&Request::new(Command::FlushClusters));
        assert_eq!(reply.error_code(), Some(ErrorCode::UnknownCommand));
    }
}

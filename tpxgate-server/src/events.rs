//! Channels from workers to the log sink and to the orchestrator.
//!
//! Operator-facing log lines travel as [`LogEvent`]s over a bounded channel.
//! Producers never block: when the channel is full the event is dropped.
//! A dedicated thread forwards events to the `log` facade.

use crate::worker::ExitReason;
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tpxgate_bus::EndpointAddress;

/// One operator-facing log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    pub level: log::Level,
    pub source: String,
    pub message: String,
}

/// Cheap, cloneable producer handle tagged with a source name.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: flume::Sender<LogEvent>,
    source: Arc<str>,
}

/// Creates a bounded event channel. The returned sender is tagged
/// `gateway`; use [`EventSender::with_source`] for per-worker handles.
#[must_use]
pub fn event_channel(capacity: usize) -> (EventSender, flume::Receiver<LogEvent>) {
    let (tx, rx) = flume::bounded(capacity.max(1));
    (
        EventSender {
            tx,
            source: Arc::from("gateway"),
        },
        rx,
    )
}

impl EventSender {
    /// A sender on the same channel with a different source tag.
    #[must_use]
    pub fn with_source(&self, source: &str) -> Self {
        Self {
            tx: self.tx.clone(),
            source: Arc::from(source),
        }
    }

    /// Source tag.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Queues an event. Returns false if it was dropped.
    pub fn send(&self, level: log::Level, message: impl Into<String>) -> bool {
        self.tx
            .try_send(LogEvent {
                level,
                source: self.source.to_string(),
                message: message.into(),
            })
            .is_ok()
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.send(log::Level::Debug, message);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.send(log::Level::Info, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.send(log::Level::Warn, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.send(log::Level::Error, message);
    }
}

/// Starts the thread that forwards events to `log`. It exits once every
/// sender is gone and returns the number of events forwarded.
///
/// # Errors
/// Returns an error if the thread cannot be spawned.
pub fn spawn_log_sink(rx: flume::Receiver<LogEvent>) -> std::io::Result<JoinHandle<u64>> {
    thread::Builder::new()
        .name("tpxgate-log".into())
        .spawn(move || {
            let mut forwarded = 0;
            for event in rx.iter() {
                log::log!(target: "tpxgate", event.level, "[{}] {}", event.source, event.message);
                forwarded += 1;
            }
            forwarded
        })
}

/// Where a freshly bound decoder can be reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoderEndpoints {
    /// Control endpoint of the decoder worker.
    pub control: EndpointAddress,
    /// Packed hit stream.
    pub hits: EndpointAddress,
    /// UDP socket receiving detector datagrams.
    pub udp: SocketAddr,
}

/// Messages handled by the orchestrator's supervision loop.
#[derive(Debug)]
pub enum SupervisorEvent {
    /// A worker thread left its run loop.
    Exited { worker: String, reason: ExitReason },
    /// Restart the decoder on a new UDP port and rewire its consumers.
    RebindDecoder {
        port: u16,
        reply: flume::Sender<Result<DecoderEndpoints, String>>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_carry_source() {
        let (events, rx) = event_channel(8);
        events.with_source("cluster").warn("input disconnected");
        let event = rx.try_recv().unwrap();
        assert_eq!(event.level, log::Level::Warn);
        assert_eq!(event.source, "cluster");
        assert_eq!(event.message, "input disconnected");
    }

    #[test]
    fn test_full_channel_drops_instead_of_blocking() {
        let (events, rx) = event_channel(2);
        assert!(events.send(log::Level::Info, "a"));
        assert!(events.send(log::Level::Info, "b"));
        assert!(!events.send(log::Level::Info, "c"));
        assert_eq!(rx.len(), 2);
    }

    #[test]
    fn test_sink_drains_until_senders_drop() {
        let (events, rx) = event_channel(16);
        let sink = spawn_log_sink(rx).unwrap();
        events.info("one");
        events.with_source("decoder").error("two");
        drop(events);
        assert_eq!(sink.join().unwrap(), 2);
    }
}

//! Online clustering stage.

use crate::events::EventSender;
use crate::worker::{next_input, switch_input, Worker};
use crate::Result;
use std::path::Path;
use std::time::{Duration, Instant};
use tpxgate_algorithms::{ClusterEngine, ClusterSettings, RateCounter};
use tpxgate_bus::protocol::unpack_string;
use tpxgate_bus::{Command, EndpointAddress, ErrorCode, Publisher, Reply, Request, Subscriber};
use tpxgate_core::{ClusterRecord, PixelHit};
use tpxgate_io::ClusterFileWriter;

const REPORT_INTERVAL: Duration = Duration::from_secs(1);

/// Clusters the hit stream and publishes batches of cluster records.
///
/// Records completed while handling a command (input switch, explicit
/// flush) go out on the next poll.
pub struct ClusterWorker {
    engine: ClusterEngine,
    input: Option<Subscriber>,
    publisher: Publisher,
    sink: Option<ClusterFileWriter>,
    completed: Vec<ClusterRecord>,
    rate: RateCounter,
    events: EventSender,
}

impl ClusterWorker {
    /// Binds the record publisher on `host`.
    ///
    /// # Errors
    /// Returns an error if the publisher cannot be bound.
    pub fn bind(host: &str, settings: ClusterSettings, events: &EventSender) -> Result<Self> {
        let publisher = Publisher::bind(host)?;
        let events = events.with_source("cluster");
        events.info(format!("publishing clusters at {}", publisher.address()));
        Ok(Self {
            engine: ClusterEngine::new(settings),
            input: None,
            publisher,
            sink: None,
            completed: Vec::new(),
            rate: RateCounter::new(REPORT_INTERVAL, Instant::now()),
            events,
        })
    }

    /// Address of the cluster record stream.
    #[must_use]
    pub fn cluster_address(&self) -> &EndpointAddress {
        self.publisher.address()
    }

    /// Current clustering windows.
    #[must_use]
    pub fn settings(&self) -> &ClusterSettings {
        self.engine.settings()
    }

    /// Opens a sink file for every record from now on, or closes it with
    /// `None`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created; the sink is then off.
    pub fn set_save_path(&mut self, path: Option<&Path>) -> Result<()> {
        self.close_sink();
        if let Some(path) = path {
            self.sink = Some(ClusterFileWriter::create(path)?);
            self.events.info(format!("saving clusters to {}", path.display()));
        }
        Ok(())
    }

    fn close_sink(&mut self) {
        if let Some(mut sink) = self.sink.take() {
            match sink.flush() {
                Ok(()) => self.events.info(format!(
                    "closed {} after {} clusters",
                    sink.path().display(),
                    sink.records_written()
                )),
                Err(e) => self
                    .events
                    .error(format!("cluster file {}: {e}", sink.path().display())),
            }
        }
    }

    fn flush_engine(&mut self) {
        let n = self.engine.flush(&mut self.completed);
        if n > 0 {
            self.events.debug(format!("flushed {n} open clusters"));
        }
    }

    fn emit_completed(&mut self) -> Result<bool> {
        if self.completed.is_empty() {
            return Ok(false);
        }
        self.publisher
            .publish(&ClusterRecord::encode_all(&self.completed))?;
        if let Some(sink) = self.sink.as_mut() {
            if let Err(e) = sink.write_records(&self.completed) {
                self.events.error(format!(
                    "cluster file {}: {e}; saving disabled",
                    sink.path().display()
                ));
                self.sink = None;
            }
        }
        self.rate.add(self.completed.len() as u64);
        self.completed.clear();
        Ok(true)
    }

    fn report(&mut self) {
        let Some(report) = self.rate.tick(Instant::now()) else {
            return;
        };
        let open = self.engine.open_count();
        if report.count == 0 && open == 0 {
            return;
        }
        self.events.info(format!(
            "{:.0} clusters/s, {open} open",
            report.per_second()
        ));
    }
}

impl Worker for ClusterWorker {
    fn name(&self) -> &'static str {
        "cluster"
    }

    fn handle_command(&mut self, request: &Request) -> Reply {
        match request.kind() {
            Some(Command::GetClusterServerPath) => {
                Reply::ok_string(request, &self.publisher.address().to_string())
            }
            Some(Command::SetClusterInputServer) => {
                // Clusters from the old stream must not mix with the new one.
                self.flush_engine();
                switch_input(&mut self.input, request, &self.events)
            }
            Some(Command::SetClusterParameters) => {
                let [xy, t, gap] = request.payload[..] else {
                    return Reply::error(ErrorCode::InvalidCommandData);
                };
                self.engine.set_settings(ClusterSettings::new(xy, t, gap));
                self.events.info(format!(
                    "cluster parameters: xy {xy}, t {t}, max gap {gap}"
                ));
                Reply::echo(request)
            }
            Some(Command::FlushClusters) => {
                self.flush_engine();
                Reply::ok(request)
            }
            Some(Command::SetClusterSavePath) => {
                let path = unpack_string(&request.payload);
                let target = (!path.is_empty()).then(|| Path::new(&path));
                match self.set_save_path(target) {
                    Ok(()) => Reply::echo(request),
                    Err(e) => {
                        self.events
                            .error(format!("cannot open cluster file {path}: {e}"));
                        Reply::error(ErrorCode::CantOpenFile)
                    }
                }
            }
            _ => Reply::error(ErrorCode::UnknownCommand),
        }
    }

    fn poll(&mut self) -> Result<bool> {
        self.publisher.service()?;
        let mut worked = false;

        if let Some(payload) = next_input(&mut self.input, &self.events)? {
            match PixelHit::iter_packed(&payload) {
                Ok(hits) => {
                    self.engine.process_hits(hits, &mut self.completed);
                }
                Err(e) => self.events.warn(format!("dropping hit batch: {e}")),
            }
            worked = true;
        }

        worked |= self.emit_completed()?;
        self.report();
        Ok(worked)
    }

    fn shutdown(&mut self) {
        self.close_sink();
    }
}

//! Live histogram stage.

use crate::events::EventSender;
use crate::worker::{next_input, switch_input, Worker};
use crate::Result;
use std::time::{Duration, Instant};
use tpxgate_algorithms::HistogramAccumulator;
use tpxgate_bus::{Command, EndpointAddress, ErrorCode, Publisher, Reply, Request, Subscriber};

/// Accumulates hits into a 256×256 grid and publishes it every period.
pub struct HistogramWorker {
    accumulator: HistogramAccumulator,
    input: Option<Subscriber>,
    publisher: Publisher,
    events: EventSender,
}

impl HistogramWorker {
    /// Binds the snapshot publisher on `host`.
    ///
    /// # Errors
    /// Returns an error if the publisher cannot be bound.
    pub fn bind(host: &str, period: Duration, events: &EventSender) -> Result<Self> {
        let publisher = Publisher::bind(host)?;
        let events = events.with_source("histogram");
        events.info(format!(
            "publishing histograms every {} ms at {}",
            period.as_millis(),
            publisher.address()
        ));
        Ok(Self {
            accumulator: HistogramAccumulator::new(period, Instant::now()),
            input: None,
            publisher,
            events,
        })
    }

    /// Address of the snapshot stream.
    #[must_use]
    pub fn histogram_address(&self) -> &EndpointAddress {
        self.publisher.address()
    }

    /// Current publish period.
    #[must_use]
    pub fn period(&self) -> Duration {
        self.accumulator.period()
    }
}

impl Worker for HistogramWorker {
    fn name(&self) -> &'static str {
        "histogram"
    }

    fn handle_command(&mut self, request: &Request) -> Reply {
        match request.kind() {
            Some(Command::GetHistogramServerPath) => {
                Reply::ok_string(request, &self.publisher.address().to_string())
            }
            Some(Command::SetHistogramInputServer) => {
                switch_input(&mut self.input, request, &self.events)
            }
            Some(Command::SetHistogramOutputPeriod) => match request.payload[..] {
                [ms] if ms > 0 => {
                    self.accumulator
                        .set_period(Duration::from_millis(u64::from(ms)));
                    self.events.info(format!("output period set to {ms} ms"));
                    Reply::echo(request)
                }
                _ => Reply::error(ErrorCode::InvalidCommandData),
            },
            _ => Reply::error(ErrorCode::UnknownCommand),
        }
    }

    fn poll(&mut self) -> Result<bool> {
        self.publisher.service()?;
        let mut worked = false;

        if let Some(payload) = next_input(&mut self.input, &self.events)? {
            if let Err(e) = self.accumulator.add_packed(&payload) {
                self.events.warn(format!("dropping hit batch: {e}"));
            }
            worked = true;
        }

        if let Some(snapshot) = self.accumulator.poll(Instant::now()) {
            self.publisher.publish(&snapshot.encode())?;
            worked = true;
        }
        Ok(worked)
    }
}

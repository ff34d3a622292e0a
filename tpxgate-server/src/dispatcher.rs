//! Front-facing control endpoint.
//!
//! Every client request is answered exactly once, in one of four ways:
//! gateway-level commands are handled here, worker commands are forwarded
//! byte-for-byte to the owning worker and its reply relayed unmodified,
//! hardware commands go through the [`ControlLink`], and anything else is
//! rejected. Only one request is in flight at a time.

use crate::cancel::CancellationToken;
use crate::events::{DecoderEndpoints, EventSender, SupervisorEvent};
use crate::link::ControlLink;
use crate::worker::Worker;
use crate::{Error, Result};
use std::time::Duration;
use tpxgate_bus::{Command, ControlClient, EndpointAddress, ErrorCode, Reply, Request};

const REBIND_POLL: Duration = Duration::from_millis(50);

/// The worker that owns a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Route {
    Decoder,
    Cluster,
    Histogram,
}

fn route(command: Command) -> Option<Route> {
    match command {
        Command::SetRawTpx3Path | Command::GetRawDataServerPath => Some(Route::Decoder),
        Command::GetClusterServerPath
        | Command::SetClusterInputServer
        | Command::SetClusterParameters
        | Command::FlushClusters
        | Command::SetClusterSavePath => Some(Route::Cluster),
        Command::GetHistogramServerPath
        | Command::SetHistogramInputServer
        | Command::SetHistogramOutputPeriod => Some(Route::Histogram),
        _ => None,
    }
}

/// Control endpoints of the workers behind the dispatcher.
#[derive(Debug, Clone, Default)]
pub struct WorkerRoutes {
    pub decoder: Option<EndpointAddress>,
    pub cluster: Option<EndpointAddress>,
    pub histogram: Option<EndpointAddress>,
}

/// Forwarding connection to one worker.
struct Forward {
    address: Option<EndpointAddress>,
    client: Option<ControlClient>,
}

impl Forward {
    fn new(address: Option<EndpointAddress>) -> Self {
        Self {
            address,
            client: None,
        }
    }

    fn exchange(&mut self, raw: &[u8], timeout: Duration) -> Result<Vec<u8>> {
        if self.client.is_none() {
            let address = self
                .address
                .as_ref()
                .ok_or(Error::Bus(tpxgate_bus::Error::Disconnected))?;
            self.client = Some(ControlClient::connect(address, Some(timeout))?);
        }
        let client = self
            .client
            .as_mut()
            .ok_or(Error::Bus(tpxgate_bus::Error::Disconnected))?;
        Ok(client.request_raw(raw)?)
    }
}

/// Routes client requests to workers, the orchestrator, or the detector.
pub struct Dispatcher {
    link: Box<dyn ControlLink>,
    decoder: Forward,
    cluster: Forward,
    histogram: Forward,
    supervisor: flume::Sender<SupervisorEvent>,
    timeout: Duration,
    link_failure: Option<String>,
    cancel: CancellationToken,
    events: EventSender,
}

impl Dispatcher {
    /// Creates a dispatcher. Worker connections are opened on first use.
    #[must_use]
    pub fn new(
        link: Box<dyn ControlLink>,
        routes: WorkerRoutes,
        supervisor: flume::Sender<SupervisorEvent>,
        timeout: Duration,
        events: &EventSender,
    ) -> Self {
        Self {
            link,
            decoder: Forward::new(routes.decoder),
            cluster: Forward::new(routes.cluster),
            histogram: Forward::new(routes.histogram),
            supervisor,
            timeout,
            link_failure: None,
            cancel: CancellationToken::new(),
            events: events.with_source("dispatcher"),
        }
    }

    /// Token that abandons a pending decoder rebind; pass the one the
    /// dispatcher thread runs under.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    fn forward(&mut self, target: Route, raw: &[u8]) -> Vec<u8> {
        let timeout = self.timeout;
        let forward = match target {
            Route::Decoder => &mut self.decoder,
            Route::Cluster => &mut self.cluster,
            Route::Histogram => &mut self.histogram,
        };
        match forward.exchange(raw, timeout) {
            Ok(reply) => reply,
            Err(Error::Bus(tpxgate_bus::Error::Timeout(_))) => {
                self.events
                    .warn(format!("{target:?} worker did not reply within {timeout:?}"));
                Reply::error(ErrorCode::ErrorOccurred).encode()
            }
            Err(e) => {
                forward.client = None;
                self.events.warn(format!("{target:?} worker unreachable: {e}"));
                Reply::error(ErrorCode::WorkerNotStarted).encode()
            }
        }
    }

    fn forward_to_link(&mut self, request: &Request, command: Command) -> Reply {
        if !command.accepts_payload(request.payload.len()) {
            return Reply::error(ErrorCode::InvalidCommandData);
        }
        if !self.link.is_connected() {
            return Reply::error(ErrorCode::ErrorOccurred);
        }
        let exchange = self
            .link
            .send_command(request.command, &request.payload)
            .and_then(|()| self.link.receive_reply());
        match exchange {
            Ok(reply) if reply.error_code != 0 => {
                self.events.warn(format!(
                    "device rejected {command:?}: {}",
                    self.link.error_string(reply.error_code)
                ));
                Reply::error(ErrorCode::ErrorOccurred)
            }
            Ok(reply) => Reply::ok_with(request, reply.payload),
            Err(e) => {
                self.events.error(format!("control link failed: {e}"));
                self.link_failure = Some(e.to_string());
                Reply::error(ErrorCode::ErrorOccurred)
            }
        }
    }

    fn rebind_decoder(&mut self, request: &Request) -> Reply {
        let [port] = request.payload[..] else {
            return Reply::error(ErrorCode::InvalidCommandData);
        };
        let Ok(port) = u16::try_from(port) else {
            return Reply::error(ErrorCode::InvalidCommandData);
        };

        let (tx, rx) = flume::bounded(1);
        if self
            .supervisor
            .send(SupervisorEvent::RebindDecoder { port, reply: tx })
            .is_err()
        {
            return Reply::error(ErrorCode::ErrorOccurred);
        }
        // Restarting the decoder can outlast the forward timeout. Giving up
        // early would leave the decoder route on the stopped worker, so wait
        // for the outcome unless the dispatcher itself is stopping.
        let outcome = loop {
            match rx.recv_timeout(REBIND_POLL) {
                Ok(outcome) => break Some(outcome),
                Err(flume::RecvTimeoutError::Timeout) if !self.cancel.is_cancelled() => {}
                Err(_) => break None,
            }
        };
        match outcome {
            Some(Ok(DecoderEndpoints { control, udp, .. })) => {
                self.decoder = Forward::new(Some(control));
                Reply::ok_with(request, vec![u32::from(udp.port())])
            }
            Some(Err(reason)) => {
                self.events.warn(format!("rebind to port {port} failed: {reason}"));
                Reply::error(ErrorCode::ErrorOccurred)
            }
            None => Reply::error(ErrorCode::ErrorOccurred),
        }
    }
}

impl Worker for Dispatcher {
    fn name(&self) -> &'static str {
        "dispatcher"
    }

    fn handle_command(&mut self, request: &Request) -> Reply {
        match request.kind() {
            Some(Command::SetUdpPort) => self.rebind_decoder(request),
            Some(command) if command.is_hardware() => self.forward_to_link(request, command),
            // Worker commands only reach here when called directly.
            _ => Reply::error(ErrorCode::UnknownCommand),
        }
    }

    fn handle_request(&mut self, raw: &[u8]) -> Vec<u8> {
        let Ok(request) = Request::decode(raw) else {
            return Reply::error(ErrorCode::InvalidCommandData).encode();
        };
        match request.kind().and_then(route) {
            Some(target) => self.forward(target, raw),
            None => self.handle_command(&request).encode(),
        }
    }

    fn poll(&mut self) -> Result<bool> {
        match self.link_failure.take() {
            Some(reason) => Err(Error::Link(reason)),
            None => Ok(false),
        }
    }
}

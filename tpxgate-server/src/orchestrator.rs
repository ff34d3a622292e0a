//! Pipeline assembly, supervision and teardown.
//!
//! Sockets are bound before threads start so every address is known up
//! front. Consumers are wired to the decoder through their own control
//! endpoints, the same way an external client would rewire them.

use crate::cancel::CancellationToken;
use crate::cluster_worker::ClusterWorker;
use crate::config::GatewayConfig;
use crate::decoder_worker::DecoderWorker;
use crate::dispatcher::{Dispatcher, Route, WorkerRoutes};
use crate::events::{DecoderEndpoints, EventSender, SupervisorEvent};
use crate::histogram_worker::HistogramWorker;
use crate::link::ControlLink;
use crate::worker::{spawn_worker, ExitReason, WorkerHandle};
use crate::{Error, Result};
use std::net::SocketAddr;
use std::time::Duration;
use tpxgate_bus::{Command, ControlClient, ControlServer, EndpointAddress, Request};

const SUPERVISE_TICK: Duration = Duration::from_millis(50);

/// A running gateway: decoder, cluster and histogram workers behind a
/// dispatcher.
pub struct Gateway {
    config: GatewayConfig,
    root: CancellationToken,
    stop: CancellationToken,
    events: EventSender,
    supervisor_tx: flume::Sender<SupervisorEvent>,
    supervisor_rx: flume::Receiver<SupervisorEvent>,
    dispatcher: Option<WorkerHandle>,
    decoder: Option<WorkerHandle>,
    cluster: Option<WorkerHandle>,
    histogram: Option<WorkerHandle>,
    decoder_endpoints: Option<DecoderEndpoints>,
    cluster_address: EndpointAddress,
    histogram_address: EndpointAddress,
    client_address: EndpointAddress,
    failure: Option<(String, String)>,
}

impl Gateway {
    /// Binds every socket, starts all workers and wires them together.
    ///
    /// A link that fails to connect is logged; hardware commands are then
    /// refused but the pipeline runs.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid, a socket cannot
    /// be bound, a thread cannot start, or wiring fails. Workers already
    /// started are stopped.
    pub fn start(
        config: GatewayConfig,
        mut link: Box<dyn ControlLink>,
        events: &EventSender,
    ) -> Result<Self> {
        config.validate()?;
        let events = events.with_source("gateway");
        let root = CancellationToken::new();
        let (supervisor_tx, supervisor_rx) = flume::unbounded();

        if let Err(e) = link.connect() {
            events.warn(format!("control link unavailable: {e}"));
        }

        let mut cluster_worker = ClusterWorker::bind(&config.host, config.cluster, &events)?;
        if let Some(path) = config.cluster_file.as_deref() {
            cluster_worker.set_save_path(Some(path))?;
        }
        let cluster_address = cluster_worker.cluster_address().clone();
        let cluster_control = ControlServer::bind(&config.host, 0)?;
        let cluster = spawn_worker(
            cluster_worker,
            cluster_control,
            root.child(),
            &events,
            supervisor_tx.clone(),
        )?;

        let histogram_worker =
            HistogramWorker::bind(&config.host, config.histogram_period(), &events)?;
        let histogram_address = histogram_worker.histogram_address().clone();
        let histogram_control = ControlServer::bind(&config.host, 0)?;
        let histogram = spawn_worker(
            histogram_worker,
            histogram_control,
            root.child(),
            &events,
            supervisor_tx.clone(),
        )?;

        // Partially built so that an early error still tears down cleanly.
        let mut gateway = Self {
            root,
            stop: CancellationToken::new(),
            events,
            supervisor_tx,
            supervisor_rx,
            dispatcher: None,
            decoder: None,
            cluster: Some(cluster),
            histogram: Some(histogram),
            decoder_endpoints: None,
            cluster_address,
            histogram_address,
            client_address: EndpointAddress::new(config.host.clone(), config.client_port),
            failure: None,
            config,
        };

        gateway.start_decoder(gateway.config.udp_port)?;
        if let Some(path) = gateway.config.raw_file.clone() {
            gateway.send_to(
                Route::Decoder,
                &Request::with_string(Command::SetRawTpx3Path, &path.to_string_lossy()),
            )?;
        }

        let dispatcher_control =
            ControlServer::bind(&gateway.config.host, gateway.config.client_port)?;
        gateway.client_address = dispatcher_control.address().clone();
        let routes = WorkerRoutes {
            decoder: gateway.decoder.as_ref().map(|h| h.control_address().clone()),
            cluster: gateway.cluster.as_ref().map(|h| h.control_address().clone()),
            histogram: gateway.histogram.as_ref().map(|h| h.control_address().clone()),
        };
        let dispatcher_cancel = gateway.root.child();
        let dispatcher = Dispatcher::new(
            link,
            routes,
            gateway.supervisor_tx.clone(),
            gateway.config.forward_timeout(),
            &gateway.events,
        )
        .with_cancel(dispatcher_cancel.clone());
        gateway.dispatcher = Some(spawn_worker(
            dispatcher,
            dispatcher_control,
            dispatcher_cancel,
            &gateway.events,
            gateway.supervisor_tx.clone(),
        )?);

        gateway.events.info(format!(
            "gateway up: clients at {}, hits on udp {}",
            gateway.client_address,
            gateway
                .decoder_endpoints
                .as_ref()
                .map_or_else(|| "-".to_string(), |d| d.udp.to_string()),
        ));
        Ok(gateway)
    }

    /// Front-facing control endpoint.
    #[must_use]
    pub fn client_address(&self) -> &EndpointAddress {
        &self.client_address
    }

    /// UDP socket of the current decoder.
    #[must_use]
    pub fn udp_address(&self) -> Option<SocketAddr> {
        self.decoder_endpoints.as_ref().map(|d| d.udp)
    }

    /// Packed hit stream of the current decoder.
    #[must_use]
    pub fn hit_address(&self) -> Option<&EndpointAddress> {
        self.decoder_endpoints.as_ref().map(|d| &d.hits)
    }

    /// Cluster record stream.
    #[must_use]
    pub fn cluster_address(&self) -> &EndpointAddress {
        &self.cluster_address
    }

    /// Histogram snapshot stream.
    #[must_use]
    pub fn histogram_address(&self) -> &EndpointAddress {
        &self.histogram_address
    }

    /// Token that ends [`run`](Self::run) with an orderly teardown.
    #[must_use]
    pub fn stop_token(&self) -> CancellationToken {
        self.stop.clone()
    }

    /// Supervises the workers until the gateway is cancelled, then tears
    /// the pipeline down.
    ///
    /// # Errors
    /// Returns [`Error::WorkerFailed`] if a worker fault brought the
    /// pipeline down.
    pub fn run(mut self) -> Result<()> {
        while !self.stop.is_cancelled() && !self.root.is_cancelled() {
            match self.supervisor_rx.recv_timeout(SUPERVISE_TICK) {
                Ok(event) => self.on_event(event),
                Err(flume::RecvTimeoutError::Timeout) => {}
                Err(flume::RecvTimeoutError::Disconnected) => break,
            }
        }
        self.shutdown();
        match self.failure.take() {
            Some((worker, reason)) => Err(Error::WorkerFailed { worker, reason }),
            None => Ok(()),
        }
    }

    /// Stops every worker: dispatcher, decoder, cluster, histogram.
    pub fn shutdown(&mut self) {
        for slot in [
            &mut self.dispatcher,
            &mut self.decoder,
            &mut self.cluster,
            &mut self.histogram,
        ] {
            if let Some(handle) = slot.take() {
                let name = handle.name();
                let reason = handle.stop();
                log::debug!("{name} stopped: {reason:?}");
            }
        }
        self.root.cancel();
        self.events.info("gateway stopped");
    }

    fn on_event(&mut self, event: SupervisorEvent) {
        match event {
            SupervisorEvent::Exited { worker, reason } => match reason {
                ExitReason::Cancelled => {}
                ExitReason::Failed(message) => {
                    self.events
                        .error(format!("{worker} failed ({message}); stopping pipeline"));
                    self.failure.get_or_insert((worker, message));
                    self.root.cancel();
                }
                ExitReason::Panicked(message) => {
                    self.events
                        .error(format!("{worker} panicked ({message}); worker stopped"));
                }
            },
            SupervisorEvent::RebindDecoder { port, reply } => {
                let result = self.rebind_decoder(port).map_err(|e| e.to_string());
                // The dispatcher may have given up waiting.
                let _ = reply.send(result);
            }
        }
    }

    fn rebind_decoder(&mut self, port: u16) -> Result<DecoderEndpoints> {
        if let Some(old) = self.decoder.take() {
            old.stop();
        }
        self.decoder_endpoints = None;
        self.start_decoder(port)?;
        self.decoder_endpoints
            .clone()
            .ok_or_else(|| Error::Wiring {
                worker: "decoder".into(),
                reason: "not running".into(),
            })
    }

    /// Binds and spawns a decoder on `port`, then points the consumers at
    /// its hit stream.
    fn start_decoder(&mut self, port: u16) -> Result<()> {
        let worker = DecoderWorker::bind(
            &self.config.host,
            port,
            self.config.correct_rollover,
            &self.events,
        )?;
        let control = ControlServer::bind(&self.config.host, 0)?;
        let endpoints = DecoderEndpoints {
            control: control.address().clone(),
            hits: worker.hit_address().clone(),
            udp: worker.udp_address(),
        };
        self.decoder = Some(spawn_worker(
            worker,
            control,
            self.root.child(),
            &self.events,
            self.supervisor_tx.clone(),
        )?);
        self.decoder_endpoints = Some(endpoints.clone());

        let hits = endpoints.hits.to_string();
        self.send_to(
            Route::Cluster,
            &Request::with_string(Command::SetClusterInputServer, &hits),
        )?;
        self.send_to(
            Route::Histogram,
            &Request::with_string(Command::SetHistogramInputServer, &hits),
        )?;
        Ok(())
    }

    fn send_to(&self, route: Route, request: &Request) -> Result<()> {
        let handle = match route {
            Route::Decoder => self.decoder.as_ref(),
            Route::Cluster => self.cluster.as_ref(),
            Route::Histogram => self.histogram.as_ref(),
        };
        let wiring = |reason: String| Error::Wiring {
            worker: format!("{route:?}").to_lowercase(),
            reason,
        };
        let handle = handle.ok_or_else(|| wiring("worker not running".into()))?;
        let mut client =
            ControlClient::connect(handle.control_address(), Some(self.config.forward_timeout()))?;
        let reply = client.request(request)?;
        if reply.is_error() {
            return Err(wiring(format!("reply code {:#x}", reply.code)));
        }
        Ok(())
    }
}

impl Drop for Gateway {
    fn drop(&mut self) {
        if !self.root.is_cancelled() {
            self.shutdown();
        }
    }
}

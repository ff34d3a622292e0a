//! tpxgate-server: the acquisition gateway's worker threads.
//!
//! # Key Components
//!
//! - [`Gateway`] - binds, spawns, wires and supervises the pipeline
//! - [`DecoderWorker`] - UDP datagrams in, packed hits out
//! - [`ClusterWorker`] - online clustering with an optional sink file
//! - [`HistogramWorker`] - periodic 256×256 hit maps
//! - [`Dispatcher`] - the client-facing control endpoint
//! - [`Worker`] / [`run_worker`] - the shared poll loop
//!
//! Workers share no mutable state. Data moves over the bus, operator log
//! lines over a [`LogEvent`] channel, and worker exits over a supervisor
//! channel to the orchestrator.

mod cancel;
mod cluster_worker;
mod config;
mod decoder_worker;
mod dispatcher;
mod error;
mod events;
mod histogram_worker;
mod link;
mod orchestrator;
mod worker;

pub use cancel::CancellationToken;
pub use cluster_worker::ClusterWorker;
pub use config::GatewayConfig;
pub use decoder_worker::{DecoderWorker, UDP_BUFFER_SIZE};
pub use dispatcher::{Dispatcher, WorkerRoutes};
pub use error::{Error, Result};
pub use events::{
    event_channel, spawn_log_sink, DecoderEndpoints, EventSender, LogEvent, SupervisorEvent,
};
pub use histogram_worker::HistogramWorker;
pub use link::{ControlLink, DetachedLink, LinkReply};
pub use orchestrator::Gateway;
pub use worker::{run_worker, spawn_worker, ExitReason, Worker, WorkerHandle};

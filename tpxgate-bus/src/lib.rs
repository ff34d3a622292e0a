//! tpxgate-bus: the messaging substrate between gateway workers.
//!
//! Two planes run over loopback TCP with length-prefixed frames:
//!
//! - Data plane: a [`Publisher`] fans frames out to any number of
//!   [`Subscriber`]s. Publishing never blocks; a slow subscriber loses
//!   messages instead of stalling the producer.
//! - Control plane: a [`ControlServer`] answers every [`Request`] with
//!   exactly one [`Reply`]; a [`ControlClient`] issues blocking requests
//!   with an optional timeout.
//!
//! Endpoints are bound to OS-assigned ports and advertised as
//! [`EndpointAddress`] strings (`tcp://host:port`).

mod address;
mod control;
mod error;
mod frame;
pub mod protocol;
mod publisher;
mod subscriber;

pub use address::EndpointAddress;
pub use control::{ControlClient, ControlServer};
pub use error::{Error, Result};
pub use frame::{encode_frame, FrameReader, ReadStatus, MAX_FRAME_LEN};
pub use protocol::{Command, ErrorCode, Reply, Request};
pub use publisher::Publisher;
pub use subscriber::{Delivery, Subscriber};

//! The detector control link seen from the dispatcher.
//!
//! The real link speaks the readout board's TCP command protocol; the
//! gateway only needs the request/reply shape below.

use crate::{Error, Result};

/// The detector's answer to one command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LinkReply {
    /// Command code echoed by the device.
    pub command: u32,
    /// Reply payload words.
    pub payload: Vec<u32>,
    /// Device error code; 0 means success.
    pub error_code: u32,
}

/// A command channel to the detector control electronics.
pub trait ControlLink: Send {
    /// Opens the link.
    ///
    /// # Errors
    /// Returns an error if the device cannot be reached.
    fn connect(&mut self) -> Result<()>;

    /// Whether commands can currently be sent.
    fn is_connected(&self) -> bool;

    /// Sends one command.
    ///
    /// # Errors
    /// A transport failure here is fatal to the pipeline.
    fn send_command(&mut self, command: u32, payload: &[u32]) -> Result<()>;

    /// Waits for the reply to the last command.
    ///
    /// # Errors
    /// A transport failure here is fatal to the pipeline.
    fn receive_reply(&mut self) -> Result<LinkReply>;

    /// Human-readable text for a device error code.
    fn error_string(&self, error_code: u32) -> String;
}

/// Link used when no detector is attached. Never connected; hardware
/// commands are refused while gateway commands keep working.
#[derive(Debug, Default, Clone, Copy)]
pub struct DetachedLink;

impl ControlLink for DetachedLink {
    fn connect(&mut self) -> Result<()> {
        Ok(())
    }

    fn is_connected(&self) -> bool {
        false
    }

    fn send_command(&mut self, _command: u32, _payload: &[u32]) -> Result<()> {
        Err(Error::Link("no detector control link attached".into()))
    }

    fn receive_reply(&mut self) -> Result<LinkReply> {
        Err(Error::Link("no detector control link attached".into()))
    }

    fn error_string(&self, error_code: u32) -> String {
        format!("device error {error_code:#x}")
    }
}

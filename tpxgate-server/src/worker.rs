//! The worker abstraction and its run loop.
//!
//! Each worker owns one control endpoint and runs on its own thread. One
//! loop iteration serves at most one control request, then gives the worker
//! one chance to do its periodic work. Busy iterations yield; idle ones back
//! off briefly.

use crate::cancel::CancellationToken;
use crate::events::{EventSender, SupervisorEvent};
use crate::Result;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tpxgate_bus::protocol::{self, unpack_string};
use tpxgate_bus::{
    ControlServer, Delivery, EndpointAddress, ErrorCode, Reply, Request, Subscriber,
};

const IDLE_BACKOFF: Duration = Duration::from_millis(1);

/// A pipeline stage driven by [`run_worker`].
pub trait Worker: Send {
    /// Short name used for the thread and in log events.
    fn name(&self) -> &'static str;

    /// Answers one parsed control request.
    fn handle_command(&mut self, request: &Request) -> Reply;

    /// Answers one raw control request. The default parses it and calls
    /// [`handle_command`](Self::handle_command); malformed bytes get
    /// `INVALID_COMMAND_DATA`.
    fn handle_request(&mut self, raw: &[u8]) -> Vec<u8> {
        protocol::respond(raw, |request| self.handle_command(request))
    }

    /// Does at most one unit of work. Returns whether anything happened.
    ///
    /// # Errors
    /// An error stops the worker and is reported as [`ExitReason::Failed`].
    fn poll(&mut self) -> Result<bool>;

    /// Called once after the loop exits, whatever the reason.
    fn shutdown(&mut self) {}
}

/// Replaces `input` with a subscription to the address packed in the
/// request payload. An empty address just drops the current input.
pub(crate) fn switch_input(
    input: &mut Option<Subscriber>,
    request: &Request,
    events: &EventSender,
) -> Reply {
    let text = unpack_string(&request.payload);
    *input = None;
    if text.is_empty() {
        events.info("input disconnected");
        return Reply::echo(request);
    }
    let Ok(address) = text.parse::<EndpointAddress>() else {
        events.warn(format!("invalid input address {text:?}"));
        return Reply::error(ErrorCode::InvalidCommandData);
    };
    match Subscriber::connect(&address) {
        Ok(subscriber) => {
            events.info(format!("input connected to {address}"));
            *input = Some(subscriber);
            Reply::echo(request)
        }
        Err(e) => {
            events.warn(format!("cannot connect input to {address}: {e}"));
            Reply::error(ErrorCode::WorkerNotConnected)
        }
    }
}

/// Takes at most one message from `input`. A vanished publisher is logged
/// and the subscription dropped; the worker stays up, idle.
pub(crate) fn next_input(
    input: &mut Option<Subscriber>,
    events: &EventSender,
) -> Result<Option<Vec<u8>>> {
    let Some(subscriber) = input.as_mut() else {
        return Ok(None);
    };
    match subscriber.poll()? {
        Delivery::Message(payload) => Ok(Some(payload)),
        Delivery::Empty => Ok(None),
        Delivery::Disconnected => {
            events.warn(format!("input {} disconnected", subscriber.address()));
            *input = None;
            Ok(None)
        }
    }
}

/// Why a worker left its run loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReason {
    Cancelled,
    Failed(String),
    Panicked(String),
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Drives `worker` until `cancel` fires or the worker faults.
///
/// Errors and panics are logged, cancel `cancel`, and end the loop.
pub fn run_worker<W: Worker + ?Sized>(
    worker: &mut W,
    control: &mut ControlServer,
    cancel: &CancellationToken,
    events: &EventSender,
) -> ExitReason {
    events.debug(format!("control endpoint at {}", control.address()));
    while !cancel.is_cancelled() {
        let step = panic::catch_unwind(AssertUnwindSafe(|| -> Result<bool> {
            let served = control.poll_raw(|raw| worker.handle_request(raw))?;
            let worked = worker.poll()?;
            Ok(served || worked)
        }));
        match step {
            Ok(Ok(true)) => thread::yield_now(),
            Ok(Ok(false)) => thread::sleep(IDLE_BACKOFF),
            Ok(Err(e)) => {
                events.error(format!("stopping after error: {e}"));
                cancel.cancel();
                return ExitReason::Failed(e.to_string());
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                events.error(format!("stopping after panic: {message}"));
                cancel.cancel();
                return ExitReason::Panicked(message);
            }
        }
    }
    ExitReason::Cancelled
}

/// A running worker thread.
pub struct WorkerHandle {
    name: &'static str,
    control: EndpointAddress,
    cancel: CancellationToken,
    thread: Option<JoinHandle<ExitReason>>,
}

impl WorkerHandle {
    /// Worker name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Control endpoint of the worker.
    #[must_use]
    pub fn control_address(&self) -> &EndpointAddress {
        &self.control
    }

    /// Asks the worker to stop.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether the thread has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Cancels the worker and waits for its thread.
    pub fn stop(mut self) -> ExitReason {
        self.stop_inner()
    }

    fn stop_inner(&mut self) -> ExitReason {
        self.cancel.cancel();
        match self.thread.take() {
            Some(thread) => thread
                .join()
                .unwrap_or_else(|payload| ExitReason::Panicked(panic_message(payload.as_ref()))),
            None => ExitReason::Cancelled,
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.stop_inner();
        }
    }
}

/// Starts `worker` on a thread named `tpxgate-<name>`.
///
/// The control endpoint must already be bound so its address is known
/// before the thread runs. The exit reason is sent to `supervisor`.
///
/// # Errors
/// Returns an error if the thread cannot be spawned.
pub fn spawn_worker<W: Worker + 'static>(
    mut worker: W,
    mut control: ControlServer,
    cancel: CancellationToken,
    events: &EventSender,
    supervisor: flume::Sender<SupervisorEvent>,
) -> Result<WorkerHandle> {
    let name = worker.name();
    let address = control.address().clone();
    let events = events.with_source(name);
    let token = cancel.clone();

    let thread = thread::Builder::new()
        .name(format!("tpxgate-{name}"))
        .spawn(move || {
            let reason = run_worker(&mut worker, &mut control, &token, &events);
            worker.shutdown();
            events.debug(format!("exited: {reason:?}"));
            // Nobody supervising is fine during teardown.
            let _ = supervisor.send(SupervisorEvent::Exited {
                worker: name.to_string(),
                reason: reason.clone(),
            });
            reason
        })?;

    Ok(WorkerHandle {
        name,
        control: address,
        cancel,
        thread: Some(thread),
    })
}

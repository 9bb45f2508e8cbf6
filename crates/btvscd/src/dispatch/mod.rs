//! Single-slot dispatcher forwarding queued commands to the controller.
//!
//! At most one command is outstanding at the controller. The dispatcher
//! takes the queue head only while the slot is free, forwards it through the
//! [`ControllerTransport`](crate::ControllerTransport) and arms the reply
//! timer. The slot is released when the matching reply arrives through the
//! [`CompletionHandler`].
//!
//! If the timer expires first, a hardware error event is injected into the
//! host stack once. The slot stays occupied afterwards: the host is expected
//! to recover the controller, and the next command is only sent once the
//! original handler completes.
//!
//! All slot state lives on the dispatcher thread. Producers and the
//! collaborators talk to it through its inbox.

mod timer;

use std::fmt;
use std::mem;
use std::sync::Arc;
use std::sync::mpsc::{Receiver, Sender};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::command::{Completion, Opcode, QueuedCommand};
use crate::hooks::Hooks;
use crate::service::ServiceShared;
use crate::transport::{ClientHandle, ClientId};

pub use self::timer::TimerError;
pub(crate) use self::timer::{ReplyTimer, TimerMode};

const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");

/// HCI hardware error event injected when the controller never replies:
/// event packet indicator, event code `0x10`, length 1, vendor code `0xfd`.
pub const HARDWARE_ERROR_EVENT: [u8; 4] = [0x04, 0x10, 0x01, 0xfd];

/// Messages processed by the dispatcher thread.
#[derive(Debug)]
pub(crate) enum DispatchEvent {
    /// One command was appended to the queue.
    CommandQueued,
    /// The controller replied to the command carrying `sequence`.
    Completed { sequence: u64, reply: Vec<u8> },
    /// The reply timer expired for `sequence`.
    ReplyTimeout { sequence: u64 },
    /// Wake the thread so it observes a cleared run flag.
    Stop,
}

/// One-shot handle through which the controller transport reports a reply.
///
/// The handle may be moved to any thread. Dropping it without calling
/// [`complete`](Self::complete) leaves the command outstanding.
pub struct CompletionHandler {
    sequence: u64,
    inbox: Sender<DispatchEvent>,
}

impl CompletionHandler {
    pub(crate) fn new(sequence: u64, inbox: Sender<DispatchEvent>) -> Self {
        Self { sequence, inbox }
    }

    /// Sequence number of the command this handler answers.
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Reports the controller's reply bytes for the command.
    pub fn complete(self, reply: &[u8]) {
        let event = DispatchEvent::Completed {
            sequence: self.sequence,
            reply: reply.to_vec(),
        };
        if self.inbox.send(event).is_err() {
            debug!(
                target: DISPATCH_TARGET,
                sequence = self.sequence,
                "dispatcher gone; dropping controller reply"
            );
        }
    }
}

impl fmt::Debug for CompletionHandler {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("CompletionHandler")
            .field("sequence", &self.sequence)
            .finish_non_exhaustive()
    }
}

struct InFlight {
    sequence: u64,
    opcode: Opcode,
    client: Option<ClientId>,
    completion: Completion,
    timed_out: bool,
}

enum Slot {
    Available,
    Occupied(InFlight),
}

pub(crate) struct Dispatcher {
    inbox: Receiver<DispatchEvent>,
    inbox_sender: Sender<DispatchEvent>,
    shared: Arc<ServiceShared>,
    hooks: Hooks,
    timer: ReplyTimer,
    reply_timeout: Duration,
    pending_signals: usize,
    slot: Slot,
    next_sequence: u64,
}

impl Dispatcher {
    pub(crate) fn new(
        inbox: Receiver<DispatchEvent>,
        inbox_sender: Sender<DispatchEvent>,
        shared: Arc<ServiceShared>,
        hooks: Hooks,
        timer: ReplyTimer,
        reply_timeout: Duration,
    ) -> Self {
        Self {
            inbox,
            inbox_sender,
            shared,
            hooks,
            timer,
            reply_timeout,
            pending_signals: 0,
            slot: Slot::Available,
            next_sequence: 1,
        }
    }

    /// Processes inbox events until the run flag clears, then hands itself
    /// back so a restarted worker resumes with the same slot and counters.
    pub(crate) fn run(mut self) -> Self {
        info!(target: DISPATCH_TARGET, "dispatcher started");
        // Signals counted before a restart would otherwise wait for the next event.
        self.pump();
        while self.shared.dispatcher_running() {
            let Ok(event) = self.inbox.recv() else {
                warn!(target: DISPATCH_TARGET, "dispatcher inbox closed");
                break;
            };
            self.handle(event);
            if !self.shared.dispatcher_running() {
                break;
            }
            self.pump();
        }
        info!(target: DISPATCH_TARGET, "dispatcher stopped");
        self
    }

    /// Stops the reply timer and drops any command still awaiting a reply.
    pub(crate) fn shutdown(self) -> Result<(), TimerError> {
        if let Slot::Occupied(in_flight) = self.slot {
            debug!(
                target: DISPATCH_TARGET,
                opcode = %in_flight.opcode,
                sequence = in_flight.sequence,
                "discarding command still awaiting a reply"
            );
        }
        self.timer.shutdown()
    }

    fn handle(&mut self, event: DispatchEvent) {
        match event {
            DispatchEvent::CommandQueued => self.pending_signals += 1,
            DispatchEvent::Completed { sequence, reply } => self.complete(sequence, &reply),
            DispatchEvent::ReplyTimeout { sequence } => self.reply_timed_out(sequence),
            DispatchEvent::Stop => debug!(target: DISPATCH_TARGET, "stop requested"),
        }
    }

    /// Forwards queued commands while the slot is free.
    fn pump(&mut self) {
        while matches!(self.slot, Slot::Available) && self.pending_signals > 0 {
            self.pending_signals -= 1;
            match self.shared.queue.dequeue_head() {
                Some(command) => self.forward(command),
                None => debug!(target: DISPATCH_TARGET, "queue signal without a command"),
            }
        }
    }

    fn forward(&mut self, command: QueuedCommand) {
        if command.opcode() == Opcode::ENABLE_AUTOPAIR
            && let Some(client) = command.origin()
        {
            self.register_autopair_subscriber(client);
        }

        let sequence = self.next_sequence;
        self.next_sequence = self.next_sequence.wrapping_add(1);
        let (opcode, parameters, completion) = command.into_parts();
        let client = completion.client().map(ClientHandle::id);

        debug!(
            target: DISPATCH_TARGET,
            %opcode,
            sequence,
            parameter_len = parameters.len(),
            client = ?client,
            "forwarding command to controller"
        );
        self.slot = Slot::Occupied(InFlight {
            sequence,
            opcode,
            client,
            completion,
            timed_out: false,
        });

        let handler = CompletionHandler::new(sequence, self.inbox_sender.clone());
        self.hooks
            .transport
            .send_vendor_command(opcode, &parameters, handler);

        if let Err(error) = self
            .timer
            .arm(self.reply_timeout, TimerMode::OneShot, sequence)
        {
            warn!(
                target: DISPATCH_TARGET,
                %opcode,
                sequence,
                error = %error,
                "failed to arm reply timer"
            );
        }
    }

    fn register_autopair_subscriber(&self, client: &ClientHandle) {
        let previous = self.shared.subscriber.set(client.clone());
        info!(
            target: DISPATCH_TARGET,
            client = %client.id(),
            previous = ?previous,
            "auto-pair subscriber registered"
        );
    }

    fn complete(&mut self, sequence: u64, reply: &[u8]) {
        match mem::replace(&mut self.slot, Slot::Available) {
            Slot::Occupied(in_flight) if in_flight.sequence == sequence => {
                debug!(
                    target: DISPATCH_TARGET,
                    opcode = %in_flight.opcode,
                    sequence,
                    client = ?in_flight.client,
                    reply_len = reply.len(),
                    timed_out = in_flight.timed_out,
                    "controller replied"
                );
                in_flight.completion.deliver(reply);
                if let Err(error) = self.timer.cancel() {
                    warn!(
                        target: DISPATCH_TARGET,
                        error = %error,
                        "failed to cancel reply timer"
                    );
                }
            }
            Slot::Occupied(in_flight) => {
                warn!(
                    target: DISPATCH_TARGET,
                    sequence,
                    in_flight = in_flight.sequence,
                    "ignoring reply for a command that is not in flight"
                );
                self.slot = Slot::Occupied(in_flight);
            }
            Slot::Available => warn!(
                target: DISPATCH_TARGET,
                sequence,
                "ignoring reply while no command is in flight"
            ),
        }
    }

    fn reply_timed_out(&mut self, sequence: u64) {
        let Slot::Occupied(in_flight) = &mut self.slot else {
            debug!(target: DISPATCH_TARGET, sequence, "ignoring stale reply timeout");
            return;
        };
        if in_flight.sequence != sequence || in_flight.timed_out {
            debug!(target: DISPATCH_TARGET, sequence, "ignoring stale reply timeout");
            return;
        }

        in_flight.timed_out = true;
        warn!(
            target: DISPATCH_TARGET,
            opcode = %in_flight.opcode,
            sequence,
            timeout_ms = u64::try_from(self.reply_timeout.as_millis()).unwrap_or(u64::MAX),
            "controller did not reply; injecting hardware error event"
        );
        self.hooks.host.inject_event(&HARDWARE_ERROR_EVENT);
    }
}

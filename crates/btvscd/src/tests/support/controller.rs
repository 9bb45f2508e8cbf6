//! Scripted controller and host doubles.
//!
//! The controller records every forwarded command and tracks how many are
//! outstanding so tests can assert the single-slot rule directly.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::command::Opcode;
use crate::dispatch::CompletionHandler;
use crate::hooks::{ControllerTransport, HostEventSink};

/// How the scripted controller answers commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyMode {
    /// Reply immediately, from inside `send_vendor_command`.
    Echo,
    /// Hold the completion handler until the test releases it.
    Manual,
}

/// Command observed by the scripted controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentCommand {
    pub opcode: Opcode,
    pub parameters: Vec<u8>,
    pub sequence: u64,
}

#[derive(Default)]
struct ControllerState {
    sent: Vec<SentCommand>,
    pending: VecDeque<(Opcode, CompletionHandler)>,
    outstanding: usize,
    max_outstanding: usize,
}

/// Builds the command-complete event the scripted controller replies with.
#[must_use]
pub fn command_complete(opcode: Opcode) -> Vec<u8> {
    let [high, low] = opcode.get().to_be_bytes();
    vec![0x0e, 0x04, 0x01, low, high, 0x00]
}

pub struct ScriptedController {
    mode: ReplyMode,
    state: Mutex<ControllerState>,
    changed: Condvar,
}

impl ScriptedController {
    #[must_use]
    pub fn new(mode: ReplyMode) -> Self {
        Self {
            mode,
            state: Mutex::new(ControllerState::default()),
            changed: Condvar::new(),
        }
    }

    /// Commands forwarded so far, in order.
    #[must_use]
    pub fn sent(&self) -> Vec<SentCommand> {
        self.lock().sent.clone()
    }

    /// Opcodes forwarded so far, in order.
    #[must_use]
    pub fn sent_opcodes(&self) -> Vec<u16> {
        self.lock()
            .sent
            .iter()
            .map(|command| command.opcode.get())
            .collect()
    }

    /// Largest number of commands ever outstanding at once.
    #[must_use]
    pub fn max_outstanding(&self) -> usize {
        self.lock().max_outstanding
    }

    /// Blocks until at least `count` commands were forwarded.
    pub fn wait_for_sent(&self, count: usize, timeout: Duration) -> Vec<SentCommand> {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        while state.sent.len() < count {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            state = self
                .changed
                .wait_timeout(state, remaining)
                .expect("controller mutex poisoned")
                .0;
        }
        state.sent.clone()
    }

    /// Releases the oldest held handler with its command-complete reply.
    pub fn reply_next(&self) -> bool {
        let Some((opcode, handler)) = self.take_pending() else {
            return false;
        };
        handler.complete(&command_complete(opcode));
        true
    }

    /// Removes the oldest held handler without answering it.
    pub fn take_pending(&self) -> Option<(Opcode, CompletionHandler)> {
        let mut state = self.lock();
        let entry = state.pending.pop_front();
        if entry.is_some() {
            state.outstanding -= 1;
        }
        entry
    }

    fn lock(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().expect("controller mutex poisoned")
    }
}

impl ControllerTransport for ScriptedController {
    fn send_vendor_command(
        &self,
        opcode: Opcode,
        parameters: &[u8],
        on_complete: CompletionHandler,
    ) {
        let mut state = self.lock();
        state.sent.push(SentCommand {
            opcode,
            parameters: parameters.to_vec(),
            sequence: on_complete.sequence(),
        });
        state.outstanding += 1;
        state.max_outstanding = state.max_outstanding.max(state.outstanding);
        match self.mode {
            ReplyMode::Echo => {
                state.outstanding -= 1;
                drop(state);
                on_complete.complete(&command_complete(opcode));
            }
            ReplyMode::Manual => {
                state.pending.push_back((opcode, on_complete));
                drop(state);
            }
        }
        self.changed.notify_all();
    }
}

/// Host double recording injected packets.
#[derive(Default)]
pub struct RecordingHost {
    packets: Mutex<Vec<Vec<u8>>>,
    changed: Condvar,
}

impl RecordingHost {
    #[must_use]
    pub fn packets(&self) -> Vec<Vec<u8>> {
        self.packets.lock().expect("host mutex poisoned").clone()
    }

    /// Blocks until at least `count` packets were injected.
    pub fn wait_for_packets(&self, count: usize, timeout: Duration) -> Vec<Vec<u8>> {
        let deadline = Instant::now() + timeout;
        let mut packets = self.packets.lock().expect("host mutex poisoned");
        while packets.len() < count {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            packets = self
                .changed
                .wait_timeout(packets, remaining)
                .expect("host mutex poisoned")
                .0;
        }
        packets.clone()
    }
}

impl HostEventSink for RecordingHost {
    fn inject_event(&self, packet: &[u8]) {
        self.packets
            .lock()
            .expect("host mutex poisoned")
            .push(packet.to_vec());
        self.changed.notify_all();
    }
}

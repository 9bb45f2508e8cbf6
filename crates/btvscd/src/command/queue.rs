//! FIFO shared by every producer and the single dispatcher.

use std::collections::VecDeque;
use std::sync::mpsc::Sender;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use super::{COMMAND_TARGET, EnqueueError, QueuedCommand};
use crate::dispatch::DispatchEvent;

/// Mutex-guarded command FIFO that signals the dispatcher per insertion.
///
/// Each successful [`enqueue`](Self::enqueue) posts exactly one
/// [`DispatchEvent::CommandQueued`], so the dispatcher's count of pending
/// signals never lags the queue contents.
pub(crate) struct CommandQueue {
    entries: Mutex<VecDeque<QueuedCommand>>,
    ready: Sender<DispatchEvent>,
}

impl CommandQueue {
    pub(crate) fn new(ready: Sender<DispatchEvent>) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            ready,
        }
    }

    /// Appends `command` at the tail and wakes the dispatcher.
    ///
    /// On allocation failure the command is dropped and nothing is signalled.
    pub(crate) fn enqueue(&self, command: QueuedCommand) -> Result<(), EnqueueError> {
        let opcode = command.opcode();
        let parameter_len = command.parameters().len();
        {
            let mut entries = self.lock();
            if entries.try_reserve(1).is_err() {
                warn!(
                    target: COMMAND_TARGET,
                    %opcode,
                    "dropping command: queue allocation failed"
                );
                return Err(EnqueueError::Allocation { opcode });
            }
            entries.push_back(command);
        }

        debug!(target: COMMAND_TARGET, %opcode, parameter_len, "command queued");
        if self.ready.send(DispatchEvent::CommandQueued).is_err() {
            debug!(
                target: COMMAND_TARGET,
                %opcode,
                "dispatcher inbox closed; command stays queued until flush"
            );
        }
        Ok(())
    }

    /// Removes and returns the oldest command.
    pub(crate) fn dequeue_head(&self) -> Option<QueuedCommand> {
        self.lock().pop_front()
    }

    /// Discards every queued command and returns how many were dropped.
    pub(crate) fn flush(&self) -> usize {
        let drained: Vec<QueuedCommand> = self.lock().drain(..).collect();
        if !drained.is_empty() {
            debug!(
                target: COMMAND_TARGET,
                discarded = drained.len(),
                "flushed pending commands"
            );
        }
        drained.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<QueuedCommand>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

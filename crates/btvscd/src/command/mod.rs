//! Vendor commands awaiting dispatch to the controller.
//!
//! Commands arrive either from local clients through the connection
//! multiplexer or from in-process callers through
//! [`CommandService::enqueue_external_command`](crate::CommandService::enqueue_external_command).
//! Both paths converge on [`QueuedCommand`] and the shared FIFO in
//! [`queue`].

mod completion;
pub(crate) mod queue;

use std::fmt;

use thiserror::Error;

use crate::transport::ClientHandle;

pub use self::completion::Completion;

pub(crate) const COMMAND_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::command");

/// Largest parameter block a single vendor command may carry.
pub const MAX_PARAMETER_LEN: usize = u8::MAX as usize;

/// Sixteen-bit vendor command opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Opcode(u16);

impl Opcode {
    /// Opcode that subscribes the issuing client to auto-pair vendor events.
    pub const ENABLE_AUTOPAIR: Self = Self(0xfc77);

    /// Wraps a raw opcode.
    #[must_use]
    pub const fn new(raw: u16) -> Self {
        Self(raw)
    }

    /// Builds an opcode from its wire bytes, high byte first.
    #[must_use]
    pub const fn from_wire(high: u8, low: u8) -> Self {
        Self(((high as u16) << 8) | low as u16)
    }

    /// Raw opcode value.
    #[must_use]
    pub const fn get(self) -> u16 {
        self.0
    }
}

impl From<u16> for Opcode {
    fn from(raw: u16) -> Self {
        Self(raw)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{:#06x}", self.0)
    }
}

/// Errors raised when a command cannot be queued.
#[derive(Debug, Error)]
pub enum EnqueueError {
    /// The parameter block does not fit the one-byte length field.
    #[error("parameter block of {len} bytes exceeds the {max}-byte limit")]
    ParametersTooLong {
        /// Length supplied by the caller.
        len: usize,
        /// Largest accepted length.
        max: usize,
    },
    /// Queue storage could not grow; the command was dropped.
    #[error("failed to reserve queue capacity for opcode {opcode}")]
    Allocation {
        /// Opcode of the dropped command.
        opcode: Opcode,
    },
}

/// A command waiting in the FIFO for the dispatcher.
pub(crate) struct QueuedCommand {
    opcode: Opcode,
    parameters: Vec<u8>,
    completion: Completion,
}

impl QueuedCommand {
    pub(crate) fn new(
        opcode: Opcode,
        parameters: Vec<u8>,
        completion: Completion,
    ) -> Result<Self, EnqueueError> {
        if parameters.len() > MAX_PARAMETER_LEN {
            return Err(EnqueueError::ParametersTooLong {
                len: parameters.len(),
                max: MAX_PARAMETER_LEN,
            });
        }
        Ok(Self {
            opcode,
            parameters,
            completion,
        })
    }

    pub(crate) fn opcode(&self) -> Opcode {
        self.opcode
    }

    pub(crate) fn parameters(&self) -> &[u8] {
        &self.parameters
    }

    /// Client that submitted the command, if it came over the socket.
    pub(crate) fn origin(&self) -> Option<&ClientHandle> {
        self.completion.client()
    }

    pub(crate) fn into_parts(self) -> (Opcode, Vec<u8>, Completion) {
        (self.opcode, self.parameters, self.completion)
    }
}

impl fmt::Debug for QueuedCommand {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("QueuedCommand")
            .field("opcode", &self.opcode)
            .field("parameter_len", &self.parameters.len())
            .field("completion", &self.completion)
            .finish()
    }
}

//! Errors raised by the service lifecycle.

use std::fmt;
use std::io;

use thiserror::Error;

use crate::dispatch::TimerError;
use crate::transport::{ListenerError, MultiplexerError};

/// Collaborator that must be supplied before initialisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hook {
    /// The [`ControllerTransport`](crate::ControllerTransport).
    ControllerTransport,
    /// The [`HostEventSink`](crate::HostEventSink).
    HostEventSink,
}

impl fmt::Display for Hook {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Self::ControllerTransport => "controller transport",
            Self::HostEventSink => "host event sink",
        })
    }
}

/// Background thread owned by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Worker {
    /// Connection multiplexer thread.
    Multiplexer,
    /// Command dispatcher thread.
    Dispatcher,
}

impl Worker {
    pub(crate) fn thread_name(self) -> &'static str {
        match self {
            Self::Multiplexer => "btvsc-multiplexer",
            Self::Dispatcher => "btvsc-dispatcher",
        }
    }
}

impl fmt::Display for Worker {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Self::Multiplexer => "multiplexer",
            Self::Dispatcher => "dispatcher",
        })
    }
}

/// Errors surfaced while initialising, starting or stopping the service.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// A required collaborator was not supplied.
    #[error("missing required hook: {hook}")]
    MissingHook {
        /// The absent collaborator.
        hook: Hook,
    },
    /// The reply timer could not be created or stopped.
    #[error("reply timer failed: {source}")]
    Timer {
        /// Underlying timer error.
        #[source]
        source: TimerError,
    },
    /// The service socket could not be bound.
    #[error("failed to bind service socket: {source}")]
    Listener {
        /// Underlying listener error.
        #[source]
        source: ListenerError,
    },
    /// The readiness poller could not be prepared.
    #[error("failed to prepare connection multiplexer: {source}")]
    Multiplexer {
        /// Underlying poller error.
        #[source]
        source: MultiplexerError,
    },
    /// A worker thread could not be spawned.
    #[error("failed to spawn {worker} thread: {source}")]
    Spawn {
        /// Worker that failed to start.
        worker: Worker,
        /// Underlying spawn error.
        #[source]
        source: io::Error,
    },
    /// A worker thread panicked; the service cannot be restarted.
    #[error("{worker} thread panicked")]
    WorkerPanicked {
        /// Worker that panicked.
        worker: Worker,
    },
    /// Worker state was lost to an earlier failure.
    #[error("service workers were lost to an earlier failure")]
    WorkersLost,
}

/// Summary of what [`CommandService::shutdown`](crate::CommandService::shutdown) released.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Commands still queued and never sent to the controller.
    pub discarded_commands: usize,
    /// Client connections open at shutdown.
    pub closed_connections: usize,
}

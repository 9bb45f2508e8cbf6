//! Local socket transport for client commands.
//!
//! The transport binds the configured endpoint, multiplexes client
//! connections on a single thread and frames their requests into queued
//! commands. Replies travel back through the [`ClientHandle`] captured in
//! each command.

mod connection;
mod errors;
mod framer;
mod listener;
mod multiplexer;

pub use self::connection::{ClientHandle, ClientId};
pub use self::errors::{ListenerError, MultiplexerError};
pub(crate) use self::listener::ServiceListener;
pub(crate) use self::multiplexer::Multiplexer;

const TRANSPORT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");

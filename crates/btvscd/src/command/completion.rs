use std::fmt;

use tracing::warn;

use super::COMMAND_TARGET;
use crate::transport::ClientHandle;

/// Destination for the controller's reply to a command.
pub enum Completion {
    /// Write the reply bytes back to the client that sent the command.
    Client(ClientHandle),
    /// Hand the reply to an in-process callback.
    Callback(Box<dyn FnOnce(&[u8]) + Send>),
    /// Nobody is waiting for the reply.
    Discard,
}

impl Completion {
    /// Wraps a closure as a completion.
    pub fn callback<F>(callback: F) -> Self
    where
        F: FnOnce(&[u8]) + Send + 'static,
    {
        Self::Callback(Box::new(callback))
    }

    /// Client that will receive the reply, if any.
    #[must_use]
    pub fn client(&self) -> Option<&ClientHandle> {
        match self {
            Self::Client(client) => Some(client),
            Self::Callback(_) | Self::Discard => None,
        }
    }

    /// Routes `reply` to its destination.
    ///
    /// Socket write failures are logged; the peer may already have gone.
    pub(crate) fn deliver(self, reply: &[u8]) {
        match self {
            Self::Client(client) => {
                if let Err(error) = client.send(reply) {
                    warn!(
                        target: COMMAND_TARGET,
                        client = %client.id(),
                        error = %error,
                        "failed to deliver reply to client"
                    );
                }
            }
            Self::Callback(callback) => callback(reply),
            Self::Discard => {}
        }
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Client(client) => formatter.debug_tuple("Client").field(&client.id()).finish(),
            Self::Callback(_) => formatter.write_str("Callback"),
            Self::Discard => formatter.write_str("Discard"),
        }
    }
}

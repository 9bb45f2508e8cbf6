//! Client connection handles shared between the multiplexer and the dispatcher.

use std::fmt;
use std::io;
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::sync::Arc;

use socket2::SockRef;

/// Identifier assigned to an accepted client connection.
///
/// Identifiers are never reused while the service runs, so a stale
/// identifier can never alias a newer connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(usize);

impl ClientId {
    pub(crate) const fn new(raw: usize) -> Self {
        Self(raw)
    }

    /// Raw identifier value.
    #[must_use]
    pub const fn get(self) -> usize {
        self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "client-{}", self.0)
    }
}

/// Cloneable handle to an accepted client connection.
///
/// The multiplexer reads frames through it while queued commands hold
/// clones so replies can be written back from the dispatcher thread.
#[derive(Clone)]
pub struct ClientHandle {
    id: ClientId,
    stream: Arc<UnixStream>,
}

impl ClientHandle {
    pub(crate) fn new(id: ClientId, stream: UnixStream) -> Self {
        Self {
            id,
            stream: Arc::new(stream),
        }
    }

    /// Identifier of the connection.
    #[must_use]
    pub fn id(&self) -> ClientId {
        self.id
    }

    pub(crate) fn stream(&self) -> &UnixStream {
        &self.stream
    }

    /// Writes `bytes` in full without raising `SIGPIPE` when the peer has gone.
    pub(crate) fn send(&self, bytes: &[u8]) -> io::Result<()> {
        let socket = SockRef::from(&*self.stream);
        let mut remaining = bytes;
        while !remaining.is_empty() {
            match socket.send_with_flags(remaining, libc::MSG_NOSIGNAL) {
                Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero)),
                Ok(sent) => remaining = remaining.get(sent..).unwrap_or_default(),
                Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
                Err(error) => return Err(error),
            }
        }
        Ok(())
    }

    /// Shuts both directions down so the peer observes the close even while
    /// queued commands still hold clones of this handle.
    pub(crate) fn close(&self) {
        if let Err(error) = self.stream.shutdown(Shutdown::Both)
            && error.kind() != io::ErrorKind::NotConnected
        {
            tracing::debug!(
                target: super::TRANSPORT_TARGET,
                client = %self.id,
                error = %error,
                "socket shutdown failed"
            );
        }
    }
}

impl fmt::Debug for ClientHandle {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ClientHandle")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

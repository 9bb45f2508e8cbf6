//! Error types for the listening socket and the connection multiplexer.

use std::io;

use thiserror::Error;

/// Errors surfaced while binding the service socket.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// The endpoint does not form a valid socket address.
    #[error("invalid socket address for {endpoint}: {source}")]
    Address {
        /// Endpoint as configured.
        endpoint: String,
        /// Address construction error.
        #[source]
        source: io::Error,
    },
    /// The socket could not be created.
    #[error("failed to create socket: {source}")]
    Create {
        /// OS error from `socket(2)`.
        #[source]
        source: io::Error,
    },
    /// Binding the endpoint failed.
    #[error("failed to bind {endpoint}: {source}")]
    Bind {
        /// Endpoint as configured.
        endpoint: String,
        /// OS error from `bind(2)`.
        #[source]
        source: io::Error,
    },
    /// Listening on the bound socket failed.
    #[error("failed to listen on {endpoint} with backlog {backlog}: {source}")]
    Listen {
        /// Endpoint as configured.
        endpoint: String,
        /// Requested backlog.
        backlog: u32,
        /// OS error from `listen(2)`.
        #[source]
        source: io::Error,
    },
    /// The listener could not be switched to non-blocking mode.
    #[error("failed to enable non-blocking listener: {source}")]
    NonBlocking {
        /// OS error from `fcntl(2)`.
        #[source]
        source: io::Error,
    },
    /// Another process is serving the socket path.
    #[error("existing unix socket {path} is already in use")]
    UnixInUse {
        /// Socket path.
        path: String,
    },
    /// Something other than a socket occupies the path.
    #[error("unix socket path {path} is not a socket")]
    UnixNotSocket {
        /// Occupied path.
        path: String,
    },
    /// The existing path could not be inspected.
    #[error("failed to read metadata for unix socket {path}: {source}")]
    UnixMetadata {
        /// Socket path.
        path: String,
        /// Metadata error.
        #[source]
        source: io::Error,
    },
    /// Connecting to the existing socket failed unexpectedly.
    #[error("failed to connect to existing unix socket {path}: {source}")]
    UnixConnect {
        /// Socket path.
        path: String,
        /// Error other than a refused connection.
        #[source]
        source: io::Error,
    },
    /// A stale socket node could not be removed.
    #[error("failed to remove stale unix socket {path}: {source}")]
    UnixCleanup {
        /// Socket path.
        path: String,
        /// Removal error.
        #[source]
        source: io::Error,
    },
}

/// Errors surfaced while preparing the readiness poller.
#[derive(Debug, Error)]
pub enum MultiplexerError {
    /// The poller could not be created.
    #[error("failed to create readiness poller: {source}")]
    Poll {
        /// OS error.
        #[source]
        source: io::Error,
    },
    /// The waker could not be registered.
    #[error("failed to create multiplexer waker: {source}")]
    Waker {
        /// OS error.
        #[source]
        source: io::Error,
    },
    /// The listener could not be registered with the poller.
    #[error("failed to register the listening socket: {source}")]
    Register {
        /// OS error.
        #[source]
        source: io::Error,
    },
}

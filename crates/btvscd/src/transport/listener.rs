//! Listening socket for local client connections.

use std::fs;
use std::io;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::os::unix::fs::FileTypeExt;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::Path;

use socket2::{Domain, SockAddr, Socket, Type};
use tracing::{debug, warn};

use btvsc_config::SocketEndpoint;

use super::{ListenerError, TRANSPORT_TARGET};

/// Non-blocking listener bound to the configured endpoint.
///
/// Filesystem socket nodes are removed again when the listener drops.
#[derive(Debug)]
pub(crate) struct ServiceListener {
    endpoint: SocketEndpoint,
    listener: UnixListener,
}

impl ServiceListener {
    pub(crate) fn bind(endpoint: &SocketEndpoint, backlog: u32) -> Result<Self, ListenerError> {
        let address = match endpoint {
            SocketEndpoint::Abstract { name } => abstract_address(endpoint, name)?,
            SocketEndpoint::Unix { path } => {
                clear_stale_socket(path.as_std_path())?;
                SockAddr::unix(path.as_std_path()).map_err(|source| ListenerError::Address {
                    endpoint: endpoint.to_string(),
                    source,
                })?
            }
        };

        let socket = Socket::new(Domain::UNIX, Type::STREAM, None)
            .map_err(|source| ListenerError::Create { source })?;
        socket
            .bind(&address)
            .map_err(|source| ListenerError::Bind {
                endpoint: endpoint.to_string(),
                source,
            })?;

        match start_listening(&socket, endpoint, backlog) {
            Ok(()) => {
                debug!(
                    target: TRANSPORT_TARGET,
                    endpoint = %endpoint,
                    backlog,
                    "service socket bound"
                );
                Ok(Self {
                    endpoint: endpoint.clone(),
                    listener: UnixListener::from(OwnedFd::from(socket)),
                })
            }
            Err(error) => {
                cleanup_unix_socket(endpoint);
                Err(error)
            }
        }
    }

    pub(crate) fn endpoint(&self) -> &SocketEndpoint {
        &self.endpoint
    }

    /// Accepts one pending connection, or `None` when nothing is waiting.
    pub(crate) fn accept(&self) -> io::Result<Option<UnixStream>> {
        match self.listener.accept() {
            Ok((stream, _)) => {
                stream.set_nonblocking(false)?;
                Ok(Some(stream))
            }
            Err(error) if error.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(error) => Err(error),
        }
    }
}

impl AsRawFd for ServiceListener {
    fn as_raw_fd(&self) -> RawFd {
        self.listener.as_raw_fd()
    }
}

impl Drop for ServiceListener {
    fn drop(&mut self) {
        cleanup_unix_socket(&self.endpoint);
    }
}

fn abstract_address(endpoint: &SocketEndpoint, name: &str) -> Result<SockAddr, ListenerError> {
    SockAddr::unix(format!("\0{name}")).map_err(|source| ListenerError::Address {
        endpoint: endpoint.to_string(),
        source,
    })
}

fn start_listening(
    socket: &Socket,
    endpoint: &SocketEndpoint,
    backlog: u32,
) -> Result<(), ListenerError> {
    let queue_len = i32::try_from(backlog).unwrap_or(i32::MAX);
    socket
        .listen(queue_len)
        .map_err(|source| ListenerError::Listen {
            endpoint: endpoint.to_string(),
            backlog,
            source,
        })?;
    socket
        .set_nonblocking(true)
        .map_err(|source| ListenerError::NonBlocking { source })
}

fn clear_stale_socket(path: &Path) -> Result<(), ListenerError> {
    if !path.exists() {
        return Ok(());
    }
    let metadata = fs::symlink_metadata(path).map_err(|source| ListenerError::UnixMetadata {
        path: path.display().to_string(),
        source,
    })?;
    if !metadata.file_type().is_socket() {
        return Err(ListenerError::UnixNotSocket {
            path: path.display().to_string(),
        });
    }
    match UnixStream::connect(path) {
        Ok(_stream) => Err(ListenerError::UnixInUse {
            path: path.display().to_string(),
        }),
        Err(error)
            if error.kind() == io::ErrorKind::ConnectionRefused
                || error.kind() == io::ErrorKind::NotFound =>
        {
            fs::remove_file(path).map_err(|source| ListenerError::UnixCleanup {
                path: path.display().to_string(),
                source,
            })
        }
        Err(source) => Err(ListenerError::UnixConnect {
            path: path.display().to_string(),
            source,
        }),
    }
}

fn cleanup_unix_socket(endpoint: &SocketEndpoint) {
    let SocketEndpoint::Unix { path } = endpoint else {
        return;
    };
    if let Err(error) = fs::remove_file(path.as_std_path())
        && error.kind() != io::ErrorKind::NotFound
    {
        warn!(
            target: TRANSPORT_TARGET,
            error = %error,
            path = %path,
            "failed to remove unix socket file"
        );
    }
}

//! Socket client used to drive the service from tests.

use std::io::{self, Read, Write};
use std::os::unix::net::UnixStream;
use std::time::Duration;

use btvsc_config::SocketEndpoint;

const READ_TIMEOUT: Duration = Duration::from_secs(3);

/// Encodes a command frame.
#[must_use]
pub fn command_frame(opcode: u16, parameters: &[u8]) -> Vec<u8> {
    let [high, low] = opcode.to_be_bytes();
    let len = u8::try_from(parameters.len()).expect("parameters fit one length byte");
    let mut frame = vec![0x01, high, low, len];
    frame.extend_from_slice(parameters);
    frame
}

pub struct TestClient {
    stream: UnixStream,
}

impl TestClient {
    /// Connects to `endpoint`.
    pub fn connect(endpoint: &SocketEndpoint) -> Self {
        let stream = match endpoint {
            SocketEndpoint::Unix { path } => {
                UnixStream::connect(path.as_std_path()).expect("connect unix client")
            }
            SocketEndpoint::Abstract { name } => connect_abstract(name),
        };
        stream
            .set_read_timeout(Some(READ_TIMEOUT))
            .expect("set read timeout");
        Self { stream }
    }

    pub fn send_command(&mut self, opcode: u16, parameters: &[u8]) {
        self.send_raw(&command_frame(opcode, parameters));
    }

    pub fn send_close(&mut self) {
        self.send_raw(&[0x02]);
    }

    pub fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).expect("write to service");
    }

    /// Reads exactly `len` bytes.
    pub fn read_exact(&mut self, len: usize) -> Vec<u8> {
        let mut buffer = vec![0; len];
        self.stream.read_exact(&mut buffer).expect("read from service");
        buffer
    }

    /// Whether nothing arrives within `wait`.
    pub fn is_silent_for(&mut self, wait: Duration) -> bool {
        self.stream
            .set_read_timeout(Some(wait))
            .expect("set read timeout");
        let mut buffer = [0_u8; 1];
        let silent = match self.stream.read(&mut buffer) {
            Ok(_) => false,
            Err(error) => matches!(
                error.kind(),
                io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
            ),
        };
        self.stream
            .set_read_timeout(Some(READ_TIMEOUT))
            .expect("set read timeout");
        silent
    }

    /// Whether the service has closed the connection.
    pub fn is_closed(&mut self) -> bool {
        let mut buffer = [0_u8; 1];
        match self.stream.read(&mut buffer) {
            Ok(0) => true,
            Ok(_) => false,
            Err(error) => error.kind() == io::ErrorKind::ConnectionReset,
        }
    }
}

#[cfg(target_os = "linux")]
fn connect_abstract(name: &str) -> UnixStream {
    use std::os::linux::net::SocketAddrExt;
    use std::os::unix::net::SocketAddr;

    let address = SocketAddr::from_abstract_name(name.as_bytes()).expect("abstract address");
    UnixStream::connect_addr(&address).expect("connect abstract client")
}

#[cfg(not(target_os = "linux"))]
fn connect_abstract(name: &str) -> UnixStream {
    panic!("abstract socket {name} is only reachable on Linux")
}

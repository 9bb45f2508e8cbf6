//! Configuration helpers and loaders for success and failure paths.

use std::ffi::OsString;
use std::sync::Arc;

use ortho_config::{OrthoConfig, OrthoError};
use tempfile::TempDir;

use btvsc_config::{Config, SocketEndpoint};

use crate::bootstrap::ConfigLoader;

/// Reply timeout short enough to exercise the watchdog quickly.
pub const TEST_REPLY_TIMEOUT_MS: u64 = 200;

/// Builds a configuration whose socket lives under `dir`.
#[must_use]
pub fn test_config(dir: &TempDir) -> Config {
    let path = dir.path().join("run").join("btvsc.sock");
    Config {
        service_socket: SocketEndpoint::unix(
            path.to_str()
                .expect("temporary socket path was not valid UTF-8"),
        ),
        reply_timeout_ms: TEST_REPLY_TIMEOUT_MS,
        poll_interval_ms: 50,
        ..Config::default()
    }
}

/// Loader that provisions a Unix socket path under a temporary directory.
pub struct TestConfigLoader {
    dir: TempDir,
}

impl TestConfigLoader {
    #[must_use]
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("failed to create temporary directory for socket"),
        }
    }
}

impl ConfigLoader for TestConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(test_config(&self.dir))
    }
}

/// Loader that resolves with no file, environment or flag overrides.
pub struct DefaultsConfigLoader;

impl ConfigLoader for DefaultsConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Config::load_from_iter([OsString::from("btvscd")])
    }
}

/// Loader that intentionally fails by passing an invalid socket.
pub struct FailingConfigLoader;

impl ConfigLoader for FailingConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        let args = vec![
            OsString::from("btvscd"),
            OsString::from("--service-socket"),
            OsString::from("tcp://127.0.0.1:9"),
        ];
        Config::load_from_iter(args)
    }
}

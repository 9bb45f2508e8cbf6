//! Running service wired to scripted collaborators.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tempfile::TempDir;

use btvsc_config::Config;

use super::client::TestClient;
use super::config_loader::test_config;
use super::controller::{RecordingHost, ReplyMode, ScriptedController};
use super::reporter::RecordingHealthReporter;
use crate::service::{CommandService, ShutdownReport};

/// Generous bound for anything crossing a thread boundary.
pub const PATIENCE: Duration = Duration::from_secs(3);

/// Polls `condition` until it holds or `PATIENCE` runs out.
pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + PATIENCE;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}

pub struct ServiceHarness {
    _dir: TempDir,
    pub config: Config,
    pub controller: Arc<ScriptedController>,
    pub host: Arc<RecordingHost>,
    pub reporter: Arc<RecordingHealthReporter>,
    service: Option<CommandService>,
}

impl ServiceHarness {
    /// Initialises and starts a service whose controller answers per `mode`.
    pub fn start(mode: ReplyMode) -> Self {
        Self::start_with(mode, |_| {})
    }

    /// As [`start`](Self::start), adjusting the configuration first.
    pub fn start_with(mode: ReplyMode, adjust: impl FnOnce(&mut Config)) -> Self {
        let mut harness = Self::init_with(mode, adjust);
        harness.service_mut().start().expect("start service");
        harness
    }

    /// Initialises a service without starting its workers.
    pub fn init_with(mode: ReplyMode, adjust: impl FnOnce(&mut Config)) -> Self {
        let dir = TempDir::new().expect("temp dir");
        let mut config = test_config(&dir);
        adjust(&mut config);
        config
            .service_socket()
            .prepare_filesystem()
            .expect("prepare socket directory");

        let controller = Arc::new(ScriptedController::new(mode));
        let host = Arc::new(RecordingHost::default());
        let reporter = Arc::new(RecordingHealthReporter::default());
        let service = CommandService::builder(config.clone())
            .transport(controller.clone())
            .host(host.clone())
            .reporter(reporter.clone())
            .init()
            .expect("initialise service");

        Self {
            _dir: dir,
            config,
            controller,
            host,
            reporter,
            service: Some(service),
        }
    }

    pub fn service(&self) -> &CommandService {
        self.service.as_ref().expect("service already shut down")
    }

    pub fn service_mut(&mut self) -> &mut CommandService {
        self.service.as_mut().expect("service already shut down")
    }

    pub fn connect(&self) -> TestClient {
        let expected = self.service().connected_clients() + 1;
        let client = TestClient::connect(self.service().endpoint());
        // Only meaningful while the multiplexer runs.
        if self.service().is_running() {
            assert!(
                wait_until(|| self.service().connected_clients() >= expected),
                "service never registered the client"
            );
        }
        client
    }

    pub fn shutdown(&mut self) -> ShutdownReport {
        self.service
            .take()
            .expect("service already shut down")
            .shutdown()
            .expect("shutdown service")
    }
}

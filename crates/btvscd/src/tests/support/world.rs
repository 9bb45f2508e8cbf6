//! BDD test worlds: bootstrap state and a running service with its clients.

use std::cell::RefCell;
use std::sync::Arc;

use crate::bootstrap::{BootstrapError, ConfigLoader, ServiceHooks, bootstrap_with};
use crate::intercept::InterceptOutcome;
use crate::service::CommandService;

use super::client::TestClient;
use super::config_loader::{FailingConfigLoader, TestConfigLoader};
use super::controller::{RecordingHost, ReplyMode, ScriptedController};
use super::harness::ServiceHarness;
use super::reporter::RecordingHealthReporter;

/// Bootstrap scenario state.
pub struct BootstrapWorld {
    loader: Box<dyn ConfigLoader>,
    pub reporter: Arc<RecordingHealthReporter>,
    service: Option<CommandService>,
    bootstrap_error: Option<BootstrapError>,
}

impl BootstrapWorld {
    #[must_use]
    pub fn new() -> Self {
        Self {
            loader: Box::new(TestConfigLoader::new()),
            reporter: Arc::new(RecordingHealthReporter::default()),
            service: None,
            bootstrap_error: None,
        }
    }

    pub fn use_failing_loader(&mut self) {
        self.loader = Box::new(FailingConfigLoader);
    }

    pub fn use_successful_loader(&mut self) {
        self.loader = Box::new(TestConfigLoader::new());
    }

    /// Runs the bootstrap sequence once.
    pub fn bootstrap(&mut self) {
        if self.service.is_some() || self.bootstrap_error.is_some() {
            return;
        }
        let hooks = ServiceHooks {
            transport: Arc::new(ScriptedController::new(ReplyMode::Echo)),
            host: Arc::new(RecordingHost::default()),
        };
        match bootstrap_with(&*self.loader, self.reporter.clone(), hooks) {
            Ok(service) => self.service = Some(service),
            Err(error) => self.bootstrap_error = Some(error),
        }
    }

    #[must_use]
    pub fn bootstrap_error(&self) -> Option<&BootstrapError> {
        self.bootstrap_error.as_ref()
    }

    #[must_use]
    pub fn service(&self) -> Option<&CommandService> {
        self.service.as_ref()
    }
}

impl Drop for BootstrapWorld {
    fn drop(&mut self) {
        if let Some(service) = self.service.take() {
            service.shutdown().expect("shutdown bootstrapped service");
        }
    }
}

/// Running-service scenario state.
#[derive(Default)]
pub struct ServiceWorld {
    harness: Option<ServiceHarness>,
    pub client: Option<TestClient>,
    pub outcome: Option<InterceptOutcome>,
}

impl ServiceWorld {
    pub fn start(&mut self, mode: ReplyMode) {
        self.harness = Some(ServiceHarness::start(mode));
    }

    pub fn harness(&self) -> &ServiceHarness {
        self.harness.as_ref().expect("service not started")
    }

    pub fn connect(&mut self) {
        let client = self.harness().connect();
        self.client = Some(client);
    }

    pub fn client(&mut self) -> &mut TestClient {
        self.client.as_mut().expect("client not connected")
    }
}

#[must_use]
pub fn bootstrap_world() -> RefCell<BootstrapWorld> {
    RefCell::new(BootstrapWorld::new())
}

#[must_use]
pub fn service_world() -> RefCell<ServiceWorld> {
    RefCell::new(ServiceWorld::default())
}

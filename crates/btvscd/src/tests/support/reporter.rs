//! Test double for [`HealthReporter`] that records lifecycle events for assertions.

use std::sync::Mutex;

use btvsc_config::SocketEndpoint;

use crate::bootstrap::BootstrapError;
use crate::health::HealthReporter;
use crate::service::{ServiceError, ShutdownReport};

/// Structured health events tracked during tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthEvent {
    InitStarting,
    InitSucceeded(String),
    InitFailed(String),
    WorkersStarted,
    WorkersStopped,
    ShutdownComplete(ShutdownReport),
    BootstrapFailed(String),
}

/// Records health events for assertions.
#[derive(Debug, Default)]
pub struct RecordingHealthReporter {
    events: Mutex<Vec<HealthEvent>>,
}

impl RecordingHealthReporter {
    /// Captures a copy of the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<HealthEvent> {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .clone()
    }

    fn record(&self, event: HealthEvent) {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .push(event);
    }
}

impl HealthReporter for RecordingHealthReporter {
    fn init_starting(&self) {
        self.record(HealthEvent::InitStarting);
    }

    fn init_succeeded(&self, endpoint: &SocketEndpoint) {
        self.record(HealthEvent::InitSucceeded(endpoint.to_string()));
    }

    fn init_failed(&self, error: &ServiceError) {
        self.record(HealthEvent::InitFailed(error.to_string()));
    }

    fn workers_started(&self) {
        self.record(HealthEvent::WorkersStarted);
    }

    fn workers_stopped(&self) {
        self.record(HealthEvent::WorkersStopped);
    }

    fn shutdown_complete(&self, report: &ShutdownReport) {
        self.record(HealthEvent::ShutdownComplete(*report));
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        self.record(HealthEvent::BootstrapFailed(error.to_string()));
    }
}

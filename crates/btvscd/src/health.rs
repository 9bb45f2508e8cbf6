//! Structured health reporting for service lifecycle events.

use std::sync::Arc;

use btvsc_config::SocketEndpoint;

use crate::bootstrap::BootstrapError;
use crate::service::{ServiceError, ShutdownReport};

const HEALTH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::health");

/// Observer trait used to surface lifecycle events to telemetry sinks.
pub trait HealthReporter: Send + Sync {
    /// Invoked before resources are acquired.
    fn init_starting(&self);

    /// Invoked once every resource is held and the socket is bound.
    fn init_succeeded(&self, endpoint: &SocketEndpoint);

    /// Invoked when initialisation fails.
    fn init_failed(&self, error: &ServiceError);

    /// Invoked after both worker threads are launched.
    fn workers_started(&self);

    /// Invoked after both worker threads are joined.
    fn workers_stopped(&self);

    /// Invoked when shutdown has released every resource.
    fn shutdown_complete(&self, report: &ShutdownReport);

    /// Invoked when bootstrap fails before the service exists.
    fn bootstrap_failed(&self, error: &BootstrapError);
}

impl<T> HealthReporter for Arc<T>
where
    T: HealthReporter,
{
    fn init_starting(&self) {
        (**self).init_starting();
    }

    fn init_succeeded(&self, endpoint: &SocketEndpoint) {
        (**self).init_succeeded(endpoint);
    }

    fn init_failed(&self, error: &ServiceError) {
        (**self).init_failed(error);
    }

    fn workers_started(&self) {
        (**self).workers_started();
    }

    fn workers_stopped(&self) {
        (**self).workers_stopped();
    }

    fn shutdown_complete(&self, report: &ShutdownReport) {
        (**self).shutdown_complete(report);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        (**self).bootstrap_failed(error);
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds a new reporter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn init_starting(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "init_starting",
            "initialising vendor command service"
        );
    }

    fn init_succeeded(&self, endpoint: &SocketEndpoint) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "init_succeeded",
            socket = %endpoint,
            "vendor command service initialised"
        );
    }

    fn init_failed(&self, error: &ServiceError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "init_failed",
            error = %error,
            "vendor command service failed to initialise"
        );
    }

    fn workers_started(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "workers_started",
            "multiplexer and dispatcher running"
        );
    }

    fn workers_stopped(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "workers_stopped",
            "multiplexer and dispatcher stopped"
        );
    }

    fn shutdown_complete(&self, report: &ShutdownReport) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "shutdown_complete",
            discarded_commands = report.discarded_commands,
            closed_connections = report.closed_connections,
            "vendor command service shut down"
        );
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "bootstrap_failed",
            error = %error,
            "service bootstrap failed"
        );
    }
}

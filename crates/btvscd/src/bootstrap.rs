//! Service bootstrap orchestration.

use std::sync::Arc;

use ortho_config::{OrthoConfig, OrthoError};
use thiserror::Error;

use btvsc_config::{Config, SocketPreparationError};

use crate::health::HealthReporter;
use crate::hooks::{ControllerTransport, HostEventSink};
use crate::service::{CommandService, ServiceError};
use crate::telemetry::{self, TelemetryError};

/// Trait abstracting configuration loading for testability.
pub trait ConfigLoader: Send + Sync {
    /// Loads the service configuration.
    fn load(&self) -> Result<Config, Arc<OrthoError>>;
}

/// Loader that delegates to [`Config::load`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConfigLoader;

impl ConfigLoader for SystemConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Config::load()
    }
}

/// Loader returning a configuration assembled in code.
#[derive(Debug, Clone)]
pub struct StaticConfigLoader {
    config: Config,
}

impl StaticConfigLoader {
    /// Wraps `config`.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ConfigLoader for StaticConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(self.config.clone())
    }
}

/// Collaborators the embedding stack provides.
#[derive(Clone)]
pub struct ServiceHooks {
    /// Forwards commands to the controller.
    pub transport: Arc<dyn ControllerTransport>,
    /// Receives synthesised events.
    pub host: Arc<dyn HostEventSink>,
}

/// Errors surfaced during bootstrap.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Configuration {
        /// Underlying loader error.
        #[source]
        source: Arc<OrthoError>,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
    /// Socket preparation failed.
    #[error("failed to prepare service socket: {source}")]
    Socket {
        /// Filesystem error reported while preparing the socket directory.
        #[source]
        source: SocketPreparationError,
    },
    /// The service could not be initialised or started.
    #[error("failed to start vendor command service: {source}")]
    Service {
        /// Underlying lifecycle error.
        #[source]
        source: ServiceError,
    },
}

/// Loads configuration, installs telemetry and starts the service.
///
/// The returned service is running; the caller owns its shutdown.
///
/// # Errors
///
/// Returns [`BootstrapError`] for the first step that fails. The reporter
/// sees every failure.
pub fn bootstrap_with(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
    hooks: ServiceHooks,
) -> Result<CommandService, BootstrapError> {
    bring_up(loader, Arc::clone(&reporter), hooks).inspect_err(|error| {
        reporter.bootstrap_failed(error);
    })
}

fn bring_up(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
    hooks: ServiceHooks,
) -> Result<CommandService, BootstrapError> {
    let config = loader
        .load()
        .map_err(|source| BootstrapError::Configuration { source })?;
    telemetry::initialise(&config).map_err(|source| BootstrapError::Telemetry { source })?;
    config
        .service_socket()
        .prepare_filesystem()
        .map_err(|source| BootstrapError::Socket { source })?;

    let mut service = CommandService::builder(config)
        .transport(hooks.transport)
        .host(hooks.host)
        .reporter(reporter)
        .init()
        .map_err(|source| BootstrapError::Service { source })?;
    service
        .start()
        .map_err(|source| BootstrapError::Service { source })?;
    Ok(service)
}

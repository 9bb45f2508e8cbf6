//! Layered configuration for the vendor-command service.
//!
//! Values resolve from built-in defaults, then a TOML file named by
//! `--config-path` (or `BTVSC_CONFIG_PATH`), then `BTVSC_*` environment
//! variables, and finally command-line flags. The embedding driver normally
//! calls [`Config::load`] once and hands the result to the service bootstrap.

mod defaults;
mod logging;
mod socket;

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

pub use defaults::{
    DEFAULT_AUTOPAIR_SUBCODE, DEFAULT_LISTEN_BACKLOG, DEFAULT_LOG_FILTER,
    DEFAULT_POLL_INTERVAL_MS, DEFAULT_REPLY_TIMEOUT_MS, DEFAULT_SOCKET_NAME, default_log_filter,
    default_log_filter_string, default_log_format, default_socket_endpoint,
};
pub use logging::{LogFormat, LogFormatParseError};
pub use socket::{
    ABSTRACT_PREFIX, SocketEndpoint, SocketParseError, SocketPreparationError,
};

/// Resolved service configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "BTVSC")]
pub struct Config {
    /// Endpoint the service listens on for client connections.
    #[serde(default = "defaults::default_socket_endpoint")]
    #[ortho_config(default = defaults::default_socket_endpoint())]
    pub service_socket: SocketEndpoint,
    /// Backlog passed to `listen(2)`.
    #[serde(default = "defaults::default_listen_backlog")]
    #[ortho_config(default = defaults::default_listen_backlog())]
    pub listen_backlog: u32,
    /// Milliseconds to wait for a controller reply before injecting a
    /// hardware error event.
    #[serde(default = "defaults::default_reply_timeout_ms")]
    #[ortho_config(default = defaults::default_reply_timeout_ms())]
    pub reply_timeout_ms: u64,
    /// Milliseconds the multiplexer waits for readiness before rechecking
    /// its run flag.
    #[serde(default = "defaults::default_poll_interval_ms")]
    #[ortho_config(default = defaults::default_poll_interval_ms())]
    pub poll_interval_ms: u64,
    /// Vendor event sub-code forwarded to the auto-pair subscriber.
    #[serde(default = "defaults::default_autopair_subcode")]
    #[ortho_config(default = defaults::default_autopair_subcode())]
    pub autopair_subcode: u8,
    /// `tracing` filter expression.
    #[serde(default = "defaults::default_log_filter_string")]
    #[ortho_config(default = defaults::default_log_filter_string())]
    pub log_filter: String,
    /// Log output format.
    #[serde(default = "defaults::default_log_format")]
    #[ortho_config(default = defaults::default_log_format())]
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_socket: default_socket_endpoint(),
            listen_backlog: DEFAULT_LISTEN_BACKLOG,
            reply_timeout_ms: DEFAULT_REPLY_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            autopair_subcode: DEFAULT_AUTOPAIR_SUBCODE,
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
        }
    }
}

impl Config {
    /// Endpoint the service listens on.
    #[must_use]
    pub fn service_socket(&self) -> &SocketEndpoint {
        &self.service_socket
    }

    /// Backlog handed to `listen(2)`.
    #[must_use]
    pub fn listen_backlog(&self) -> u32 {
        self.listen_backlog
    }

    /// Reply timeout as a [`Duration`].
    #[must_use]
    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms)
    }

    /// Multiplexer poll bound as a [`Duration`].
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Vendor sub-code routed to the auto-pair subscriber.
    #[must_use]
    pub fn autopair_subcode(&self) -> u8 {
        self.autopair_subcode
    }

    /// Log filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Log output format.
    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }
}

//! Built-in values used when no configuration layer supplies a field.

use crate::logging::LogFormat;
use crate::socket::SocketEndpoint;

/// Abstract socket name the service binds when nothing else is configured.
pub const DEFAULT_SOCKET_NAME: &str = "btvsc/vendor_command.sock";

/// Pending-connection limit handed to `listen(2)`.
pub const DEFAULT_LISTEN_BACKLOG: u32 = 10;

/// Time the dispatcher waits for a controller reply before reporting a
/// hardware error.
pub const DEFAULT_REPLY_TIMEOUT_MS: u64 = 8_000;

/// Upper bound on a single multiplexer wait, after which run flags are rechecked.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

/// Vendor event sub-code announcing an auto-pairing notification.
pub const DEFAULT_AUTOPAIR_SUBCODE: u8 = 0x30;

/// Default log filter expression.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default log filter expression.
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format.
pub fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Computes the default listening endpoint.
pub fn default_socket_endpoint() -> SocketEndpoint {
    SocketEndpoint::abstract_name(DEFAULT_SOCKET_NAME)
}

pub(crate) const fn default_listen_backlog() -> u32 {
    DEFAULT_LISTEN_BACKLOG
}

pub(crate) const fn default_reply_timeout_ms() -> u64 {
    DEFAULT_REPLY_TIMEOUT_MS
}

pub(crate) const fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

pub(crate) const fn default_autopair_subcode() -> u8 {
    DEFAULT_AUTOPAIR_SUBCODE
}

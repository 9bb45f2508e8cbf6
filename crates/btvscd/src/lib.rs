//! Vendor-command service for a Bluetooth host stack.
//!
//! Local clients connect to a stream socket (abstract namespace by default,
//! see [`btvsc_config`]) and send framed vendor commands. The service queues
//! them in arrival order together with commands raised inside the process,
//! forwards them to the controller one at a time through a
//! [`ControllerTransport`], and routes each reply back to whoever asked.
//!
//! Two worker threads do the work. The connection multiplexer accepts
//! clients and frames their requests. The dispatcher keeps at most one
//! command outstanding at the controller, and a reply watchdog injects a
//! hardware error event into the host through the [`HostEventSink`] when the
//! controller stays silent.
//!
//! A client that enables auto-pair becomes the subscriber for matching
//! vendor events. The host stack passes controller events through the
//! [`EventInterceptor`], which copies them to the subscriber and re-injects
//! them as LE advertising reports.
//!
//! ## Wire format
//!
//! Requests are `[0x01, opcode_hi, opcode_lo, len, params...]` to send a
//! command or `[0x02]` to close the connection. Replies are the controller's
//! reply bytes, written verbatim.
//!
//! ## Lifecycle
//!
//! [`bootstrap_with`] loads configuration, installs telemetry and starts the
//! service. Embedders that manage telemetry themselves use
//! [`CommandService::builder`] directly. Health reporting hooks emit
//! structured events at each lifecycle stage.

mod bootstrap;
mod command;
mod dispatch;
mod health;
mod hooks;
mod intercept;
mod service;
pub mod telemetry;
mod transport;

pub use bootstrap::{
    BootstrapError, ConfigLoader, ServiceHooks, StaticConfigLoader, SystemConfigLoader,
    bootstrap_with,
};
pub use command::{Completion, EnqueueError, MAX_PARAMETER_LEN, Opcode};
pub use dispatch::{CompletionHandler, HARDWARE_ERROR_EVENT, TimerError};
pub use health::{HealthReporter, StructuredHealthReporter};
pub use hooks::{ControllerTransport, HostEventSink};
pub use intercept::{
    EventInterceptor, HCI_EVENT_PACKET, InterceptOutcome, LE_ADVERTISING_REPORT, LE_META_EVENT,
    VENDOR_SPECIFIC_EVENT,
};
pub use service::{CommandService, Hook, ServiceBuilder, ServiceError, ShutdownReport, Worker};
pub use telemetry::{TelemetryError, TelemetryHandle};
pub use transport::{ClientHandle, ClientId, ListenerError, MultiplexerError};

#[cfg(test)]
mod tests;

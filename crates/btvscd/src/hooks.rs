//! Collaborators the embedding stack supplies at initialisation.

use std::sync::Arc;

use crate::command::Opcode;
use crate::dispatch::CompletionHandler;

/// Forwards vendor commands to the Bluetooth controller.
///
/// Implementations must not block for the controller's reply. The reply is
/// reported later, from any thread, through the [`CompletionHandler`].
/// Calling the handler inline from `send_vendor_command` is also allowed.
pub trait ControllerTransport: Send + Sync {
    /// Sends `opcode` with `parameters` and arranges for `on_complete` to
    /// receive the controller's reply.
    fn send_vendor_command(
        &self,
        opcode: Opcode,
        parameters: &[u8],
        on_complete: CompletionHandler,
    );
}

/// Injects synthesised event packets into the host stack's receive path.
pub trait HostEventSink: Send + Sync {
    /// Delivers `packet`, a packet-type byte followed by the event, to the host.
    fn inject_event(&self, packet: &[u8]);
}

impl<T> ControllerTransport for Arc<T>
where
    T: ControllerTransport + ?Sized,
{
    fn send_vendor_command(
        &self,
        opcode: Opcode,
        parameters: &[u8],
        on_complete: CompletionHandler,
    ) {
        self.as_ref()
            .send_vendor_command(opcode, parameters, on_complete);
    }
}

impl<T> HostEventSink for Arc<T>
where
    T: HostEventSink + ?Sized,
{
    fn inject_event(&self, packet: &[u8]) {
        self.as_ref().inject_event(packet);
    }
}

/// Both collaborators bundled for the service internals.
#[derive(Clone)]
pub(crate) struct Hooks {
    pub(crate) transport: Arc<dyn ControllerTransport>,
    pub(crate) host: Arc<dyn HostEventSink>,
}

//! Auto-pair vendor event routing.
//!
//! A client that sends [`Opcode::ENABLE_AUTOPAIR`](crate::Opcode::ENABLE_AUTOPAIR)
//! becomes the auto-pair subscriber. Matching vendor events from the
//! controller are then copied to that client and also re-injected into the
//! host as LE advertising reports.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::hooks::HostEventSink;
use crate::service::ServiceShared;
use crate::transport::{ClientHandle, ClientId};

const INTERCEPT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::intercept");

/// HCI packet indicator for event packets.
pub const HCI_EVENT_PACKET: u8 = 0x04;
/// Event code of vendor-specific events.
pub const VENDOR_SPECIFIC_EVENT: u8 = 0xff;
/// Event code of LE meta events.
pub const LE_META_EVENT: u8 = 0x3e;
/// LE meta sub-event code for advertising reports.
pub const LE_ADVERTISING_REPORT: u8 = 0x02;

/// Result of offering a controller event to the interceptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterceptOutcome {
    /// The event is not an auto-pair event.
    Ignored,
    /// The event matched but no client has subscribed.
    NoSubscriber,
    /// The event was sent to `subscriber` and re-injected into the host.
    Forwarded {
        /// Client that received the raw event.
        subscriber: ClientId,
    },
}

/// The single client receiving auto-pair events.
#[derive(Default)]
pub(crate) struct SubscriberSlot {
    current: Mutex<Option<ClientHandle>>,
}

impl SubscriberSlot {
    /// Replaces the subscriber and returns the previous one's identifier.
    pub(crate) fn set(&self, client: ClientHandle) -> Option<ClientId> {
        self.lock().replace(client).map(|previous| previous.id())
    }

    /// Clears the slot only when it still holds `id`.
    pub(crate) fn clear_if(&self, id: ClientId) -> bool {
        let mut current = self.lock();
        if current.as_ref().is_some_and(|client| client.id() == id) {
            *current = None;
            return true;
        }
        false
    }

    pub(crate) fn clear(&self) {
        self.lock().take();
    }

    pub(crate) fn current(&self) -> Option<ClientHandle> {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Option<ClientHandle>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Examines controller events on the host's receive path.
///
/// Cloning is cheap; every clone shares the service's subscriber slot.
#[derive(Clone)]
pub struct EventInterceptor {
    shared: Arc<ServiceShared>,
    host: Arc<dyn HostEventSink>,
    autopair_subcode: u8,
}

impl EventInterceptor {
    pub(crate) fn new(
        shared: Arc<ServiceShared>,
        host: Arc<dyn HostEventSink>,
        autopair_subcode: u8,
    ) -> Self {
        Self {
            shared,
            host,
            autopair_subcode,
        }
    }

    /// Offers one controller event to the interceptor.
    ///
    /// `full_event` is the event as received, including any transport
    /// header; it is written unchanged to the subscriber. `event_body` starts
    /// at the event code and the vendor sub-code follows it directly:
    /// `[code, sub-code, ...]`. The caller keeps
    /// delivering the original event to the host regardless of the outcome.
    pub fn intercept(&self, full_event: &[u8], event_body: &[u8]) -> InterceptOutcome {
        let (Some(&code), Some(&subcode)) = (event_body.first(), event_body.get(1)) else {
            return InterceptOutcome::Ignored;
        };
        if code != VENDOR_SPECIFIC_EVENT || subcode != self.autopair_subcode {
            return InterceptOutcome::Ignored;
        }

        let Some(subscriber) = self.shared.subscriber.current() else {
            debug!(
                target: INTERCEPT_TARGET,
                subcode,
                "auto-pair event without a subscriber"
            );
            return InterceptOutcome::NoSubscriber;
        };

        if let Err(error) = subscriber.send(full_event) {
            warn!(
                target: INTERCEPT_TARGET,
                client = %subscriber.id(),
                error = %error,
                "failed to forward auto-pair event"
            );
        }
        self.host.inject_event(&as_advertising_report(event_body));
        debug!(
            target: INTERCEPT_TARGET,
            client = %subscriber.id(),
            event_len = event_body.len(),
            "auto-pair event forwarded"
        );
        InterceptOutcome::Forwarded {
            subscriber: subscriber.id(),
        }
    }
}

/// Prefixes the packet indicator, then rewrites the event code and the byte
/// two places after the sub-code.
fn as_advertising_report(event_body: &[u8]) -> Vec<u8> {
    let mut packet = Vec::with_capacity(event_body.len() + 1);
    packet.push(HCI_EVENT_PACKET);
    packet.extend_from_slice(event_body);
    if let Some(code) = packet.get_mut(1) {
        *code = LE_META_EVENT;
    }
    if let Some(subcode) = packet.get_mut(3) {
        *subcode = LE_ADVERTISING_REPORT;
    }
    packet
}

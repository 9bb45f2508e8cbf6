use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::command::queue::CommandQueue;
use crate::intercept::SubscriberSlot;

/// State reachable from the service handle, both workers and the interceptor.
pub(crate) struct ServiceShared {
    pub(crate) queue: CommandQueue,
    pub(crate) subscriber: SubscriberSlot,
    multiplexer_running: AtomicBool,
    dispatcher_running: AtomicBool,
    open_connections: AtomicUsize,
}

impl ServiceShared {
    pub(crate) fn new(queue: CommandQueue) -> Self {
        Self {
            queue,
            subscriber: SubscriberSlot::default(),
            multiplexer_running: AtomicBool::new(false),
            dispatcher_running: AtomicBool::new(false),
            open_connections: AtomicUsize::new(0),
        }
    }

    pub(crate) fn multiplexer_running(&self) -> bool {
        self.multiplexer_running.load(Ordering::SeqCst)
    }

    pub(crate) fn dispatcher_running(&self) -> bool {
        self.dispatcher_running.load(Ordering::SeqCst)
    }

    pub(crate) fn set_running(&self, running: bool) {
        self.multiplexer_running.store(running, Ordering::SeqCst);
        self.dispatcher_running.store(running, Ordering::SeqCst);
    }

    pub(crate) fn connection_opened(&self) {
        self.open_connections.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn connection_closed(&self) {
        self.open_connections.fetch_sub(1, Ordering::SeqCst);
    }

    pub(crate) fn open_connections(&self) -> usize {
        self.open_connections.load(Ordering::SeqCst)
    }
}

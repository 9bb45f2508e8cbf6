//! Lifecycle of the vendor-command service.
//!
//! [`CommandService::builder`] collects the configuration and collaborators,
//! [`ServiceBuilder::init`] acquires every resource (reply timer, listening
//! socket, readiness poller) and [`CommandService::start`] launches the
//! multiplexer and dispatcher threads. [`CommandService::stop`] joins them
//! again and keeps their state, so a stopped service can be restarted.
//! [`CommandService::shutdown`] releases everything.

mod errors;
mod shared;

use std::mem;
use std::sync::Arc;
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};

use mio::Waker;
use tracing::{debug, warn};

use btvsc_config::{Config, SocketEndpoint};

use crate::command::{Completion, EnqueueError, Opcode, QueuedCommand};
use crate::command::queue::CommandQueue;
use crate::dispatch::{DispatchEvent, Dispatcher, ReplyTimer};
use crate::health::{HealthReporter, StructuredHealthReporter};
use crate::hooks::{ControllerTransport, HostEventSink, Hooks};
use crate::intercept::EventInterceptor;
use crate::transport::{Multiplexer, ServiceListener};

pub use self::errors::{Hook, ServiceError, ShutdownReport, Worker};
pub(crate) use self::shared::ServiceShared;

const SERVICE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::service");

/// Collects configuration and collaborators before initialisation.
pub struct ServiceBuilder {
    config: Config,
    transport: Option<Arc<dyn ControllerTransport>>,
    host: Option<Arc<dyn HostEventSink>>,
    reporter: Arc<dyn HealthReporter>,
}

impl ServiceBuilder {
    /// Sets the collaborator that forwards commands to the controller.
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn ControllerTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Sets the collaborator that receives synthesised host events.
    #[must_use]
    pub fn host(mut self, host: Arc<dyn HostEventSink>) -> Self {
        self.host = Some(host);
        self
    }

    /// Replaces the default [`StructuredHealthReporter`].
    #[must_use]
    pub fn reporter(mut self, reporter: Arc<dyn HealthReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Acquires every resource the service needs without starting threads.
    ///
    /// Both hooks are checked before anything is created, so a missing hook
    /// leaves no socket or thread behind.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] when a hook is missing or a resource cannot
    /// be acquired. Resources acquired before the failure are released.
    pub fn init(self) -> Result<CommandService, ServiceError> {
        let reporter = Arc::clone(&self.reporter);
        reporter.init_starting();
        match self.try_init() {
            Ok(service) => {
                reporter.init_succeeded(service.endpoint());
                Ok(service)
            }
            Err(error) => {
                reporter.init_failed(&error);
                Err(error)
            }
        }
    }

    fn try_init(self) -> Result<CommandService, ServiceError> {
        let transport = self.transport.ok_or(ServiceError::MissingHook {
            hook: Hook::ControllerTransport,
        })?;
        let host = self.host.ok_or(ServiceError::MissingHook {
            hook: Hook::HostEventSink,
        })?;
        let hooks = Hooks { transport, host };
        let config = self.config;

        let (inbox_sender, inbox) = mpsc::channel();
        let shared = Arc::new(ServiceShared::new(CommandQueue::new(inbox_sender.clone())));

        let expiry_sender = inbox_sender.clone();
        let timer = ReplyTimer::spawn(move |sequence| {
            if expiry_sender
                .send(DispatchEvent::ReplyTimeout { sequence })
                .is_err()
            {
                debug!(target: SERVICE_TARGET, sequence, "dispatcher gone; reply timeout dropped");
            }
        })
        .map_err(|source| ServiceError::Timer { source })?;

        let listener = ServiceListener::bind(config.service_socket(), config.listen_backlog())
            .map_err(|source| ServiceError::Listener { source })?;
        let (multiplexer, waker) =
            Multiplexer::new(listener, Arc::clone(&shared), config.poll_interval())
                .map_err(|source| ServiceError::Multiplexer { source })?;

        let dispatcher = Dispatcher::new(
            inbox,
            inbox_sender.clone(),
            Arc::clone(&shared),
            hooks.clone(),
            timer,
            config.reply_timeout(),
        );

        Ok(CommandService {
            endpoint: config.service_socket().clone(),
            autopair_subcode: config.autopair_subcode(),
            shared,
            hooks,
            waker,
            inbox: inbox_sender,
            reporter: self.reporter,
            workers: Workers::Idle {
                multiplexer,
                dispatcher,
            },
        })
    }
}

enum Workers {
    Idle {
        multiplexer: Multiplexer,
        dispatcher: Dispatcher,
    },
    Running {
        multiplexer: JoinHandle<Multiplexer>,
        dispatcher: JoinHandle<Dispatcher>,
    },
    Lost,
}

/// A running or stopped vendor-command service.
///
/// Dropping a running service stops its workers; call
/// [`shutdown`](Self::shutdown) to also discard queued commands and close
/// client connections deterministically.
pub struct CommandService {
    endpoint: SocketEndpoint,
    autopair_subcode: u8,
    shared: Arc<ServiceShared>,
    hooks: Hooks,
    waker: Waker,
    inbox: Sender<DispatchEvent>,
    reporter: Arc<dyn HealthReporter>,
    workers: Workers,
}

impl CommandService {
    /// Starts building a service from `config`.
    #[must_use]
    pub fn builder(config: Config) -> ServiceBuilder {
        ServiceBuilder {
            config,
            transport: None,
            host: None,
            reporter: Arc::new(StructuredHealthReporter::new()),
        }
    }

    /// Endpoint clients connect to.
    #[must_use]
    pub fn endpoint(&self) -> &SocketEndpoint {
        &self.endpoint
    }

    /// Whether the worker threads are running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        matches!(self.workers, Workers::Running { .. })
    }

    /// Commands waiting for the dispatcher.
    #[must_use]
    pub fn queued_commands(&self) -> usize {
        self.shared.queue.len()
    }

    /// Client connections currently open.
    #[must_use]
    pub fn connected_clients(&self) -> usize {
        self.shared.open_connections()
    }

    /// Handle for routing controller events through auto-pair interception.
    #[must_use]
    pub fn interceptor(&self) -> EventInterceptor {
        EventInterceptor::new(
            Arc::clone(&self.shared),
            Arc::clone(&self.hooks.host),
            self.autopair_subcode,
        )
    }

    /// Queues a command from inside the process.
    ///
    /// The command joins the same FIFO as client commands. A stopped service
    /// keeps it queued until restarted or shut down.
    ///
    /// # Errors
    ///
    /// Returns [`EnqueueError`] when the parameter block exceeds
    /// [`MAX_PARAMETER_LEN`](crate::MAX_PARAMETER_LEN) bytes or the queue
    /// cannot grow.
    pub fn enqueue_external_command(
        &self,
        opcode: Opcode,
        parameters: Vec<u8>,
        completion: Completion,
    ) -> Result<(), EnqueueError> {
        let command = QueuedCommand::new(opcode, parameters, completion)?;
        self.shared.queue.enqueue(command)
    }

    /// Launches the multiplexer and dispatcher threads.
    ///
    /// Starting a running service is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Spawn`] when a thread cannot be created and
    /// [`ServiceError::WorkersLost`] after an earlier unrecoverable failure.
    pub fn start(&mut self) -> Result<(), ServiceError> {
        let (multiplexer, dispatcher) = match mem::replace(&mut self.workers, Workers::Lost) {
            Workers::Idle {
                multiplexer,
                dispatcher,
            } => (multiplexer, dispatcher),
            Workers::Running {
                multiplexer,
                dispatcher,
            } => {
                self.workers = Workers::Running {
                    multiplexer,
                    dispatcher,
                };
                return Ok(());
            }
            Workers::Lost => return Err(ServiceError::WorkersLost),
        };

        self.shared.set_running(true);
        let multiplexer = spawn_worker(Worker::Multiplexer, move || multiplexer.run())
            .inspect_err(|_| self.shared.set_running(false))?;
        let dispatcher = match spawn_worker(Worker::Dispatcher, move || dispatcher.run()) {
            Ok(handle) => handle,
            Err(error) => {
                self.shared.set_running(false);
                self.wake_multiplexer();
                if multiplexer.join().is_err() {
                    warn!(target: SERVICE_TARGET, "multiplexer panicked while unwinding start");
                }
                return Err(error);
            }
        };

        self.workers = Workers::Running {
            multiplexer,
            dispatcher,
        };
        self.reporter.workers_started();
        Ok(())
    }

    /// Clears the run flags, wakes both workers and joins them.
    ///
    /// Queued commands, the in-flight slot and open connections survive, so
    /// [`start`](Self::start) resumes where the service left off. Stopping a
    /// stopped service is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::WorkerPanicked`] when a worker panicked.
    pub fn stop(&mut self) -> Result<(), ServiceError> {
        let (multiplexer, dispatcher) = match mem::replace(&mut self.workers, Workers::Lost) {
            Workers::Running {
                multiplexer,
                dispatcher,
            } => (multiplexer, dispatcher),
            other => {
                self.workers = other;
                return Ok(());
            }
        };

        self.shared.set_running(false);
        self.wake_multiplexer();
        if self.inbox.send(DispatchEvent::Stop).is_err() {
            debug!(target: SERVICE_TARGET, "dispatcher inbox already closed");
        }

        let multiplexer = multiplexer.join().map_err(|_| ServiceError::WorkerPanicked {
            worker: Worker::Multiplexer,
        });
        let dispatcher = dispatcher.join().map_err(|_| ServiceError::WorkerPanicked {
            worker: Worker::Dispatcher,
        });
        let (multiplexer, dispatcher) = (multiplexer?, dispatcher?);

        self.workers = Workers::Idle {
            multiplexer,
            dispatcher,
        };
        self.reporter.workers_stopped();
        Ok(())
    }

    /// Stops the workers and releases every resource.
    ///
    /// Queued commands are discarded without replies, open connections are
    /// closed, the socket is unbound and the subscriber is cleared.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] when a worker panicked or the reply timer
    /// could not be joined. Remaining resources are still released.
    pub fn shutdown(mut self) -> Result<ShutdownReport, ServiceError> {
        let stopped = self.stop();

        let mut report = ShutdownReport {
            discarded_commands: self.shared.queue.flush(),
            closed_connections: 0,
        };
        self.shared.subscriber.clear();

        let mut timer = Ok(());
        if let Workers::Idle {
            mut multiplexer,
            dispatcher,
        } = mem::replace(&mut self.workers, Workers::Lost)
        {
            report.closed_connections = multiplexer.close_all();
            timer = dispatcher
                .shutdown()
                .map_err(|source| ServiceError::Timer { source });
            drop(multiplexer);
        }

        stopped?;
        timer?;
        self.reporter.shutdown_complete(&report);
        Ok(report)
    }

    fn wake_multiplexer(&self) {
        if let Err(error) = self.waker.wake() {
            warn!(target: SERVICE_TARGET, error = %error, "failed to wake multiplexer");
        }
    }
}

impl Drop for CommandService {
    fn drop(&mut self) {
        if self.is_running()
            && let Err(error) = self.stop()
        {
            warn!(target: SERVICE_TARGET, error = %error, "failed to stop service on drop");
        }
    }
}

fn spawn_worker<T, F>(worker: Worker, body: F) -> Result<JoinHandle<T>, ServiceError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    thread::Builder::new()
        .name(worker.thread_name().to_owned())
        .spawn(body)
        .map_err(|source| ServiceError::Spawn { worker, source })
}

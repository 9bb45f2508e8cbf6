//! Readiness loop that accepts clients and turns their frames into commands.
//!
//! The loop waits on the listening socket and every client connection at
//! once, bounded by the configured poll interval so a cleared run flag is
//! noticed promptly. Frames are read with blocking reads, so a client that
//! stalls mid-frame holds up every other connection until it finishes or
//! hangs up.

use std::collections::HashMap;
use std::io;
use std::mem::MaybeUninit;
use std::ops::ControlFlow;
use std::os::fd::AsRawFd;
use std::os::unix::net::UnixStream;
use std::sync::Arc;
use std::time::Duration;

use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token, Waker};
use socket2::SockRef;
use tracing::{debug, info, warn};

use super::framer::{self, Frame, FrameError};
use super::listener::ServiceListener;
use super::{ClientHandle, ClientId, MultiplexerError, TRANSPORT_TARGET};
use crate::command::{Completion, QueuedCommand};
use crate::service::ServiceShared;

const LISTENER: Token = Token(0);
const WAKER: Token = Token(1);
const FIRST_CLIENT: usize = 2;
const EVENT_CAPACITY: usize = 64;

pub(crate) struct Multiplexer {
    poll: Poll,
    events: Events,
    listener: ServiceListener,
    connections: HashMap<Token, ClientHandle>,
    next_token: usize,
    poll_interval: Duration,
    shared: Arc<ServiceShared>,
}

impl Multiplexer {
    /// Registers `listener` with a fresh poller and returns the waker used
    /// to interrupt a blocked poll.
    pub(crate) fn new(
        listener: ServiceListener,
        shared: Arc<ServiceShared>,
        poll_interval: Duration,
    ) -> Result<(Self, Waker), MultiplexerError> {
        let poll = Poll::new().map_err(|source| MultiplexerError::Poll { source })?;
        let waker = Waker::new(poll.registry(), WAKER)
            .map_err(|source| MultiplexerError::Waker { source })?;
        poll.registry()
            .register(
                &mut SourceFd(&listener.as_raw_fd()),
                LISTENER,
                Interest::READABLE,
            )
            .map_err(|source| MultiplexerError::Register { source })?;

        Ok((
            Self {
                poll,
                events: Events::with_capacity(EVENT_CAPACITY),
                listener,
                connections: HashMap::new(),
                next_token: FIRST_CLIENT,
                poll_interval,
                shared,
            },
            waker,
        ))
    }

    /// Serves connections until the run flag clears, then hands itself back
    /// so the service can restart or tear down.
    pub(crate) fn run(mut self) -> Self {
        info!(
            target: TRANSPORT_TARGET,
            endpoint = %self.listener.endpoint(),
            "connection multiplexer active"
        );
        while self.shared.multiplexer_running() {
            if let Err(error) = self.poll.poll(&mut self.events, Some(self.poll_interval)) {
                if error.kind() != io::ErrorKind::Interrupted {
                    warn!(target: TRANSPORT_TARGET, error = %error, "readiness poll failed");
                }
                continue;
            }
            if !self.shared.multiplexer_running() {
                break;
            }

            let ready: Vec<Token> = self.events.iter().map(mio::event::Event::token).collect();
            for token in ready {
                match token {
                    WAKER => debug!(target: TRANSPORT_TARGET, "multiplexer woken"),
                    LISTENER => self.accept_pending(),
                    client => self.service_client(client),
                }
            }
        }
        info!(target: TRANSPORT_TARGET, "connection multiplexer stopped");
        self
    }

    /// Closes every open connection and returns how many there were.
    pub(crate) fn close_all(&mut self) -> usize {
        let tokens: Vec<Token> = self.connections.keys().copied().collect();
        for token in &tokens {
            self.close_client(*token, "service shutting down");
        }
        tokens.len()
    }

    fn accept_pending(&mut self) {
        loop {
            match self.listener.accept() {
                Ok(Some(stream)) => self.register_client(stream),
                Ok(None) => return,
                Err(error) => {
                    warn!(
                        target: TRANSPORT_TARGET,
                        error = %error,
                        "failed to accept client connection"
                    );
                    return;
                }
            }
        }
    }

    fn register_client(&mut self, stream: UnixStream) {
        let token = Token(self.next_token);
        self.next_token += 1;

        if let Err(error) = self.poll.registry().register(
            &mut SourceFd(&stream.as_raw_fd()),
            token,
            Interest::READABLE,
        ) {
            warn!(
                target: TRANSPORT_TARGET,
                error = %error,
                "failed to register client connection; dropping it"
            );
            return;
        }

        let client = ClientHandle::new(ClientId::new(token.0), stream);
        debug!(target: TRANSPORT_TARGET, client = %client.id(), "client connected");
        self.connections.insert(token, client);
        self.shared.connection_opened();
    }

    /// Reads frames while the client has input buffered.
    ///
    /// Readiness is edge-triggered, so every complete frame already in the
    /// socket buffer must be consumed before returning to the poll.
    fn service_client(&mut self, token: Token) {
        let Some(client) = self.connections.get(&token).cloned() else {
            return;
        };
        loop {
            let mut reader = client.stream();
            let outcome = framer::read_frame(&mut reader);
            if let ControlFlow::Break(reason) = self.handle_frame(&client, outcome) {
                self.close_client(token, reason);
                return;
            }
            if !has_pending_input(client.stream()) {
                return;
            }
        }
    }

    fn handle_frame(
        &self,
        client: &ClientHandle,
        outcome: Result<Frame, FrameError>,
    ) -> ControlFlow<&'static str> {
        match outcome {
            Ok(Frame::Command(frame)) => {
                let opcode = frame.opcode;
                let queued = QueuedCommand::new(
                    opcode,
                    frame.parameters,
                    Completion::Client(client.clone()),
                )
                .and_then(|command| self.shared.queue.enqueue(command));
                if let Err(error) = queued {
                    warn!(
                        target: TRANSPORT_TARGET,
                        client = %client.id(),
                        %opcode,
                        error = %error,
                        "dropping client command"
                    );
                }
                ControlFlow::Continue(())
            }
            Ok(Frame::Close) => ControlFlow::Break("client requested close"),
            Ok(Frame::EndOfStream) => ControlFlow::Break("peer closed connection"),
            Ok(Frame::Unknown(kind)) => {
                warn!(
                    target: TRANSPORT_TARGET,
                    client = %client.id(),
                    frame_type = kind,
                    "unknown frame type"
                );
                ControlFlow::Break("unknown frame type")
            }
            Err(error) if error.is_fatal() => {
                warn!(
                    target: TRANSPORT_TARGET,
                    client = %client.id(),
                    error = %error,
                    "malformed frame"
                );
                ControlFlow::Break("malformed frame")
            }
            Err(error) => {
                warn!(
                    target: TRANSPORT_TARGET,
                    client = %client.id(),
                    error = %error,
                    "dropping client command"
                );
                ControlFlow::Continue(())
            }
        }
    }

    fn close_client(&mut self, token: Token, reason: &'static str) {
        let Some(client) = self.connections.remove(&token) else {
            return;
        };
        if let Err(error) = self
            .poll
            .registry()
            .deregister(&mut SourceFd(&client.stream().as_raw_fd()))
        {
            debug!(
                target: TRANSPORT_TARGET,
                client = %client.id(),
                error = %error,
                "failed to deregister client connection"
            );
        }
        client.close();
        self.shared.connection_closed();
        if self.shared.subscriber.clear_if(client.id()) {
            info!(
                target: TRANSPORT_TARGET,
                client = %client.id(),
                "auto-pair subscriber disconnected"
            );
        }
        debug!(target: TRANSPORT_TARGET, client = %client.id(), reason, "client connection closed");
    }
}

/// Whether a read would return immediately, either with data or end of stream.
fn has_pending_input(stream: &UnixStream) -> bool {
    let mut peeked = [MaybeUninit::<u8>::uninit()];
    let flags = libc::MSG_PEEK | libc::MSG_DONTWAIT;
    match SockRef::from(stream).recv_with_flags(&mut peeked, flags) {
        Ok(_) => true,
        Err(error) => error.kind() != io::ErrorKind::WouldBlock,
    }
}

//! Reply watchdog running on its own thread.
//!
//! The dispatcher arms the timer for every forwarded command and cancels it
//! when the reply lands. An expiry invokes the callback with the sequence
//! number the timer was armed for, so late expiries can be recognised.

use std::io;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use thiserror::Error;

const TIMER_THREAD_NAME: &str = "btvsc-reply-timer";

/// Whether an armed timer fires once or keeps firing every interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimerMode {
    OneShot,
    Periodic,
}

/// Failures driving the reply timer thread.
#[derive(Debug, Error)]
pub enum TimerError {
    /// The timer thread could not be created.
    #[error("failed to spawn reply timer thread: {source}")]
    Spawn {
        /// Error reported by the thread builder.
        #[source]
        source: io::Error,
    },
    /// The timer thread exited and no longer accepts requests.
    #[error("reply timer thread is no longer running")]
    Gone,
    /// The timer thread panicked before it could be joined.
    #[error("reply timer thread panicked")]
    ThreadPanic,
}

enum TimerControl {
    Arm {
        after: Duration,
        mode: TimerMode,
        sequence: u64,
    },
    Cancel,
    Exit,
}

pub(crate) struct ReplyTimer {
    control: Sender<TimerControl>,
    handle: Option<JoinHandle<()>>,
}

impl ReplyTimer {
    pub(crate) fn spawn<F>(on_expiry: F) -> Result<Self, TimerError>
    where
        F: FnMut(u64) + Send + 'static,
    {
        let (control, receiver) = mpsc::channel();
        let handle = thread::Builder::new()
            .name(TIMER_THREAD_NAME.to_owned())
            .spawn(move || run_timer(&receiver, on_expiry))
            .map_err(|source| TimerError::Spawn { source })?;
        Ok(Self {
            control,
            handle: Some(handle),
        })
    }

    /// Replaces any armed deadline. A zero interval disarms the timer.
    pub(crate) fn arm(
        &self,
        after: Duration,
        mode: TimerMode,
        sequence: u64,
    ) -> Result<(), TimerError> {
        self.send(TimerControl::Arm {
            after,
            mode,
            sequence,
        })
    }

    pub(crate) fn cancel(&self) -> Result<(), TimerError> {
        self.send(TimerControl::Cancel)
    }

    pub(crate) fn shutdown(mut self) -> Result<(), TimerError> {
        // The thread may already have exited; joining still reports panics.
        if self.control.send(TimerControl::Exit).is_err() {
            tracing::debug!(target: super::DISPATCH_TARGET, "reply timer already gone");
        }
        match self.handle.take().map(JoinHandle::join) {
            Some(Err(_)) => Err(TimerError::ThreadPanic),
            Some(Ok(())) | None => Ok(()),
        }
    }

    fn send(&self, message: TimerControl) -> Result<(), TimerError> {
        self.control.send(message).map_err(|_| TimerError::Gone)
    }
}

impl Drop for ReplyTimer {
    fn drop(&mut self) {
        if self.handle.is_some() && self.control.send(TimerControl::Exit).is_err() {
            tracing::debug!(target: super::DISPATCH_TARGET, "reply timer already gone");
        }
    }
}

struct Armed {
    deadline: Instant,
    period: Option<Duration>,
    sequence: u64,
}

fn run_timer<F: FnMut(u64)>(control: &Receiver<TimerControl>, mut on_expiry: F) {
    let mut armed: Option<Armed> = None;
    loop {
        let message = match armed.as_ref() {
            None => match control.recv() {
                Ok(message) => message,
                Err(_) => return,
            },
            Some(current) => {
                let wait = current.deadline.saturating_duration_since(Instant::now());
                match control.recv_timeout(wait) {
                    Ok(message) => message,
                    Err(RecvTimeoutError::Timeout) => {
                        armed = armed.take().and_then(|expired| fire(expired, &mut on_expiry));
                        continue;
                    }
                    Err(RecvTimeoutError::Disconnected) => return,
                }
            }
        };

        match message {
            TimerControl::Arm { after, .. } if after.is_zero() => armed = None,
            TimerControl::Arm {
                after,
                mode,
                sequence,
            } => {
                armed = Some(Armed {
                    deadline: Instant::now() + after,
                    period: (mode == TimerMode::Periodic).then_some(after),
                    sequence,
                });
            }
            TimerControl::Cancel => armed = None,
            TimerControl::Exit => return,
        }
    }
}

fn fire<F: FnMut(u64)>(expired: Armed, on_expiry: &mut F) -> Option<Armed> {
    on_expiry(expired.sequence);
    expired.period.map(|period| Armed {
        deadline: expired.deadline + period,
        ..expired
    })
}

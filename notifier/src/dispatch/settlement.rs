//! Turning worker lifecycle events into a single result.
//!
//! A [`Settlement`] starts `Pending` and moves to `Settled` on the first
//! event it observes. Every later event is ignored.

use std::io;
use std::mem;
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::error::DispatchError;
use crate::task::{Outcome, WorkerReply};

/// Result delivered to the caller of `submit`.
pub type DispatchResult = Result<(), DispatchError>;

/// Something that happened to a worker.
#[derive(Debug)]
pub enum WorkerEvent {
    /// The worker could not be started.
    SpawnFailed(io::Error),
    /// The worker's single reply arrived.
    Reply(WorkerReply),
    /// The channel broke or carried something that is not a reply.
    ChannelError(String),
    /// The worker terminated; `None` when killed by a signal.
    Exited(Option<i32>),
    /// The configured deadline elapsed.
    TimedOut(Duration),
}

impl WorkerEvent {
    fn kind(&self) -> &'static str {
        match self {
            WorkerEvent::SpawnFailed(_) => "spawn_failed",
            WorkerEvent::Reply(_) => "reply",
            WorkerEvent::ChannelError(_) => "channel_error",
            WorkerEvent::Exited(_) => "exited",
            WorkerEvent::TimedOut(_) => "timed_out",
        }
    }

    /// The caller-facing result this event settles with.
    fn into_result(self) -> DispatchResult {
        match self {
            WorkerEvent::SpawnFailed(e) => Err(DispatchError::Spawn(e)),
            WorkerEvent::Reply(reply) => match Outcome::from(reply) {
                Outcome::Success => Ok(()),
                Outcome::Failure { reason } => Err(DispatchError::Failed { reason }),
            },
            WorkerEvent::ChannelError(msg) => Err(DispatchError::Channel(msg)),
            WorkerEvent::Exited(Some(0)) => Err(DispatchError::NoOutcome),
            WorkerEvent::Exited(Some(code)) => Err(DispatchError::AbnormalExit { code }),
            WorkerEvent::Exited(None) => Err(DispatchError::Terminated),
            WorkerEvent::TimedOut(limit) => Err(DispatchError::Timeout(limit)),
        }
    }
}

enum State {
    Pending(oneshot::Sender<DispatchResult>),
    Settled,
}

/// One-shot guard between worker events and the caller's future.
pub struct Settlement {
    dispatch_id: u64,
    state: State,
}

impl Settlement {
    pub fn new(dispatch_id: u64) -> (Self, oneshot::Receiver<DispatchResult>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                dispatch_id,
                state: State::Pending(tx),
            },
            rx,
        )
    }

    pub fn is_settled(&self) -> bool {
        matches!(self.state, State::Settled)
    }

    /// Feed one event. Returns true if this event settled the dispatch.
    pub fn observe(&mut self, event: WorkerEvent) -> bool {
        let tx = match mem::replace(&mut self.state, State::Settled) {
            State::Pending(tx) => tx,
            State::Settled => {
                debug!(
                    dispatch_id = self.dispatch_id,
                    event = event.kind(),
                    "dispatch_event_ignored"
                );
                return false;
            }
        };

        let kind = event.kind();
        let result = event.into_result();

        match &result {
            Ok(()) => info!(dispatch_id = self.dispatch_id, event = kind, "dispatch_settled"),
            Err(e) => warn!(
                dispatch_id = self.dispatch_id,
                event = kind,
                error = %e,
                "dispatch_settled"
            ),
        }

        // The caller may have stopped waiting; the worker still ran to completion.
        if tx.send(result).is_err() {
            debug!(dispatch_id = self.dispatch_id, "dispatch_caller_gone");
        }

        true
    }
}

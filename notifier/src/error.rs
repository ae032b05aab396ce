//! Error types for dispatching and running mail workers.

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Why a submitted task did not succeed, as seen by the caller.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The worker process could not be created; no payload was sent.
    #[error("failed to spawn worker: {0}")]
    Spawn(#[source] io::Error),

    /// Writing the payload or reading the reply failed.
    #[error("worker channel error: {0}")]
    Channel(String),

    /// The worker ran and reported a failure.
    #[error("{reason}")]
    Failed { reason: String },

    /// The worker exited with a non-zero status before replying.
    #[error("worker stopped with exit code {code}")]
    AbnormalExit { code: i32 },

    /// The worker was killed by a signal before replying.
    #[error("worker terminated by signal")]
    Terminated,

    /// The worker exited cleanly without ever replying.
    #[error("worker exited without reporting an outcome")]
    NoOutcome,

    #[error("worker did not settle within {0:?}")]
    Timeout(Duration),

    /// The supervising task stopped before settling.
    #[error("dispatch abandoned before the worker settled")]
    Abandoned,
}

impl DispatchError {
    /// Whether a worker process actually ran and reported.
    pub fn is_reported_failure(&self) -> bool {
        matches!(self, DispatchError::Failed { .. })
    }
}

/// Failures inside the worker, reported back as `Failure` outcomes.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// The SMTP client could not be constructed.
    #[error("SMTP configuration error: {0}")]
    TransportConfig(String),

    /// The send itself failed; the message is the underlying error's.
    #[error("{0}")]
    Send(String),

    #[error("malformed task payload: {0}")]
    Payload(String),
}

//! The caller-facing entry point: submit one payload, await one result.

use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::launcher::{Launcher, ProcessLauncher, WorkerHandle};
use super::settlement::{DispatchResult, Settlement, WorkerEvent};
use crate::config::Config;
use crate::error::DispatchError;
use crate::task::{decode_line, encode_line, TaskPayload, WorkerReply};

/// Delegates each payload to a freshly launched worker.
///
/// Submissions are fully independent: there is no queue, no retry and no
/// deduplication. Without a concurrency limit, N concurrent submissions run
/// N workers.
pub struct Dispatcher {
    launcher: Arc<dyn Launcher>,
    timeout: Option<Duration>,
    permits: Option<Arc<Semaphore>>,
    next_id: AtomicU64,
}

impl Dispatcher {
    pub fn new(launcher: impl Launcher) -> Self {
        Self {
            launcher: Arc::new(launcher),
            timeout: None,
            permits: None,
            next_id: AtomicU64::new(1),
        }
    }

    /// Dispatcher spawning the configured worker program.
    pub fn from_config(config: &Config) -> Self {
        let launcher =
            ProcessLauncher::new(config.worker_program.clone()).with_smtp(&config.smtp);

        Self::new(launcher)
            .with_timeout(config.worker_timeout())
            .with_concurrency_limit(config.worker_concurrency)
    }

    /// Deadline for one worker lifecycle. `None` waits indefinitely.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Cap the number of workers alive at once. `0` removes the cap.
    pub fn with_concurrency_limit(mut self, limit: usize) -> Self {
        self.permits = (limit > 0).then(|| Arc::new(Semaphore::new(limit)));
        self
    }

    /// Run `payload` in a new worker and wait for its single result.
    ///
    /// The worker is driven by its own task, so dropping the returned future
    /// stops waiting but does not cancel the send.
    pub async fn submit(&self, payload: TaskPayload) -> DispatchResult {
        let dispatch_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (settlement, rx) = Settlement::new(dispatch_id);

        info!(
            dispatch_id = dispatch_id,
            recipient = %payload.recipient,
            "dispatch_submitted"
        );

        let launcher = Arc::clone(&self.launcher);
        let permits = self.permits.clone();
        let timeout = self.timeout;

        tokio::spawn(async move {
            let _permit = match permits {
                Some(semaphore) => semaphore.acquire_owned().await.ok(),
                None => None,
            };

            supervise(dispatch_id, &*launcher, payload, timeout, settlement).await;
        });

        rx.await.unwrap_or(Err(DispatchError::Abandoned))
    }
}

/// Launch a worker and feed its lifecycle into the settlement.
async fn supervise(
    dispatch_id: u64,
    launcher: &dyn Launcher,
    payload: TaskPayload,
    timeout: Option<Duration>,
    mut settlement: Settlement,
) {
    let handle = match launcher.launch() {
        Ok(handle) => handle,
        Err(e) => {
            warn!(dispatch_id = dispatch_id, error = %e, "dispatch_spawn_failed");
            settlement.observe(WorkerEvent::SpawnFailed(e));
            return;
        }
    };

    info!(dispatch_id = dispatch_id, pid = ?handle.pid(), "dispatch_worker_spawned");

    let lifecycle = drive(handle, &payload, &mut settlement);

    match timeout {
        Some(limit) => {
            // Dropping the lifecycle future drops the handle, which kills the worker.
            let timed_out = tokio::time::timeout(limit, lifecycle).await.is_err();
            if timed_out {
                warn!(
                    dispatch_id = dispatch_id,
                    timeout_ms = limit.as_millis() as u64,
                    "dispatch_worker_timed_out"
                );
                settlement.observe(WorkerEvent::TimedOut(limit));
            }
        }
        None => lifecycle.await,
    }

    debug!(dispatch_id = dispatch_id, "dispatch_worker_finished");
}

/// Send the payload, read at most one reply, then reap the worker.
async fn drive(handle: WorkerHandle, payload: &TaskPayload, settlement: &mut Settlement) {
    let WorkerHandle {
        mut outbound,
        inbound,
        exit,
        ..
    } = handle;

    // A worker that exits early breaks the pipe; its exit status then decides.
    let write_error = send_payload(&mut outbound, payload).await.err();
    drop(outbound);

    if let Some(e) = &write_error {
        debug!(error = %e, "dispatch_payload_write_failed");
    } else {
        let mut reader = BufReader::new(inbound);
        match read_reply(&mut reader).await {
            Ok(Some(reply)) => {
                settlement.observe(WorkerEvent::Reply(reply));
            }
            // Channel closed without a reply; the exit status decides.
            Ok(None) => {}
            Err(msg) => {
                settlement.observe(WorkerEvent::ChannelError(msg));
            }
        }
    }

    match (exit.await, write_error) {
        (Ok(Some(0)), Some(e)) => {
            settlement.observe(WorkerEvent::ChannelError(format!(
                "failed to send payload: {}",
                e
            )));
        }
        (Ok(code), _) => {
            settlement.observe(WorkerEvent::Exited(code));
        }
        (Err(e), _) => {
            settlement.observe(WorkerEvent::ChannelError(format!(
                "failed to wait for worker: {}",
                e
            )));
        }
    }
}

async fn send_payload(
    outbound: &mut Pin<Box<dyn AsyncWrite + Send>>,
    payload: &TaskPayload,
) -> io::Result<()> {
    let line = encode_line(payload).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    outbound.write_all(&line).await?;
    outbound.flush().await?;
    outbound.shutdown().await
}

/// Read the worker's reply line. `Ok(None)` means the channel closed first.
async fn read_reply<R>(reader: &mut R) -> Result<Option<WorkerReply>, String>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();

    let read = reader
        .read_line(&mut line)
        .await
        .map_err(|e| format!("failed to read reply: {}", e))?;

    if read == 0 {
        return Ok(None);
    }

    decode_line(&line)
        .map(Some)
        .map_err(|e| format!("malformed reply {:?}: {}", line.trim_end(), e))
}

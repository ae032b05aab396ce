//! Scripted in-memory workers for dispatcher tests.

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::oneshot;

use super::launcher::{Launcher, WorkerHandle};
use crate::task::{decode_line, encode_line, Outcome, TaskPayload, WorkerReply};

/// What a scripted worker does after reading its payload.
pub(crate) enum Script {
    /// Reply with this outcome, then exit 0.
    Reply(Outcome),
    /// Write an arbitrary line, then exit 0.
    Raw(String),
    /// Exit with this code without replying.
    Exit(i32),
    /// Die as if killed by a signal.
    Killed,
    /// Never reply and never exit.
    Hang,
}

type ScriptFn = dyn Fn(&TaskPayload) -> Script + Send + Sync;

pub(crate) struct ScriptedLauncher {
    script: Arc<ScriptFn>,
    fail_spawn: bool,
    delay: Duration,
    launches: AtomicUsize,
    received: Arc<Mutex<Vec<TaskPayload>>>,
    running: Arc<AtomicUsize>,
    max_running: Arc<AtomicUsize>,
}

impl ScriptedLauncher {
    pub(crate) fn new<F>(script: F) -> Self
    where
        F: Fn(&TaskPayload) -> Script + Send + Sync + 'static,
    {
        Self {
            script: Arc::new(script),
            fail_spawn: false,
            delay: Duration::ZERO,
            launches: AtomicUsize::new(0),
            received: Arc::new(Mutex::new(Vec::new())),
            running: Arc::new(AtomicUsize::new(0)),
            max_running: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A launcher whose every launch fails as if the system ran out of resources.
    pub(crate) fn failing_spawn() -> Self {
        let mut launcher = Self::new(|_| Script::Reply(Outcome::Success));
        launcher.fail_spawn = true;
        launcher
    }

    /// Pause between reading the payload and acting on the script.
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub(crate) fn received(&self) -> Vec<TaskPayload> {
        self.received.lock().unwrap().clone()
    }

    pub(crate) fn max_running(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }
}

impl Launcher for ScriptedLauncher {
    fn launch(&self) -> io::Result<WorkerHandle> {
        self.launches.fetch_add(1, Ordering::SeqCst);

        if self.fail_spawn {
            return Err(io::Error::new(io::ErrorKind::OutOfMemory, "resource exhausted"));
        }

        let (parent_out, child_in) = tokio::io::duplex(16 * 1024);
        let (mut child_out, parent_in) = tokio::io::duplex(16 * 1024);
        let (exit_tx, exit_rx) = oneshot::channel::<Option<i32>>();

        let script = Arc::clone(&self.script);
        let received = Arc::clone(&self.received);
        let running = Arc::clone(&self.running);
        let max_running = Arc::clone(&self.max_running);
        let delay = self.delay;

        tokio::spawn(async move {
            let now = running.fetch_add(1, Ordering::SeqCst) + 1;
            max_running.fetch_max(now, Ordering::SeqCst);

            let mut reader = BufReader::new(child_in);
            let mut line = String::new();
            let _ = reader.read_line(&mut line).await;

            let step = match decode_line::<TaskPayload>(&line) {
                Ok(payload) => {
                    received.lock().unwrap().push(payload.clone());
                    script(&payload)
                }
                Err(_) => Script::Exit(2),
            };

            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let code = match step {
                Script::Reply(outcome) => {
                    let reply = encode_line(&WorkerReply::from(outcome)).unwrap();
                    let _ = child_out.write_all(&reply).await;
                    Some(0)
                }
                Script::Raw(text) => {
                    let _ = child_out.write_all(format!("{}\n", text).as_bytes()).await;
                    Some(0)
                }
                Script::Exit(code) => Some(code),
                Script::Killed => None,
                Script::Hang => std::future::pending::<Option<i32>>().await,
            };

            running.fetch_sub(1, Ordering::SeqCst);
            drop(child_out);
            let _ = exit_tx.send(code);
        });

        let exit = async move {
            exit_rx
                .await
                .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "scripted worker vanished"))
        }
        .boxed();

        Ok(WorkerHandle::new(None, parent_out, parent_in, exit))
    }
}

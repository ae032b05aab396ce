//! Creating worker processes.
//!
//! A [`Launcher`] produces a [`WorkerHandle`]: the two ends of the private
//! channel plus a future that resolves with the worker's exit code. The
//! production launcher spawns an OS process; tests substitute scripted
//! in-memory workers.

use std::ffi::OsString;
use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use std::process::Stdio;

use futures::future::{BoxFuture, FutureExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::Command;
use tracing::debug;

use crate::config::SmtpSettings;

/// Resolves when the worker terminates. `None` means it was killed by a signal.
pub type ExitFuture = BoxFuture<'static, io::Result<Option<i32>>>;

/// Something that can start one isolated worker.
pub trait Launcher: Send + Sync + 'static {
    /// Start a worker and return its handle.
    ///
    /// An error here means no worker ever ran.
    fn launch(&self) -> io::Result<WorkerHandle>;
}

impl<L: Launcher> Launcher for std::sync::Arc<L> {
    fn launch(&self) -> io::Result<WorkerHandle> {
        (**self).launch()
    }
}

/// One spawned worker.
///
/// The handle owns the worker: dropping it closes the channel and, for OS
/// processes, kills a worker that is still running.
pub struct WorkerHandle {
    pub(crate) pid: Option<u32>,
    pub(crate) outbound: Pin<Box<dyn AsyncWrite + Send>>,
    pub(crate) inbound: Pin<Box<dyn AsyncRead + Send>>,
    pub(crate) exit: ExitFuture,
}

impl WorkerHandle {
    pub fn new<W, R>(pid: Option<u32>, outbound: W, inbound: R, exit: ExitFuture) -> Self
    where
        W: AsyncWrite + Send + 'static,
        R: AsyncRead + Send + 'static,
    {
        Self {
            pid,
            outbound: Box::pin(outbound),
            inbound: Box::pin(inbound),
            exit,
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }
}

/// Spawns the worker program as a child process.
///
/// The payload travels over the child's stdin and the reply over its stdout.
/// Stderr is inherited so worker logs land next to the dispatcher's.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    program: PathBuf,
    args: Vec<OsString>,
    env: Vec<(&'static str, Option<String>)>,
}

impl ProcessLauncher {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Hand these SMTP settings to every worker through its environment.
    ///
    /// Absent values are removed from the child's environment so it cannot
    /// pick up stale credentials inherited from the parent.
    pub fn with_smtp(mut self, smtp: &SmtpSettings) -> Self {
        self.env = smtp.to_env();
        self
    }
}

impl Launcher for ProcessLauncher {
    fn launch(&self) -> io::Result<WorkerHandle> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        for (key, value) in &self.env {
            match value {
                Some(value) => cmd.env(key, value),
                None => cmd.env_remove(key),
            };
        }

        let mut child = cmd.spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "worker stdin unavailable"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "worker stdout unavailable"))?;

        let pid = child.id();
        debug!(pid = ?pid, program = %self.program.display(), "worker_process_spawned");

        // The child moves into the exit future; dropping that future kills it.
        let exit = async move { child.wait().await.map(|status| status.code()) }.boxed();

        Ok(WorkerHandle::new(pid, stdin, stdout, exit))
    }
}

//! Dispatching tasks to isolated worker processes.
//!
//! ## Lifecycle
//!
//! ```text
//! submit ─▶ Launcher::launch ─▶ payload ─▶ worker ─▶ reply / exit ─▶ Settlement ─▶ caller
//! ```
//!
//! Every submission spawns its own worker and settles exactly once, with the
//! first of reply, channel error, exit or deadline deciding the result.

pub mod dispatcher;
pub mod launcher;
pub mod settlement;

#[cfg(test)]
pub(crate) mod fake;

pub use dispatcher::Dispatcher;
pub use launcher::{ExitFuture, Launcher, ProcessLauncher, WorkerHandle};
pub use settlement::{DispatchResult, Settlement, WorkerEvent};

//! Kanxa Notifier - out-of-process email delivery for Kanxa Safari.
//!
//! This library provides shared modules for the two binaries:
//! - `kanxa-web`: Thin web server the booking backend calls to send email
//! - `kanxa-mail-worker`: Short-lived process that sends exactly one email
//!
//! ## Architecture
//!
//! ```text
//! Route handler → Dispatcher::submit → spawn kanxa-mail-worker
//!      ▲                                   │ payload (stdin)
//!      │                                   ▼
//!      └──── Settlement ◀── reply (stdout) / exit status
//! ```

pub mod config;
pub mod dispatch;
pub mod error;
pub mod task;
pub mod web;
pub mod worker;

// Re-export commonly used types
pub use config::{Config, SmtpSettings};
pub use dispatch::{Dispatcher, Launcher, ProcessLauncher};
pub use error::{DispatchError, WorkerError};
pub use task::{Outcome, TaskPayload, WorkerReply};
pub use web::AppState;

//! Kanxa mail worker - sends exactly one email, then exits.
//!
//! Launched by the dispatcher once per email. It reads a single JSON payload
//! line from stdin, sends it over SMTP using settings from the environment,
//! writes a single JSON reply line to stdout and exits. Logs go to stderr so
//! they never mix with the reply.

use anyhow::Result;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use kanxa::config::SmtpSettings;
use kanxa::worker::{self, SmtpMailer};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Initialize structured JSON logging on stderr
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .json()
                .flatten_event(true)
                .with_writer(std::io::stderr),
        )
        .init();

    tracing::info!(pid = std::process::id(), "mail_worker_starting");

    let settings = SmtpSettings::from_env();
    let mailer = SmtpMailer::from_settings(&settings);

    let outcome = worker::run(tokio::io::stdin(), tokio::io::stdout(), mailer).await?;

    tracing::info!(success = outcome.is_success(), "mail_worker_exiting");

    Ok(())
}

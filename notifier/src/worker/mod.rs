//! The worker side of a dispatch: read one payload, send one email, reply once.
//!
//! ## Processing Flow
//!
//! ```text
//! stdin ─▶ TaskPayload ─▶ Mailer::send ─▶ Outcome ─▶ WorkerReply ─▶ stdout
//! ```
//!
//! Every path, including a missing payload, a transport that could not be
//! configured and a panic during the send, ends in exactly one reply line.

pub mod mailer;

use std::fmt::Display;
use std::sync::Arc;

use anyhow::{Context, Result};
use lettre::AsyncTransport;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{error, info, warn};

use crate::error::WorkerError;
use crate::task::{decode_line, encode_line, Outcome, TaskPayload, WorkerReply};

pub use mailer::{Mailer, SmtpMailer};

/// Run one task to completion and write its reply.
///
/// Returns the outcome that was reported. An error means the reply could not
/// be delivered; the caller should exit non-zero so the dispatcher sees an
/// abnormal exit.
pub async fn run<R, W, T>(
    inbound: R,
    mut outbound: W,
    mailer: Result<Mailer<T>, WorkerError>,
) -> Result<Outcome>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    T: AsyncTransport + Send + Sync + 'static,
    T::Error: Display,
{
    let outcome = match read_payload(inbound).await {
        Ok(payload) => execute(payload, mailer).await,
        Err(e) => {
            warn!(error = %e, "mail_worker_payload_rejected");
            Outcome::failure(e.to_string())
        }
    };

    let line = encode_line(&WorkerReply::from(outcome.clone()))
        .context("Failed to serialize worker reply")?;
    outbound
        .write_all(&line)
        .await
        .context("Failed to write worker reply")?;
    outbound
        .flush()
        .await
        .context("Failed to flush worker reply")?;

    info!(success = outcome.is_success(), "mail_worker_reply_sent");

    Ok(outcome)
}

/// Read the first and only message from the dispatcher.
async fn read_payload<R: AsyncRead + Unpin>(inbound: R) -> Result<TaskPayload, WorkerError> {
    let mut reader = BufReader::new(inbound);
    let mut line = String::new();

    let read = reader
        .read_line(&mut line)
        .await
        .map_err(|e| WorkerError::Payload(e.to_string()))?;

    if read == 0 {
        return Err(WorkerError::Payload(
            "channel closed before a payload arrived".to_string(),
        ));
    }

    decode_line(&line).map_err(|e| WorkerError::Payload(e.to_string()))
}

/// Perform the send on its own task so a panic still produces a reply.
async fn execute<T>(payload: TaskPayload, mailer: Result<Mailer<T>, WorkerError>) -> Outcome
where
    T: AsyncTransport + Send + Sync + 'static,
    T::Error: Display,
{
    info!(
        recipient = %payload.recipient,
        subject = %payload.subject,
        body_length = payload.body.len(),
        "mail_worker_task_received"
    );

    let mailer = match mailer {
        Ok(mailer) => Arc::new(mailer),
        Err(e) => {
            error!(error = %e, "mail_worker_transport_unavailable");
            return Outcome::failure(e.to_string());
        }
    };

    let recipient = payload.recipient.clone();
    let send = tokio::spawn(async move { mailer.send(&payload).await });

    match send.await {
        Ok(Ok(())) => {
            info!(recipient = %recipient, "mail_worker_send_complete");
            Outcome::Success
        }
        Ok(Err(e)) => {
            error!(recipient = %recipient, error = %e, "mail_worker_send_failed");
            Outcome::failure(e.to_string())
        }
        Err(join_err) => {
            error!(recipient = %recipient, error = %join_err, "mail_worker_send_panicked");
            Outcome::failure(format!("worker task aborted: {}", join_err))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lettre::transport::stub::AsyncStubTransport;

    fn stub_mailer(transport: AsyncStubTransport) -> Result<Mailer<AsyncStubTransport>, WorkerError> {
        Ok(Mailer::new(transport, "bookings@kanxa.example".parse().unwrap()))
    }

    fn payload_line() -> Vec<u8> {
        encode_line(&TaskPayload::new(
            "guest@example.com",
            "Booking confirmed",
            "<p>See you at the lodge</p>",
        ))
        .unwrap()
    }

    fn reply_from(out: &[u8]) -> WorkerReply {
        let text = std::str::from_utf8(out).unwrap();
        assert_eq!(text.matches('\n').count(), 1, "exactly one reply line");
        decode_line(text).unwrap()
    }

    #[tokio::test]
    async fn test_run_reports_success() {
        let transport = AsyncStubTransport::new_ok();
        let mut out = Vec::new();

        let outcome = run(&payload_line()[..], &mut out, stub_mailer(transport.clone()))
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::Success);
        assert_eq!(reply_from(&out), WorkerReply { success: true, error: None });
        assert_eq!(transport.messages().await.len(), 1);
    }

    #[tokio::test]
    async fn test_run_reports_send_failure() {
        let mut out = Vec::new();

        let outcome = run(
            &payload_line()[..],
            &mut out,
            stub_mailer(AsyncStubTransport::new_error()),
        )
        .await
        .unwrap();

        assert!(!outcome.is_success());
        let reply = reply_from(&out);
        assert!(!reply.success);
        assert!(reply.error.is_some());
    }

    #[tokio::test]
    async fn test_run_reports_transport_config_failure() {
        let mut out = Vec::new();
        let mailer: Result<Mailer<AsyncStubTransport>, WorkerError> = Err(
            WorkerError::TransportConfig("SMTP_USER is not set".to_string()),
        );

        let outcome = run(&payload_line()[..], &mut out, mailer).await.unwrap();

        assert_eq!(
            outcome,
            Outcome::failure("SMTP configuration error: SMTP_USER is not set")
        );
        assert_eq!(
            reply_from(&out).error.as_deref(),
            Some("SMTP configuration error: SMTP_USER is not set")
        );
    }

    /// Transport that blows up mid-send.
    struct PanickingTransport;

    #[async_trait::async_trait]
    impl AsyncTransport for PanickingTransport {
        type Ok = ();
        type Error = std::io::Error;

        async fn send_raw(
            &self,
            _envelope: &lettre::address::Envelope,
            _email: &[u8],
        ) -> Result<(), std::io::Error> {
            panic!("connection pool poisoned");
        }
    }

    #[tokio::test]
    async fn test_run_reports_panicking_send_as_failure() {
        let mut out = Vec::new();
        let mailer = Ok(Mailer::new(
            PanickingTransport,
            "bookings@kanxa.example".parse().unwrap(),
        ));

        let outcome = run(&payload_line()[..], &mut out, mailer).await.unwrap();

        let reply = reply_from(&out);
        assert!(!reply.success);
        let reason = reply.error.unwrap();
        assert!(reason.starts_with("worker task aborted"), "got {reason}");
        assert_eq!(outcome, Outcome::failure(reason));
    }

    #[tokio::test]
    async fn test_run_rejects_malformed_payload() {
        let transport = AsyncStubTransport::new_ok();
        let mut out = Vec::new();

        let outcome = run(&b"{\"recipient\": 42}\n"[..], &mut out, stub_mailer(transport.clone()))
            .await
            .unwrap();

        match outcome {
            Outcome::Failure { reason } => assert!(reason.starts_with("malformed task payload")),
            Outcome::Success => panic!("Expected Failure outcome"),
        }
        assert!(transport.messages().await.is_empty());
        assert!(!reply_from(&out).success);
    }

    #[tokio::test]
    async fn test_run_handles_closed_channel() {
        let mut out = Vec::new();

        let outcome = run(&b""[..], &mut out, stub_mailer(AsyncStubTransport::new_ok()))
            .await
            .unwrap();

        match outcome {
            Outcome::Failure { reason } => assert!(reason.contains("channel closed")),
            Outcome::Success => panic!("Expected Failure outcome"),
        }
    }
}

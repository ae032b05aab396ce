//! SMTP delivery through `lettre`.

use std::fmt::Display;

use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::info;

use crate::config::{SmtpSettings, SMTP_PASSWORD_VAR, SMTP_USER_VAR};
use crate::error::WorkerError;
use crate::task::TaskPayload;

/// Mailer backed by a real SMTP connection.
pub type SmtpMailer = Mailer<AsyncSmtpTransport<Tokio1Executor>>;

/// Sends task payloads as HTML emails through any async `lettre` transport.
pub struct Mailer<T> {
    transport: T,
    from: Mailbox,
}

impl SmtpMailer {
    /// Build an SMTP mailer from the worker's settings.
    ///
    /// Credentials are mandatory. Implicit TLS is used when `secure` is set,
    /// STARTTLS otherwise.
    pub fn from_settings(settings: &SmtpSettings) -> Result<Self, WorkerError> {
        let user = settings
            .user
            .clone()
            .ok_or_else(|| WorkerError::TransportConfig(format!("{} is not set", SMTP_USER_VAR)))?;
        let password = settings.password.clone().ok_or_else(|| {
            WorkerError::TransportConfig(format!("{} is not set", SMTP_PASSWORD_VAR))
        })?;

        let sender = settings.sender().unwrap_or(user.as_str());
        let from: Mailbox = sender.parse().map_err(|e| {
            WorkerError::TransportConfig(format!("invalid sender address {:?}: {}", sender, e))
        })?;

        let builder = if settings.secure {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)
        }
        .map_err(|e| WorkerError::TransportConfig(e.to_string()))?;

        let transport = builder
            .port(settings.port)
            .credentials(Credentials::new(user, password))
            .build();

        info!(
            host = %settings.host,
            port = settings.port,
            secure = settings.secure,
            from = %from,
            "mail_transport_configured"
        );

        Ok(Mailer { transport, from })
    }
}

impl<T> Mailer<T>
where
    T: AsyncTransport + Sync,
    T::Error: Display,
{
    pub fn new(transport: T, from: Mailbox) -> Self {
        Self { transport, from }
    }

    /// Deliver one payload as an HTML email.
    pub async fn send(&self, payload: &TaskPayload) -> Result<(), WorkerError> {
        let to: Mailbox = payload.recipient.parse().map_err(|e| {
            WorkerError::Payload(format!(
                "invalid recipient address {:?}: {}",
                payload.recipient, e
            ))
        })?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(payload.subject.clone())
            .header(ContentType::TEXT_HTML)
            .body(payload.body.clone())
            .map_err(|e| WorkerError::Payload(e.to_string()))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| WorkerError::Send(e.to_string()))?;

        Ok(())
    }
}

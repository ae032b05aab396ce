//! Message types exchanged between the dispatcher and a mail worker.
//!
//! The channel carries exactly two messages per worker, each a single line of
//! JSON:
//!
//! ```text
//! dispatcher ── TaskPayload ──▶ worker (stdin)
//! dispatcher ◀── WorkerReply ── worker (stdout)
//! ```

use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// One email to deliver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPayload {
    /// Recipient email address
    #[serde(alias = "to")]
    pub recipient: String,
    /// Email subject
    pub subject: String,
    /// Pre-rendered HTML body
    #[serde(alias = "html")]
    pub body: String,
}

impl TaskPayload {
    /// Create a new task payload.
    pub fn new(
        recipient: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            recipient: recipient.into(),
            subject: subject.into(),
            body: body.into(),
        }
    }
}

/// Result of running one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure { reason: String },
}

impl Outcome {
    pub fn failure(reason: impl Into<String>) -> Self {
        Outcome::Failure {
            reason: reason.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }
}

/// Wire form of an [`Outcome`]: `{"success":true}` or
/// `{"success":false,"error":"..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerReply {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<Outcome> for WorkerReply {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Success => WorkerReply {
                success: true,
                error: None,
            },
            Outcome::Failure { reason } => WorkerReply {
                success: false,
                error: Some(reason),
            },
        }
    }
}

impl From<WorkerReply> for Outcome {
    fn from(reply: WorkerReply) -> Self {
        if reply.success {
            Outcome::Success
        } else {
            Outcome::Failure {
                reason: reply
                    .error
                    .unwrap_or_else(|| "worker reported failure without a reason".to_string()),
            }
        }
    }
}

/// Serialize a message as one newline-terminated JSON line.
pub fn encode_line<T: Serialize>(message: &T) -> serde_json::Result<Vec<u8>> {
    let mut line = serde_json::to_vec(message)?;
    line.push(b'\n');
    Ok(line)
}

/// Parse one line of JSON, ignoring the line terminator.
pub fn decode_line<T: DeserializeOwned>(line: &str) -> serde_json::Result<T> {
    serde_json::from_str(line.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_accepts_frontend_field_names() {
        let json = r#"{"to": "guest@example.com", "subject": "Booking confirmed", "html": "<p>See you</p>"}"#;

        let payload: TaskPayload = serde_json::from_str(json).unwrap();
        assert_eq!(payload.recipient, "guest@example.com");
        assert_eq!(payload.subject, "Booking confirmed");
        assert_eq!(payload.body, "<p>See you</p>");
    }

    #[test]
    fn test_payload_line_is_single_line() {
        let payload = TaskPayload::new("a@example.com", "Hi", "<p>line one\nline two</p>");

        let line = encode_line(&payload).unwrap();
        let text = String::from_utf8(line).unwrap();
        assert_eq!(text.matches('\n').count(), 1);
        assert!(text.ends_with('\n'));

        let parsed: TaskPayload = decode_line(&text).unwrap();
        assert_eq!(parsed, payload);
    }

    #[test]
    fn test_reply_wire_format() {
        let ok = serde_json::to_string(&WorkerReply::from(Outcome::Success)).unwrap();
        assert_eq!(ok, r#"{"success":true}"#);

        let failed =
            serde_json::to_string(&WorkerReply::from(Outcome::failure("auth failed"))).unwrap();
        assert_eq!(failed, r#"{"success":false,"error":"auth failed"}"#);
    }

    #[test]
    fn test_failure_reply_without_reason() {
        let reply: WorkerReply = decode_line("{\"success\":false}\n").unwrap();

        match Outcome::from(reply) {
            Outcome::Failure { reason } => assert!(reason.contains("without a reason")),
            Outcome::Success => panic!("Expected Failure outcome"),
        }
    }
}

//! Notification endpoint handlers.
//!
//! These handlers are the callers of the dispatcher. The synchronous endpoint
//! waits for the worker's result; the queue endpoint returns immediately and
//! only logs how delivery went, so the request that triggered the email never
//! depends on mail delivery.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::dispatch::Dispatcher;
use crate::task::TaskPayload;
use crate::Config;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub dispatcher: Arc<Dispatcher>,
}

impl AppState {
    pub fn new(config: Config, dispatcher: Dispatcher) -> Self {
        Self {
            config: Arc::new(config),
            dispatcher: Arc::new(dispatcher),
        }
    }
}

// =============================================================================
// Health Check
// =============================================================================

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// Whether workers will receive SMTP credentials
    pub smtp_configured: bool,
}

/// Health check endpoint.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let smtp = &state.config.smtp;

    Json(HealthResponse {
        status: "ok",
        smtp_configured: smtp.user.is_some() && smtp.password.is_some(),
    })
}

// =============================================================================
// Email Notifications
// =============================================================================

/// Notification response.
#[derive(Serialize)]
pub struct NotificationResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl NotificationResponse {
    fn status(status: &'static str) -> Json<Self> {
        Json(Self { status, error: None })
    }

    fn error(status: &'static str, error: String) -> Json<Self> {
        Json(Self {
            status,
            error: Some(error),
        })
    }
}

fn validate(payload: &TaskPayload) -> Result<(), (StatusCode, Json<NotificationResponse>)> {
    if payload.recipient.trim().is_empty() {
        warn!("email_notification_missing_recipient");
        return Err((
            StatusCode::BAD_REQUEST,
            NotificationResponse::error("invalid_recipient", "recipient is required".to_string()),
        ));
    }
    Ok(())
}

/// Send an email and wait for the worker's result.
///
/// Returns 200 when the worker reports success and 502 for any failure,
/// including workers that never got to report.
pub async fn send_email(
    State(state): State<AppState>,
    Json(payload): Json<TaskPayload>,
) -> impl IntoResponse {
    info!(
        recipient = %payload.recipient,
        body_length = payload.body.len(),
        "email_notification_received"
    );

    if let Err(rejection) = validate(&payload) {
        return rejection;
    }

    let recipient = payload.recipient.clone();

    match state.dispatcher.submit(payload).await {
        Ok(()) => {
            info!(recipient = %recipient, "email_notification_sent");
            (StatusCode::OK, NotificationResponse::status("sent"))
        }
        Err(e) => {
            error!(recipient = %recipient, error = %e, "email_notification_failed");
            (
                StatusCode::BAD_GATEWAY,
                NotificationResponse::error("failed", e.to_string()),
            )
        }
    }
}

/// Start sending an email and return at once.
///
/// The outcome is only logged.
pub async fn queue_email(
    State(state): State<AppState>,
    Json(payload): Json<TaskPayload>,
) -> impl IntoResponse {
    info!(
        recipient = %payload.recipient,
        body_length = payload.body.len(),
        "email_notification_queued"
    );

    if let Err(rejection) = validate(&payload) {
        return rejection;
    }

    let dispatcher = Arc::clone(&state.dispatcher);

    tokio::spawn(async move {
        let recipient = payload.recipient.clone();

        match dispatcher.submit(payload).await {
            Ok(()) => info!(recipient = %recipient, "email_notification_sent"),
            Err(e) => warn!(recipient = %recipient, error = %e, "email_notification_undelivered"),
        }
    });

    (StatusCode::ACCEPTED, NotificationResponse::status("queued"))
}

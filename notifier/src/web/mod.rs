//! HTTP surface through which the rest of the application sends email.
//!
//! Handlers validate the request, hand the payload to the dispatcher and
//! translate its result into a status code.

pub mod handlers;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

pub use handlers::{
    health, queue_email, send_email, AppState, HealthResponse, NotificationResponse,
};

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/notifications/email", post(send_email))
        .route("/notifications/email/queue", post(queue_email))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub mod health;
pub mod messages;
pub mod sessions;
pub mod tasks;

use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

/// Agent requests carry the whole conversation.
const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

/// Build the full router: the agent-facing messages endpoint, the
/// introspection API, and a fallback that passes every other path
/// through to the upstream.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        // Agent-facing
        .route("/v1/messages", post(messages::messages))
        // Sessions
        .route("/v1/sessions", get(sessions::list_sessions))
        .route("/v1/sessions/:id", get(sessions::get_session))
        .route("/v1/sessions/:id/steps", get(sessions::get_steps))
        .route("/v1/sessions/:id/reset", post(sessions::reset_session))
        .route("/v1/drift-log", get(sessions::drift_log))
        // Task records
        .route("/v1/tasks", get(tasks::list_tasks))
        .route("/v1/tasks/:id/sync", post(tasks::sync_task))
        .fallback(messages::passthrough)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
}

/// An error in the upstream API's own error shape, so agents parse it the
/// same way they parse upstream failures.
pub fn api_error(status: StatusCode, error_type: &str, message: impl Into<String>) -> Response {
    (
        status,
        Json(serde_json::json!({
            "type": "error",
            "error": { "type": error_type, "message": message.into() },
        })),
    )
        .into_response()
}

pub(crate) fn not_found(what: &str, id: &str) -> Response {
    api_error(StatusCode::NOT_FOUND, "not_found_error", format!("{what} not found: {id}"))
}

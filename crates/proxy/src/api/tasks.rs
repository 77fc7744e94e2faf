//! Finalized task records and their memory sync status.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;

use crate::runtime::finalize;
use crate::state::AppState;

use super::{api_error, not_found};

#[derive(Debug, Deserialize)]
pub struct TaskQuery {
    #[serde(default)]
    pub project: Option<String>,
    /// Only records whose sync has not succeeded yet.
    #[serde(default)]
    pub unsynced: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /v1/tasks
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn list_tasks(State(state): State<AppState>, Query(q): Query<TaskQuery>) -> impl IntoResponse {
    let records = if q.unsynced {
        state.tasks.unsynced()
    } else {
        state.tasks.list()
    };
    let records: Vec<_> = records
        .into_iter()
        .filter(|r| q.project.as_deref().map_or(true, |p| r.project == p))
        .collect();
    Json(serde_json::json!({ "count": records.len(), "tasks": records }))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/tasks/:id/sync
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Retry the memory sync of one record and wait for the outcome.
pub async fn sync_task(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let Some(memory) = state.memory.clone() else {
        return api_error(
            StatusCode::CONFLICT,
            "invalid_request_error",
            "team memory is disabled",
        );
    };
    let Some(record) = state.tasks.get(&id) else {
        return not_found("task", &id);
    };

    match finalize::sync(memory.as_ref(), &state.tasks, &state.static_cache, &record).await {
        Ok(()) => Json(serde_json::json!({ "task_id": id, "synced": true })).into_response(),
        Err(e) => api_error(StatusCode::BAD_GATEWAY, e.error_type(), e.to_string()),
    }
}

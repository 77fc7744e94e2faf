//! Session introspection and the explicit reset.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;

use crate::state::AppState;

use super::{api_error, not_found};

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    /// Only sessions of this project.
    #[serde(default)]
    pub project: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DriftLogQuery {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default = "d_limit")]
    pub limit: usize,
}

fn d_limit() -> usize {
    100
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /v1/sessions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn list_sessions(
    State(state): State<AppState>,
    Query(q): Query<ListQuery>,
) -> impl IntoResponse {
    let sessions: Vec<_> = state
        .sessions
        .list()
        .into_iter()
        .filter(|s| q.project.as_deref().map_or(true, |p| s.project == p))
        .map(|s| {
            serde_json::json!({
                "session_id": s.session_id,
                "task_id": s.task_id,
                "project": s.project,
                "goal": s.goal,
                "mode": s.mode,
                "escalation_count": s.escalation_count,
                "last_drift_score": s.last_drift_score,
                "token_count": s.token_count,
                "waiting_for_recovery": s.waiting_for_recovery,
                "pending": s.pending.as_ref().map(|p| p.kind()),
                "updated_at": s.updated_at,
            })
        })
        .collect();
    Json(serde_json::json!({ "count": sessions.len(), "sessions": sessions }))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /v1/sessions/:id
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn get_session(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.sessions.get(&id) {
        Some(s) => Json(s).into_response(),
        None => not_found("session", &id),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /v1/sessions/:id/steps
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Steps of the session's current task.
pub async fn get_steps(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let Some(session) = state.sessions.get(&id) else {
        return not_found("session", &id);
    };
    match state.sessions.steps(&session.task_id) {
        Ok(steps) => Json(serde_json::json!({
            "session_id": id,
            "task_id": session.task_id,
            "count": steps.len(),
            "steps": steps,
        }))
        .into_response(),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.error_type(), e.to_string()),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/sessions/:id/reset
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Release a forced session: escalation back to zero, mode back to
/// normal.
pub async fn reset_session(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.sessions.reset(&id) {
        Some(s) => Json(serde_json::json!({
            "session_id": s.session_id,
            "mode": s.mode,
            "escalation_count": s.escalation_count,
        }))
        .into_response(),
        None => not_found("session", &id),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /v1/drift-log
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Most recent corrections first.
pub async fn drift_log(State(state): State<AppState>, Query(q): Query<DriftLogQuery>) -> Response {
    let entries = match state.sessions.drift_log() {
        Ok(e) => e,
        Err(e) => {
            return api_error(StatusCode::INTERNAL_SERVER_ERROR, e.error_type(), e.to_string())
        }
    };
    let entries: Vec<_> = entries
        .into_iter()
        .rev()
        .filter(|e| q.session_id.as_deref().map_or(true, |id| e.session_id == id))
        .take(q.limit)
        .collect();
    Json(serde_json::json!({ "count": entries.len(), "entries": entries })).into_response()
}

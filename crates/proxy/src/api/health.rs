use axum::extract::State;
use axum::response::{IntoResponse, Json};

use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /health
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let memory = match &state.memory {
        None => serde_json::json!({ "enabled": false }),
        Some(m) => match m.health().await {
            Ok(v) => serde_json::json!({ "enabled": true, "ok": true, "detail": v }),
            Err(e) => serde_json::json!({ "enabled": true, "ok": false, "error": e.to_string() }),
        },
    };

    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "upstream": state.forwarder.base_url(),
        "judge": state.judge.is_some(),
        "memory": memory,
        "sessions": state.sessions.list().len(),
        "extended_cache_entries": state.extended_cache.len(),
        "static_cache_projects": state.static_cache.projects(),
    }))
}

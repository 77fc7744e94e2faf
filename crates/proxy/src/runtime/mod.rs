//! Request handling: the path every `/v1/messages` call takes through the
//! proxy.
//!
//! resolve session → classify → preprocess (or replay) → forward →
//! record the extended cache entry → post-process the reply.

pub mod classify;
pub mod finalize;
pub mod postprocess;
pub mod preprocess;
pub mod summary;

use axum::http::{HeaderMap, Method};
use bytes::Bytes;
use chrono::Utc;
use serde_json::Value;

use dg_domain::error::Result;
use dg_sessions::{content_hash, resolve_project, resolve_session_id, ReplayRecord};
use dg_upstream::{interpret, AgentAdapter, RawResponse};

use crate::state::AppState;

use classify::{classify, RequestKind};

pub const MESSAGES_PATH: &str = "/v1/messages";
pub const PROJECT_HEADER: &str = "x-project-path";
pub const SESSION_HEADER: &str = "x-session-id";

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Handle one agent request to the messages endpoint.
///
/// Transport failures come back as errors for the caller to map to a
/// status. Upstream error statuses are successful calls and are relayed
/// as-is. A 2xx reply that cannot be interpreted is a protocol error.
pub async fn handle_messages(app: &AppState, headers: &HeaderMap, raw: Bytes) -> Result<RawResponse> {
    let request: Value = match serde_json::from_slice(&raw) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, "request body is not JSON, forwarding untouched");
            return passthrough(app, Method::POST, MESSAGES_PATH, headers, raw).await;
        }
    };

    let project = resolve_project(header(headers, PROJECT_HEADER), &request);
    let session_id = resolve_session_id(&request, header(headers, SESSION_HEADER), &project);
    let (session, is_new) = app.sessions.get_or_create(&session_id, &project);
    let inbound_hash = content_hash(&raw);
    let kind = classify(&session, &inbound_hash, &request);
    let adapter = AgentAdapter::detect(&request);
    tracing::debug!(
        session_id = %session_id,
        project = %project,
        kind = kind.as_str(),
        adapter = adapter.as_str(),
        is_new,
        "agent request"
    );

    let outbound = match kind {
        RequestKind::Retry => session
            .replay
            .map(|r| r.outbound)
            .unwrap_or_else(|| raw.clone()),
        RequestKind::First | RequestKind::Continuation => {
            match preprocess::preprocess(app, &session_id, &project, kind, &raw, request).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!(session_id = %session_id, error = %e, "preprocessing failed, forwarding untouched");
                    raw.clone()
                }
            }
        }
    };

    app.sessions.update(&session_id, |s| {
        s.replay = Some(ReplayRecord {
            inbound_hash,
            outbound: outbound.clone(),
        });
    });

    let reply = app
        .forwarder
        .send(Method::POST, MESSAGES_PATH, headers, outbound.clone())
        .await?;
    if !reply.is_success() {
        return Ok(reply);
    }

    app.extended_cache
        .record(&project, app.forwarder.safe_headers(headers), outbound, Utc::now());

    let response = interpret(reply)?;
    postprocess::postprocess(app, &session_id, adapter, &response.body).await;

    Ok(RawResponse {
        status: response.status,
        headers: response.headers,
        raw: response.raw,
    })
}

/// Any other upstream path, byte for byte.
pub async fn passthrough(
    app: &AppState,
    method: Method,
    path: &str,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<RawResponse> {
    app.forwarder.send(method, path, headers, body).await
}

//! Agent-facing relay.
//!
//! - `POST /v1/messages` — the intercepted completion call
//! - anything else — passed through to the upstream byte for byte

use axum::body::Body;
use axum::extract::{OriginalUri, State};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::Response;
use bytes::Bytes;

use dg_domain::error::Error;
use dg_upstream::RawResponse;

use crate::runtime;
use crate::state::AppState;

use super::api_error;

pub async fn messages(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    match runtime::handle_messages(&state, &headers, body).await {
        Ok(reply) => relay(reply),
        Err(e) => error_response(&e),
    }
}

pub async fn passthrough(
    State(state): State<AppState>,
    method: Method,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = uri.path_and_query().map_or(uri.path(), |pq| pq.as_str());
    tracing::debug!(method = %method, path, "passthrough");
    match runtime::passthrough(&state, method, path, &headers, body).await {
        Ok(reply) => relay(reply),
        Err(e) => error_response(&e),
    }
}

fn relay(reply: RawResponse) -> Response {
    let status = StatusCode::from_u16(reply.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut response = Response::new(Body::from(reply.raw));
    *response.status_mut() = status;
    *response.headers_mut() = reply.headers;
    response
}

fn error_response(e: &Error) -> Response {
    tracing::warn!(error = %e, "upstream call failed");
    let status = StatusCode::from_u16(e.suggested_status()).unwrap_or(StatusCode::BAD_GATEWAY);
    api_error(status, e.error_type(), e.to_string())
}

//! Request classification.
//!
//! Only a `First` request (a person typing a new turn) may change the
//! dynamic channel. Continuations re-send the same history plus tool
//! results; retries re-send the exact same bytes.

use serde_json::Value;

use dg_contextpack::body;
use dg_sessions::SessionState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    First,
    Continuation,
    Retry,
}

impl RequestKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::First => "first",
            Self::Continuation => "continuation",
            Self::Retry => "retry",
        }
    }
}

/// `inbound_hash` is the content hash of the raw request bytes.
pub fn classify(session: &SessionState, inbound_hash: &str, request: &Value) -> RequestKind {
    if session
        .replay
        .as_ref()
        .is_some_and(|r| r.inbound_hash == inbound_hash)
    {
        return RequestKind::Retry;
    }
    match body::messages(request).last() {
        Some(last)
            if last.get("role").and_then(Value::as_str) == Some("user")
                && !body::is_tool_result_turn(last) =>
        {
            RequestKind::First
        }
        _ => RequestKind::Continuation,
    }
}

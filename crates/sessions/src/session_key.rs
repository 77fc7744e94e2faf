//! Session and project identification from an inbound request.
//!
//! Session id precedence:
//! 1. `metadata.user_id` ending in `_session_<id>` (what Claude Code sends)
//! 2. the `x-session-id` header
//! 3. `sha256(project + first user message)`, stable for the whole
//!    conversation because the first message never changes
//!
//! Project precedence: the `x-project-path` header, then a
//! `Working directory: <path>` line in the system prompt, then `"unknown"`.

use serde_json::Value;
use sha2::{Digest, Sha256};

pub const UNKNOWN_PROJECT: &str = "unknown";

/// Hex SHA-256 of arbitrary bytes.
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

pub fn resolve_project(header: Option<&str>, body: &Value) -> String {
    if let Some(h) = header.map(str::trim).filter(|h| !h.is_empty()) {
        return h.to_owned();
    }
    system_text(body)
        .lines()
        .find_map(|l| {
            l.trim()
                .strip_prefix("Working directory:")
                .map(|p| p.trim().to_owned())
        })
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| UNKNOWN_PROJECT.to_owned())
}

pub fn resolve_session_id(body: &Value, header: Option<&str>, project: &str) -> String {
    if let Some(id) = body
        .pointer("/metadata/user_id")
        .and_then(Value::as_str)
        .and_then(|u| u.rsplit_once("_session_"))
        .map(|(_, id)| id.trim())
        .filter(|id| !id.is_empty())
    {
        return id.to_owned();
    }
    if let Some(h) = header.map(str::trim).filter(|h| !h.is_empty()) {
        return h.to_owned();
    }
    let first = first_user_text(body).unwrap_or_default();
    let digest = content_hash(format!("{project}\n{first}").as_bytes());
    format!("derived-{}", &digest[..16])
}

/// The system prompt as plain text, whether sent as a string or as blocks.
pub fn system_text(body: &Value) -> String {
    match body.get("system") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(blocks)) => blocks
            .iter()
            .filter_map(|b| b.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    }
}

/// Text of the first user message in the request.
pub fn first_user_text(body: &Value) -> Option<String> {
    body.get("messages")?
        .as_array()?
        .iter()
        .find(|m| m.get("role").and_then(Value::as_str) == Some("user"))
        .map(message_text)
}

/// Concatenated text parts of one message. Tool results are skipped.
pub fn message_text(message: &Value) -> String {
    match message.get("content") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(parts)) => parts
            .iter()
            .filter(|p| p.get("type").and_then(Value::as_str) == Some("text"))
            .filter_map(|p| p.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn session_from_metadata_suffix() {
        let body = json!({"metadata": {"user_id": "user_abc_account_123_session_9f8e-7d"}});
        assert_eq!(resolve_session_id(&body, Some("hdr"), "/p"), "9f8e-7d");
    }

    #[test]
    fn session_from_header_when_no_metadata() {
        let body = json!({"metadata": {"user_id": "plain-user"}});
        assert_eq!(resolve_session_id(&body, Some(" s-42 "), "/p"), "s-42");
    }

    #[test]
    fn derived_session_is_stable_across_turns() {
        let turn1 = json!({"messages": [{"role": "user", "content": "fix the bug"}]});
        let turn2 = json!({"messages": [
            {"role": "user", "content": [{"type": "text", "text": "fix the bug"}]},
            {"role": "assistant", "content": "on it"},
            {"role": "user", "content": "and add a test"}
        ]});
        let a = resolve_session_id(&turn1, None, "/p");
        let b = resolve_session_id(&turn2, None, "/p");
        assert_eq!(a, b);
        assert!(a.starts_with("derived-"));
        assert_ne!(a, resolve_session_id(&turn1, None, "/other"));
    }

    #[test]
    fn project_from_header_then_system_prompt() {
        let body = json!({"system": [
            {"type": "text", "text": "You are an agent."},
            {"type": "text", "text": "<env>\nWorking directory: /home/dev/app\n</env>"}
        ]});
        assert_eq!(resolve_project(Some("/hdr"), &body), "/hdr");
        assert_eq!(resolve_project(None, &body), "/home/dev/app");
        assert_eq!(resolve_project(None, &json!({})), UNKNOWN_PROJECT);
    }

    #[test]
    fn message_text_skips_tool_results() {
        let m = json!({"role": "user", "content": [
            {"type": "tool_result", "tool_use_id": "t", "content": "ok"},
            {"type": "text", "text": "next"}
        ]});
        assert_eq!(message_text(&m), "next");
    }
}

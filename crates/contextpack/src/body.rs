//! Request-body rewriting.
//!
//! All edits go through `serde_json::Value` with `preserve_order`, so keys
//! keep their original order when the body is serialized again.

use serde_json::{json, Value};

use dg_domain::error::{Error, Result};

pub fn messages(body: &Value) -> &[Value] {
    body.get("messages")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Index of the last `user` message.
pub fn last_user_index(body: &Value) -> Option<usize> {
    messages(body)
        .iter()
        .rposition(|m| m.get("role").and_then(Value::as_str) == Some("user"))
}

/// A user message made only of `tool_result` blocks: the agent continuing
/// its own loop, not a person typing.
pub fn is_tool_result_turn(message: &Value) -> bool {
    match message.get("content") {
        Some(Value::Array(blocks)) => {
            !blocks.is_empty()
                && blocks
                    .iter()
                    .all(|b| b.get("type").and_then(Value::as_str) == Some("tool_result"))
        }
        _ => false,
    }
}

/// Append `text` to the system prompt, whatever shape it has.
pub fn append_system_text(body: &mut Value, text: &str) -> Result<()> {
    let obj = body
        .as_object_mut()
        .ok_or_else(|| Error::Protocol("request body is not an object".into()))?;
    match obj.get_mut("system") {
        None | Some(Value::Null) => {
            obj.insert("system".into(), Value::String(text.to_string()));
        }
        Some(Value::String(s)) if s.is_empty() => {
            s.push_str(text);
        }
        Some(Value::String(s)) => {
            s.push_str("\n\n");
            s.push_str(text);
        }
        Some(Value::Array(blocks)) => {
            blocks.push(json!({ "type": "text", "text": text }));
        }
        Some(_) => return Err(Error::Protocol("unexpected system prompt shape".into())),
    }
    Ok(())
}

/// Append `text` to message `idx` as trailing content.
pub fn append_to_message(body: &mut Value, idx: usize, text: &str) -> Result<()> {
    let msg = body
        .get_mut("messages")
        .and_then(Value::as_array_mut)
        .and_then(|m| m.get_mut(idx))
        .ok_or_else(|| Error::Protocol(format!("no message at index {idx}")))?;
    match msg.get_mut("content") {
        Some(Value::String(s)) => {
            s.push_str("\n\n");
            s.push_str(text);
        }
        Some(Value::Array(blocks)) => {
            blocks.push(json!({ "type": "text", "text": text }));
        }
        _ => return Err(Error::Protocol("unexpected message content shape".into())),
    }
    Ok(())
}

/// Append `text` to the last user message.
pub fn append_to_last_user_message(body: &mut Value, text: &str) -> Result<()> {
    let idx = last_user_index(body).ok_or_else(|| Error::Protocol("no user message".into()))?;
    append_to_message(body, idx, text)
}

/// Drop the conversation history. Only the in-flight user message stays,
/// since the Messages API rejects an empty list. Returns how many messages
/// were removed.
pub fn clear_history(body: &mut Value) -> usize {
    let keep = last_user_index(body);
    let Some(messages) = body.get_mut("messages").and_then(Value::as_array_mut) else {
        return 0;
    };
    let before = messages.len();
    let current = keep.map(|i| messages.swap_remove(i));
    messages.clear();
    messages.extend(current);
    let removed = before - messages.len();
    tracing::debug!(removed, "conversation history cleared");
    removed
}

/// Drop the first `n` messages, as a previous CLEAR did. Returns `false`
/// (and leaves the body alone) when the history is no longer than `n`,
/// meaning the agent rewrote its own history since.
pub fn drop_prefix(body: &mut Value, n: usize) -> bool {
    let Some(messages) = body.get_mut("messages").and_then(Value::as_array_mut) else {
        return false;
    };
    if messages.len() <= n {
        return false;
    }
    messages.drain(..n);
    true
}

pub fn to_bytes(body: &Value) -> Result<bytes::Bytes> {
    Ok(serde_json::to_vec(body)?.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body() -> Value {
        json!({
            "model": "m",
            "system": [{ "type": "text", "text": "You are helpful.", "cache_control": { "type": "ephemeral" } }],
            "messages": [
                { "role": "user", "content": "Fix the bug" },
                { "role": "assistant", "content": [{ "type": "tool_use", "id": "t1", "name": "Read", "input": {} }] },
                { "role": "user", "content": [{ "type": "tool_result", "tool_use_id": "t1", "content": "..." }] },
                { "role": "assistant", "content": [{ "type": "text", "text": "Done." }] },
                { "role": "user", "content": [{ "type": "text", "text": "Now add a test" }] }
            ]
        })
    }

    #[test]
    fn system_text_appends_a_block() {
        let mut b = body();
        append_system_text(&mut b, "memory").unwrap();
        let system = b["system"].as_array().unwrap();
        assert_eq!(system.len(), 2);
        assert_eq!(system[0]["cache_control"]["type"], "ephemeral");
        assert_eq!(system[1]["text"], "memory");
    }

    #[test]
    fn system_text_handles_string_and_missing() {
        let mut b = json!({ "system": "base", "messages": [] });
        append_system_text(&mut b, "extra").unwrap();
        assert_eq!(b["system"], "base\n\nextra");

        let mut b = json!({ "messages": [] });
        append_system_text(&mut b, "only").unwrap();
        assert_eq!(b["system"], "only");
    }

    #[test]
    fn dynamic_text_goes_to_last_user_message() {
        let mut b = body();
        append_to_last_user_message(&mut b, "ctx").unwrap();
        let last = b["messages"][4]["content"].as_array().unwrap();
        assert_eq!(last[1]["text"], "ctx");
        assert_eq!(b["messages"][0]["content"], "Fix the bug");
    }

    #[test]
    fn tool_results_are_continuations() {
        let b = body();
        assert!(is_tool_result_turn(&b["messages"][2]));
        assert!(!is_tool_result_turn(&b["messages"][4]));
        assert!(!is_tool_result_turn(&b["messages"][0]));
    }

    #[test]
    fn clear_keeps_only_the_current_turn() {
        let mut b = body();
        assert_eq!(clear_history(&mut b), 4);
        let msgs = messages(&b);
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0]["content"][0]["text"], "Now add a test");
    }

    #[test]
    fn prefix_drop_keeps_the_tail() {
        let mut b = body();
        assert!(drop_prefix(&mut b, 4));
        assert_eq!(messages(&b).len(), 1);

        let mut b = body();
        assert!(!drop_prefix(&mut b, 5));
        assert_eq!(messages(&b).len(), 5);
    }

    #[test]
    fn key_order_survives_a_rewrite() {
        let raw = r#"{"model":"m","max_tokens":10,"system":"s","messages":[{"role":"user","content":"hi"}]}"#;
        let mut b: Value = serde_json::from_str(raw).unwrap();
        append_system_text(&mut b, "x").unwrap();
        let out = String::from_utf8(to_bytes(&b).unwrap().to_vec()).unwrap();
        assert!(out.starts_with(r#"{"model":"m","max_tokens":10,"system":"s\n\nx""#));
    }
}

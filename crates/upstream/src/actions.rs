//! Protocol Action Extractor.
//!
//! Works on the logical assistant message, so a streamed turn and the same
//! turn fetched non-streamed produce identical results.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use dg_domain::action::{AgentAction, TokenUsage};

use crate::adapter::AgentAdapter;

/// Everything the session layer needs from one assistant turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedTurn {
    pub actions: Vec<AgentAction>,
    pub usage: TokenUsage,
    /// Concatenated visible text blocks.
    pub text: String,
    /// Concatenated reasoning blocks.
    pub thinking: String,
    pub stop_reason: Option<String>,
    pub model: Option<String>,
}

impl ExtractedTurn {
    /// Whether any action edits, writes or runs a shell command.
    pub fn has_modifying(&self) -> bool {
        self.actions.iter().any(|a| a.kind.is_modifying())
    }

    /// The agent stopped on its own and is not waiting on a tool result.
    pub fn is_final(&self) -> bool {
        self.stop_reason.as_deref() == Some("end_turn")
            && !self.actions.iter().any(|a| !a.tool_use_id.is_empty())
    }

    /// Free-text reasoning for the step log: thinking if present, else text.
    pub fn reasoning(&self) -> &str {
        if self.thinking.trim().is_empty() {
            self.text.trim()
        } else {
            self.thinking.trim()
        }
    }
}

/// Read usage counters from a message's `usage` object. Missing counters
/// are zero.
pub fn parse_usage(message: &Value) -> TokenUsage {
    message
        .get("usage")
        .cloned()
        .and_then(|u| serde_json::from_value::<TokenUsage>(u).ok())
        .unwrap_or_default()
}

pub fn extract_turn(message: &Value, adapter: AgentAdapter) -> ExtractedTurn {
    let mut turn = ExtractedTurn {
        usage: parse_usage(message),
        stop_reason: message
            .get("stop_reason")
            .and_then(Value::as_str)
            .map(str::to_owned),
        model: message
            .get("model")
            .and_then(Value::as_str)
            .map(str::to_owned),
        ..Default::default()
    };

    let blocks = message
        .get("content")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    for block in blocks {
        match block.get("type").and_then(Value::as_str) {
            Some("text") => {
                push_para(
                    &mut turn.text,
                    block.get("text").and_then(Value::as_str).unwrap_or(""),
                );
            }
            Some("thinking") => {
                push_para(
                    &mut turn.thinking,
                    block.get("thinking").and_then(Value::as_str).unwrap_or(""),
                );
            }
            Some("tool_use") => {
                let name = block.get("name").and_then(Value::as_str).unwrap_or("");
                let id = block.get("id").and_then(Value::as_str).unwrap_or("");
                let input = block.get("input").unwrap_or(&Value::Null);
                turn.actions.push(adapter.classify(name, id, input));
            }
            // server_tool_use runs upstream; the agent never executes it.
            _ => {}
        }
    }

    turn
}

fn push_para(buf: &mut String, s: &str) {
    if s.is_empty() {
        return;
    }
    if !buf.is_empty() {
        buf.push_str("\n\n");
    }
    buf.push_str(s);
}

//! Stream reconstruction.
//!
//! Folds a Messages API event stream back into the single JSON message the
//! non-streamed endpoint would have returned. Content blocks are tracked by
//! index:
//!
//! - `text` blocks concatenate `text_delta` fragments (citations are kept),
//! - `thinking` blocks concatenate `thinking_delta` fragments and take the
//!   opaque `signature_delta` that arrives right before the block closes,
//! - `tool_use` / `server_tool_use` blocks concatenate `input_json_delta`
//!   fragments and parse the result once, at `content_block_stop`.
//!
//! Usage and stop reason come from `message_delta`, falling back to the
//! values announced in `message_start`. Lines that are not valid JSON are
//! skipped. An `error` event, a tool input that does not parse, or a stream
//! that ends before it stops discards the whole reconstruction.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use dg_domain::error::{Error, Result};
use dg_domain::trace::TraceEvent;

use crate::sse;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Block builders
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug)]
enum BlockBuilder {
    Text {
        text: String,
        citations: Vec<Value>,
    },
    Thinking {
        thinking: String,
        signature: String,
    },
    ToolUse {
        /// `tool_use` or `server_tool_use`.
        kind: String,
        id: String,
        name: String,
        partial_json: String,
        /// Input announced at block start; used when no delta arrives.
        initial_input: Value,
        input: Option<Value>,
    },
    /// Blocks with no delta protocol (e.g. `redacted_thinking`) are kept
    /// exactly as announced.
    Opaque(Value),
}

impl BlockBuilder {
    fn start(block: &Value) -> Self {
        let block_type = block.get("type").and_then(Value::as_str).unwrap_or("");
        match block_type {
            "text" => Self::Text {
                text: str_field(block, "text"),
                citations: block
                    .get("citations")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default(),
            },
            "thinking" => Self::Thinking {
                thinking: str_field(block, "thinking"),
                signature: str_field(block, "signature"),
            },
            "tool_use" | "server_tool_use" => Self::ToolUse {
                kind: block_type.to_owned(),
                id: str_field(block, "id"),
                name: str_field(block, "name"),
                partial_json: String::new(),
                initial_input: block
                    .get("input")
                    .cloned()
                    .unwrap_or_else(|| Value::Object(Map::new())),
                input: None,
            },
            _ => Self::Opaque(block.clone()),
        }
    }

    fn apply_delta(&mut self, delta: &Value) {
        let delta_type = delta.get("type").and_then(Value::as_str).unwrap_or("");
        match (self, delta_type) {
            (Self::Text { text, .. }, "text_delta") => {
                text.push_str(delta.get("text").and_then(Value::as_str).unwrap_or(""));
            }
            (Self::Text { citations, .. }, "citations_delta") => {
                if let Some(c) = delta.get("citation") {
                    citations.push(c.clone());
                }
            }
            (Self::Thinking { thinking, .. }, "thinking_delta") => {
                thinking.push_str(delta.get("thinking").and_then(Value::as_str).unwrap_or(""));
            }
            (Self::Thinking { signature, .. }, "signature_delta") => {
                signature.push_str(delta.get("signature").and_then(Value::as_str).unwrap_or(""));
            }
            (Self::ToolUse { partial_json, .. }, "input_json_delta") => {
                partial_json.push_str(
                    delta
                        .get("partial_json")
                        .and_then(Value::as_str)
                        .unwrap_or(""),
                );
            }
            _ => {}
        }
    }

    /// Called at `content_block_stop`. Tool input JSON is parsed here, once.
    fn close(&mut self) -> Result<()> {
        if let Self::ToolUse {
            name,
            partial_json,
            initial_input,
            input,
            ..
        } = self
        {
            let parsed = if partial_json.trim().is_empty() {
                initial_input.clone()
            } else {
                serde_json::from_str(partial_json).map_err(|e| {
                    Error::Protocol(format!("tool `{name}` input is not valid JSON: {e}"))
                })?
            };
            *input = Some(parsed);
        }
        Ok(())
    }

    fn into_value(self) -> Result<Value> {
        Ok(match self {
            Self::Text { text, citations } => {
                let mut block = serde_json::json!({ "type": "text", "text": text });
                if !citations.is_empty() {
                    block["citations"] = Value::Array(citations);
                }
                block
            }
            Self::Thinking {
                thinking,
                signature,
            } => serde_json::json!({
                "type": "thinking",
                "thinking": thinking,
                "signature": signature,
            }),
            Self::ToolUse {
                kind,
                id,
                name,
                input,
                ..
            } => {
                let input = input.ok_or_else(|| {
                    Error::Protocol(format!("tool `{name}` block was never closed"))
                })?;
                serde_json::json!({
                    "type": kind,
                    "id": id,
                    "name": name,
                    "input": input,
                })
            }
            Self::Opaque(v) => v,
        })
    }
}

fn str_field(v: &Value, key: &str) -> String {
    v.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Message assembler
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Accumulates stream events into one message.
#[derive(Debug, Default)]
pub struct MessageAssembler {
    message: Option<Map<String, Value>>,
    blocks: BTreeMap<u64, BlockBuilder>,
    usage: Map<String, Value>,
    stop_reason: Option<Value>,
    stop_sequence: Option<Value>,
    stopped: bool,
    skipped: usize,
}

impl MessageAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of event payloads skipped because they did not parse.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Feed one `data:` payload.
    pub fn push(&mut self, data: &str) -> Result<()> {
        let v: Value = match serde_json::from_str(data) {
            Ok(v) => v,
            Err(_) => {
                self.skipped += 1;
                return Ok(());
            }
        };

        let event_type = v.get("type").and_then(Value::as_str).unwrap_or("");
        let index = v.get("index").and_then(Value::as_u64).unwrap_or(0);

        match event_type {
            "message_start" => {
                let Some(Value::Object(mut msg)) = v.get("message").cloned() else {
                    self.skipped += 1;
                    return Ok(());
                };
                if let Some(Value::Object(u)) = msg.remove("usage") {
                    self.usage = u;
                }
                if let Some(r) = msg.get("stop_reason").filter(|r| !r.is_null()) {
                    self.stop_reason = Some(r.clone());
                }
                msg.insert("content".into(), Value::Array(Vec::new()));
                self.message = Some(msg);
            }

            "content_block_start" => {
                if let Some(block) = v.get("content_block") {
                    self.blocks.insert(index, BlockBuilder::start(block));
                }
            }

            "content_block_delta" => {
                if let (Some(builder), Some(delta)) =
                    (self.blocks.get_mut(&index), v.get("delta"))
                {
                    builder.apply_delta(delta);
                }
            }

            "content_block_stop" => {
                if let Some(builder) = self.blocks.get_mut(&index) {
                    builder.close()?;
                }
            }

            "message_delta" => {
                if let Some(delta) = v.get("delta") {
                    if let Some(r) = delta.get("stop_reason").filter(|r| !r.is_null()) {
                        self.stop_reason = Some(r.clone());
                    }
                    if let Some(s) = delta.get("stop_sequence") {
                        self.stop_sequence = Some(s.clone());
                    }
                }
                // Terminal counters override; anything omitted keeps the
                // message_start value.
                if let Some(Value::Object(u)) = v.get("usage") {
                    for (k, val) in u {
                        if !val.is_null() {
                            self.usage.insert(k.clone(), val.clone());
                        }
                    }
                }
            }

            "message_stop" => self.stopped = true,

            "error" => {
                let msg = v
                    .get("error")
                    .and_then(|e| e.get("message"))
                    .and_then(Value::as_str)
                    .unwrap_or("unknown stream error");
                return Err(Error::Protocol(format!("upstream stream error: {msg}")));
            }

            // ping and event types this proxy does not know about.
            _ => {}
        }

        Ok(())
    }

    /// Produce the final message. Fails if the stream never started or
    /// never reached a terminal event.
    pub fn finish(self) -> Result<Value> {
        let Some(mut message) = self.message else {
            return Err(Error::Protocol(
                "stream ended before message_start".into(),
            ));
        };
        if !self.stopped && self.stop_reason.is_none() {
            return Err(Error::Protocol("stream ended before message_stop".into()));
        }

        let content = self
            .blocks
            .into_values()
            .map(BlockBuilder::into_value)
            .collect::<Result<Vec<_>>>()?;

        message.insert("content".into(), Value::Array(content));
        message.insert(
            "stop_reason".into(),
            self.stop_reason.unwrap_or(Value::Null),
        );
        message.insert(
            "stop_sequence".into(),
            self.stop_sequence.unwrap_or(Value::Null),
        );
        message.insert("usage".into(), Value::Object(self.usage));
        Ok(Value::Object(message))
    }
}

/// Reconstruct the logical message from a complete SSE body.
pub fn reconstruct_message(body: &str) -> Result<Value> {
    let mut assembler = MessageAssembler::new();
    for frame in sse::frames(body) {
        assembler.push(&frame.data)?;
    }
    let skipped = assembler.skipped();
    let blocks = assembler.blocks.len();
    let message = assembler.finish()?;

    TraceEvent::StreamReconstructed {
        blocks,
        skipped_lines: skipped,
        stop_reason: message
            .get("stop_reason")
            .and_then(Value::as_str)
            .map(str::to_owned),
    }
    .emit();

    Ok(message)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    fn sse(events: &[Value]) -> String {
        events
            .iter()
            .map(|e| {
                format!(
                    "event: {}\ndata: {}\n\n",
                    e["type"].as_str().unwrap(),
                    e
                )
            })
            .collect()
    }

    fn start() -> Value {
        serde_json::json!({
            "type": "message_start",
            "message": {
                "id": "msg_1", "type": "message", "role": "assistant",
                "model": "claude-test", "content": [],
                "stop_reason": null, "stop_sequence": null,
                "usage": {"input_tokens": 120, "output_tokens": 1,
                          "cache_read_input_tokens": 5000,
                          "cache_creation_input_tokens": 0}
            }
        })
    }

    #[test]
    fn text_thinking_and_tool_blocks() {
        let body = sse(&[
            start(),
            serde_json::json!({"type":"content_block_start","index":0,"content_block":{"type":"thinking","thinking":"","signature":""}}),
            serde_json::json!({"type":"content_block_delta","index":0,"delta":{"type":"thinking_delta","thinking":"Need to "}}),
            serde_json::json!({"type":"content_block_delta","index":0,"delta":{"type":"thinking_delta","thinking":"edit."}}),
            serde_json::json!({"type":"content_block_delta","index":0,"delta":{"type":"signature_delta","signature":"sig=="}}),
            serde_json::json!({"type":"content_block_stop","index":0}),
            serde_json::json!({"type":"content_block_start","index":1,"content_block":{"type":"text","text":""}}),
            serde_json::json!({"type":"content_block_delta","index":1,"delta":{"type":"text_delta","text":"Editing "}}),
            serde_json::json!({"type":"content_block_delta","index":1,"delta":{"type":"text_delta","text":"now."}}),
            serde_json::json!({"type":"content_block_stop","index":1}),
            serde_json::json!({"type":"content_block_start","index":2,"content_block":{"type":"tool_use","id":"tu_1","name":"Edit","input":{}}}),
            serde_json::json!({"type":"content_block_delta","index":2,"delta":{"type":"input_json_delta","partial_json":"{\"file_path\":"}}),
            serde_json::json!({"type":"content_block_delta","index":2,"delta":{"type":"input_json_delta","partial_json":"\"src/a.rs\"}"}}),
            serde_json::json!({"type":"content_block_stop","index":2}),
            serde_json::json!({"type":"message_delta","delta":{"stop_reason":"tool_use","stop_sequence":null},"usage":{"output_tokens":42}}),
            serde_json::json!({"type":"message_stop"}),
        ]);

        let msg = reconstruct_message(&body).unwrap();
        let content = msg["content"].as_array().unwrap();
        assert_eq!(content.len(), 3);
        assert_eq!(content[0]["thinking"], "Need to edit.");
        assert_eq!(content[0]["signature"], "sig==");
        assert_eq!(content[1]["text"], "Editing now.");
        assert_eq!(content[2]["input"]["file_path"], "src/a.rs");
        assert_eq!(msg["stop_reason"], "tool_use");
        // Terminal usage overrides output, start usage survives for input.
        assert_eq!(msg["usage"]["output_tokens"], 42);
        assert_eq!(msg["usage"]["input_tokens"], 120);
        assert_eq!(msg["usage"]["cache_read_input_tokens"], 5000);
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let mut body = sse(&[start()]);
        body.push_str("data: {not json\n\n");
        body.push_str(&sse(&[
            serde_json::json!({"type":"content_block_start","index":0,"content_block":{"type":"text","text":"hi"}}),
            serde_json::json!({"type":"content_block_stop","index":0}),
            serde_json::json!({"type":"ping"}),
            serde_json::json!({"type":"message_delta","delta":{"stop_reason":"end_turn"}}),
            serde_json::json!({"type":"message_stop"}),
        ]));
        let msg = reconstruct_message(&body).unwrap();
        assert_eq!(msg["content"][0]["text"], "hi");
        assert_eq!(msg["stop_reason"], "end_turn");
        // No usage in message_delta: start values are kept.
        assert_eq!(msg["usage"]["output_tokens"], 1);
    }

    #[test]
    fn error_event_discards_everything() {
        let body = sse(&[
            start(),
            serde_json::json!({"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}),
        ]);
        let err = reconstruct_message(&body).unwrap_err();
        assert!(err.to_string().contains("Overloaded"));
    }

    #[test]
    fn truncated_stream_is_rejected() {
        let body = sse(&[
            start(),
            serde_json::json!({"type":"content_block_start","index":0,"content_block":{"type":"text","text":""}}),
            serde_json::json!({"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"half"}}),
        ]);
        assert!(matches!(
            reconstruct_message(&body),
            Err(Error::Protocol(_))
        ));
    }

    #[test]
    fn invalid_tool_json_is_rejected() {
        let body = sse(&[
            start(),
            serde_json::json!({"type":"content_block_start","index":0,"content_block":{"type":"tool_use","id":"t","name":"Bash","input":{}}}),
            serde_json::json!({"type":"content_block_delta","index":0,"delta":{"type":"input_json_delta","partial_json":"{\"command\": "}}),
            serde_json::json!({"type":"content_block_stop","index":0}),
            serde_json::json!({"type":"message_stop"}),
        ]);
        assert!(matches!(
            reconstruct_message(&body),
            Err(Error::Protocol(_))
        ));
    }

    #[test]
    fn tool_without_deltas_keeps_initial_input() {
        let body = sse(&[
            start(),
            serde_json::json!({"type":"content_block_start","index":0,"content_block":{"type":"tool_use","id":"t","name":"LS","input":{}}}),
            serde_json::json!({"type":"content_block_stop","index":0}),
            serde_json::json!({"type":"message_delta","delta":{"stop_reason":"tool_use"}}),
        ]);
        let msg = reconstruct_message(&body).unwrap();
        assert_eq!(msg["content"][0]["input"], serde_json::json!({}));
    }

    #[test]
    fn no_message_start_is_rejected() {
        assert!(reconstruct_message("data: {\"type\":\"message_stop\"}\n\n").is_err());
    }
}

//! Server-sent event framing.
//!
//! The upstream stream is fully buffered before it is relayed, so framing
//! works on the complete body: events are delimited by a blank line and only
//! their `data:` lines matter (the event name is repeated inside the JSON
//! payload as `"type"`).

/// One SSE event with its `data:` lines joined by `\n`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SseFrame {
    pub event: Option<String>,
    pub data: String,
}

/// Split a complete SSE body into frames.
///
/// Accepts `\n` and `\r\n` line endings. Frames without any `data:` line
/// (comments, bare `event:` lines) are dropped. A trailing frame without
/// the final blank line is still returned.
pub(crate) fn frames(body: &str) -> Vec<SseFrame> {
    let mut out = Vec::new();
    let mut event: Option<String> = None;
    let mut data: Vec<&str> = Vec::new();

    let mut flush = |event: &mut Option<String>, data: &mut Vec<&str>| {
        if !data.is_empty() {
            out.push(SseFrame {
                event: event.take(),
                data: data.join("\n"),
            });
        }
        *event = None;
        data.clear();
    };

    for line in body.split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() {
            flush(&mut event, &mut data);
            continue;
        }
        if let Some(rest) = line.strip_prefix("data:") {
            let rest = rest.trim();
            if !rest.is_empty() {
                data.push(rest);
            }
        } else if let Some(rest) = line.strip_prefix("event:") {
            event = Some(rest.trim().to_owned());
        }
        // `id:`, `retry:` and `:` comments are irrelevant here.
    }
    flush(&mut event, &mut data);

    out
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

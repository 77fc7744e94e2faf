//! Byte-exact keep-alive splicing.
//!
//! The keep-alive body must share the cached prefix of the last real
//! request byte for byte, so it is built by inserting one fragment into the
//! original bytes rather than by re-serializing a parsed value (which would
//! reorder keys or change whitespace).
//!
//! The scanner walks the body once, tracking string state (with escapes)
//! and bracket/brace depth. It only accepts a `"messages"` key at depth 1 of
//! the top-level object, so the same word inside a string or a nested
//! object never matches.

/// The synthetic user turn appended by a keep-alive.
pub const KEEP_ALIVE_TURN: &[u8] = br#"{"role":"user","content":"."}"#;

/// Byte offsets of the top-level `messages` array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessagesSpan {
    /// Offset of `[`.
    pub open: usize,
    /// Offset of the matching `]`.
    pub close: usize,
    /// The array holds at least one element.
    pub non_empty: bool,
}

/// Locate the top-level `messages` array. `None` if the body is not an
/// object with such an array, or is malformed.
pub fn find_messages(body: &[u8]) -> Option<MessagesSpan> {
    let mut depth = 0usize;
    let mut i = 0usize;

    while i < body.len() {
        match body[i] {
            b'"' => {
                let end = string_end(body, i)?;
                if depth == 1 && &body[i + 1..end] == b"messages" {
                    let colon = skip_ws(body, end + 1)?;
                    if body[colon] == b':' {
                        let open = skip_ws(body, colon + 1)?;
                        if body[open] == b'[' {
                            return array_span(body, open);
                        }
                    }
                }
                i = end + 1;
            }
            b'{' | b'[' => {
                depth += 1;
                i += 1;
            }
            b'}' | b']' => {
                depth = depth.checked_sub(1)?;
                i += 1;
            }
            _ => i += 1,
        }
    }
    None
}

/// Insert `turn` as the last element of the `messages` array. Every byte
/// outside the inserted fragment is unchanged.
pub fn splice_turn(body: &[u8], turn: &[u8]) -> Option<Vec<u8>> {
    let span = find_messages(body)?;
    let mut out = Vec::with_capacity(body.len() + turn.len() + 1);
    out.extend_from_slice(&body[..span.close]);
    if span.non_empty {
        out.push(b',');
    }
    out.extend_from_slice(turn);
    out.extend_from_slice(&body[span.close..]);
    Some(out)
}

pub fn keep_alive_body(body: &[u8]) -> Option<Vec<u8>> {
    splice_turn(body, KEEP_ALIVE_TURN)
}

// ── scanner helpers ──────────────────────────────────────────────────

/// Offset of the closing quote of the string opening at `start`.
fn string_end(body: &[u8], start: usize) -> Option<usize> {
    let mut i = start + 1;
    while i < body.len() {
        match body[i] {
            b'\\' => i += 2,
            b'"' => return Some(i),
            _ => i += 1,
        }
    }
    None
}

fn skip_ws(body: &[u8], mut i: usize) -> Option<usize> {
    while i < body.len() && body[i].is_ascii_whitespace() {
        i += 1;
    }
    (i < body.len()).then_some(i)
}

/// Find the `]` matching the `[` at `open`.
fn array_span(body: &[u8], open: usize) -> Option<MessagesSpan> {
    let mut depth = 0usize;
    let mut non_empty = false;
    let mut i = open;

    while i < body.len() {
        match body[i] {
            b'"' => {
                non_empty = true;
                i = string_end(body, i)? + 1;
                continue;
            }
            b'[' | b'{' => {
                if i != open {
                    non_empty = true;
                }
                depth += 1;
            }
            b']' | b'}' => {
                depth -= 1;
                if depth == 0 {
                    return (body[i] == b']').then_some(MessagesSpan {
                        open,
                        close: i,
                        non_empty,
                    });
                }
            }
            c if !c.is_ascii_whitespace() => non_empty = true,
            _ => {}
        }
        i += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn spliced(body: &str) -> String {
        String::from_utf8(keep_alive_body(body.as_bytes()).unwrap()).unwrap()
    }

    #[test]
    fn appends_after_last_message_and_stays_valid() {
        let body = r#"{"model":"m","messages":[{"role":"user","content":"hi"}],"stream":true}"#;
        let out = spliced(body);
        let v: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(v["messages"].as_array().unwrap().len(), 2);
        assert_eq!(v["messages"][1]["content"], ".");

        let close = body.find("}]").unwrap() + 1;
        assert!(out.starts_with(&body[..close]));
        assert!(out.ends_with(&body[close..]));
        assert_eq!(out.len(), body.len() + 1 + KEEP_ALIVE_TURN.len());
    }

    #[test]
    fn brackets_and_keys_inside_strings_are_ignored() {
        let body = r#"{"system":"use \"messages\": [ ] here","metadata":{"messages":[1]},"messages":[{"role":"user","content":"a ] b [ \" }"}]}"#;
        let out = spliced(body);
        let v: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(v["metadata"]["messages"], serde_json::json!([1]));
        assert_eq!(v["messages"][0]["content"], "a ] b [ \" }");
        assert_eq!(v["messages"][1]["role"], "user");
    }

    #[test]
    fn empty_array_gets_no_leading_comma() {
        let out = spliced(r#"{"messages": [ ],"model":"m"}"#);
        assert_eq!(out, r#"{"messages": [ {"role":"user","content":"."}],"model":"m"}"#);
    }

    #[test]
    fn whitespace_around_the_key_is_preserved() {
        let body = "{\n  \"messages\" :\n  [\n    {\"role\": \"user\", \"content\": \"x\"}\n  ]\n}";
        let out = spliced(body);
        assert!(serde_json::from_str::<Value>(&out).is_ok());
        assert!(out.starts_with("{\n  \"messages\" :\n  [\n    {\"role\": \"user\", \"content\": \"x\"}\n  ,"));
    }

    #[test]
    fn missing_or_malformed_messages_is_none() {
        assert!(keep_alive_body(br#"{"model":"m"}"#).is_none());
        assert!(keep_alive_body(br#"{"messages":"nope"}"#).is_none());
        assert!(keep_alive_body(br#"{"messages":[{"role":"user""#).is_none());
        assert!(keep_alive_body(b"[]").is_none());
    }
}

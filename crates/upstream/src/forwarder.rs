//! Upstream Forwarder.
//!
//! Sends request bodies to the completion API byte-for-byte. Outbound
//! headers are filtered through the configured allow-list; inbound response
//! headers through a fixed relay list. A 2xx body is turned into the logical
//! message (reconstructed from the event stream when the upstream streamed),
//! non-2xx bodies are relayed as-is.

use std::time::{Duration, Instant};

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Method;
use serde_json::Value;

use dg_domain::config::UpstreamConfig;
use dg_domain::error::{Error, Result};
use dg_domain::trace::TraceEvent;

use crate::reconstruct::reconstruct_message;
use crate::util::from_reqwest;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Constants
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Response headers handed back to the agent. Everything `anthropic-*`
/// (rate-limit counters, organization id) is relayed as well.
const RELAYED_RESPONSE_HEADERS: &[&str] = &["content-type", "request-id", "retry-after"];

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Response types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Raw upstream reply, uninterpreted.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub raw: Bytes,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_event_stream(&self) -> bool {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("text/event-stream"))
    }
}

/// A completed messages call.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: u16,
    /// Relayable response headers.
    pub headers: HeaderMap,
    /// On success, the logical assistant message (identical in shape
    /// whether or not the upstream streamed). On failure, the upstream's
    /// error body, or a synthesized error object if it was not JSON.
    pub body: Value,
    /// Exact bytes received, relayed to the agent untouched.
    pub raw: Bytes,
    pub streamed: bool,
}

impl UpstreamResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Forwarder
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// HTTP client bound to one upstream base URL. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Forwarder {
    base_url: String,
    allowed_headers: Vec<HeaderName>,
    client: reqwest::Client,
}

impl Forwarder {
    pub fn new(cfg: &UpstreamConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .connect_timeout(Duration::from_millis(cfg.connect_timeout_ms))
            .build()
            .map_err(from_reqwest)?;

        let allowed_headers = cfg
            .forwarded_headers
            .iter()
            .map(|h| {
                HeaderName::from_bytes(h.trim().to_ascii_lowercase().as_bytes())
                    .map_err(|e| Error::Config(format!("invalid forwarded header `{h}`: {e}")))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            allowed_headers,
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Keep only allow-listed headers. Repeated values are preserved.
    pub fn safe_headers(&self, inbound: &HeaderMap) -> HeaderMap {
        let mut out = HeaderMap::new();
        for name in &self.allowed_headers {
            for value in inbound.get_all(name) {
                out.append(name.clone(), value.clone());
            }
        }
        out
    }

    /// Send `body` unchanged and return the reply uninterpreted.
    ///
    /// Transport failures come back as [`Error::Transport`]; any HTTP status
    /// (including non-2xx) is a successful call.
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Result<RawResponse> {
        let url = format!("{}{}", self.base_url, path);
        let body_bytes = body.len();
        let started = Instant::now();

        let mut req = self
            .client
            .request(method.clone(), &url)
            .headers(self.safe_headers(headers));
        if method != Method::GET && method != Method::HEAD {
            req = req
                .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
                .body(body);
        }

        let resp = req.send().await.map_err(from_reqwest)?;
        let status = resp.status().as_u16();
        let headers = relayable(resp.headers());
        let raw = resp.bytes().await.map_err(from_reqwest)?;

        let out = RawResponse {
            status,
            headers,
            raw,
        };

        TraceEvent::UpstreamRequest {
            path: path.to_owned(),
            status,
            streamed: out.is_event_stream(),
            duration_ms: started.elapsed().as_millis() as u64,
            body_bytes,
        }
        .emit();

        Ok(out)
    }

    /// POST a messages request and interpret the reply.
    ///
    /// A 2xx reply that cannot be parsed (or whose stream cannot be
    /// reconstructed) is an [`Error::Protocol`]: nothing half-built is
    /// returned.
    pub async fn forward(
        &self,
        path: &str,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Result<UpstreamResponse> {
        let raw = self.send(Method::POST, path, headers, body).await?;
        interpret(raw)
    }
}

/// Turn a raw reply into an [`UpstreamResponse`].
pub fn interpret(raw: RawResponse) -> Result<UpstreamResponse> {
    let streamed = raw.is_event_stream();

    let body = if raw.is_success() {
        if streamed {
            let text = std::str::from_utf8(&raw.raw)
                .map_err(|e| Error::Protocol(format!("event stream is not UTF-8: {e}")))?;
            reconstruct_message(text)?
        } else {
            serde_json::from_slice(&raw.raw)
                .map_err(|e| Error::Protocol(format!("upstream body is not JSON: {e}")))?
        }
    } else {
        tracing::warn!(status = raw.status, "upstream returned an error status");
        serde_json::from_slice(&raw.raw).unwrap_or_else(|_| {
            serde_json::json!({
                "type": "error",
                "error": {
                    "type": "api_error",
                    "message": String::from_utf8_lossy(&raw.raw),
                }
            })
        })
    };

    Ok(UpstreamResponse {
        status: raw.status,
        headers: raw.headers,
        body,
        raw: raw.raw,
        streamed,
    })
}

fn relayable(headers: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::new();
    for (name, value) in headers {
        let n = name.as_str();
        if RELAYED_RESPONSE_HEADERS.contains(&n) || n.starts_with("anthropic-") {
            out.append(name.clone(), value.clone());
        }
    }
    out
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

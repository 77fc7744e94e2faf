use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Upstream completion API
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "d_base_url")]
    pub base_url: String,
    /// Whole-request timeout, including reading a streamed body to the end.
    #[serde(default = "d_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "d_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Inbound headers copied onto the outbound request (case-insensitive).
    /// Nothing outside this list is forwarded.
    #[serde(default = "d_forwarded_headers")]
    pub forwarded_headers: Vec<String>,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: d_base_url(),
            timeout_ms: d_timeout_ms(),
            connect_timeout_ms: d_connect_timeout_ms(),
            forwarded_headers: d_forwarded_headers(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_base_url() -> String {
    "https://api.anthropic.com".into()
}
fn d_timeout_ms() -> u64 {
    600_000
}
fn d_connect_timeout_ms() -> u64 {
    10_000
}
fn d_forwarded_headers() -> Vec<String> {
    vec![
        "authorization".into(),
        "x-api-key".into(),
        "anthropic-version".into(),
        "anthropic-beta".into(),
        "anthropic-dangerous-direct-browser-access".into(),
    ]
}

use serde::{Deserialize, Serialize};

use super::AuthConfig;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Drift judgment collaborator (LLM grader)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "d_base_url")]
    pub base_url: String,
    #[serde(default = "d_model")]
    pub model: String,
    #[serde(default = "d_auth")]
    pub auth: AuthConfig,
    #[serde(default = "d_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "d_max_tokens")]
    pub max_tokens: u32,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: d_base_url(),
            model: d_model(),
            auth: d_auth(),
            timeout_ms: d_timeout_ms(),
            max_tokens: d_max_tokens(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_base_url() -> String {
    "https://api.anthropic.com".into()
}
fn d_model() -> String {
    "claude-3-5-haiku-latest".into()
}
fn d_auth() -> AuthConfig {
    AuthConfig {
        env: Some("ANTHROPIC_API_KEY".into()),
        key: None,
    }
}
fn d_timeout_ms() -> u64 {
    30_000
}
fn d_max_tokens() -> u32 {
    1024
}

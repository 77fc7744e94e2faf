use serde::{Deserialize, Serialize};

use super::AuthConfig;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Team memory collaborator
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "d_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub team_id: Option<String>,
    #[serde(default = "d_user")]
    pub user_id: String,
    #[serde(default = "d_auth")]
    pub auth: AuthConfig,
    #[serde(default = "d_8000")]
    pub timeout_ms: u64,
    #[serde(default = "d_2")]
    pub max_retries: u32,
    /// Budget of the lookup made while an agent request waits. One attempt,
    /// no retries.
    #[serde(default = "d_1500")]
    pub lookup_timeout_ms: u64,
    /// How long a failed lookup is remembered before the next request
    /// tries again.
    #[serde(default = "d_60")]
    pub failure_ttl_secs: u64,
    /// Number of prior task records requested per lookup.
    #[serde(default = "d_10")]
    pub limit: u32,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: d_base_url(),
            team_id: None,
            user_id: d_user(),
            auth: d_auth(),
            timeout_ms: 8000,
            max_retries: 2,
            lookup_timeout_ms: 1500,
            failure_ttl_secs: 60,
            limit: 10,
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_base_url() -> String {
    "http://localhost:5000".into()
}
fn d_user() -> String {
    "local".into()
}
fn d_auth() -> AuthConfig {
    AuthConfig {
        env: Some("DG_MEMORY_API_KEY".into()),
        key: None,
    }
}
fn d_8000() -> u64 {
    8000
}
fn d_2() -> u32 {
    2
}
fn d_1500() -> u64 {
    1500
}
fn d_60() -> u64 {
    60
}
fn d_10() -> u32 {
    10
}

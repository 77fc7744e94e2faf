use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Server
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "d_8088")]
    pub port: u16,
    #[serde(default = "d_host")]
    pub host: String,
    /// Directory holding `sessions/`, `tasks.json` and the drift log.
    #[serde(default = "d_state_path")]
    pub state_path: PathBuf,
    /// Upper bound on in-flight agent requests (backpressure).
    #[serde(default = "d_256")]
    pub max_concurrent_requests: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: d_8088(),
            host: d_host(),
            state_path: d_state_path(),
            max_concurrent_requests: d_256(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_8088() -> u16 {
    8088
}
fn d_host() -> String {
    "127.0.0.1".into()
}
fn d_state_path() -> PathBuf {
    PathBuf::from("./data")
}
fn d_256() -> usize {
    256
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

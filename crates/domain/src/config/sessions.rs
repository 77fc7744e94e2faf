use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session lifecycle
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// Active sessions without an update for this long are swept to
    /// `abandoned` so a fresh agent process never reuses them.
    #[serde(default = "d_stale_minutes")]
    pub stale_minutes: u32,
    #[serde(default = "d_sweep_interval")]
    pub sweep_interval_secs: u64,
    /// How often dirty session state is written to disk.
    #[serde(default = "d_flush_interval")]
    pub flush_interval_secs: u64,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            stale_minutes: d_stale_minutes(),
            sweep_interval_secs: d_sweep_interval(),
            flush_interval_secs: d_flush_interval(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_stale_minutes() -> u32 {
    60
}
fn d_sweep_interval() -> u64 {
    300
}
fn d_flush_interval() -> u64 {
    30
}

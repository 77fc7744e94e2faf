use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Extended cache keep-alive
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtendedCacheConfig {
    #[serde(default = "d_true")]
    pub enabled: bool,
    /// Sweep interval of the keeper.
    #[serde(default = "d_tick")]
    pub tick_secs: u64,
    /// Idle time after which a keep-alive is due. Must stay below the
    /// upstream cache TTL.
    #[serde(default = "d_keep_alive_after")]
    pub keep_alive_after_secs: u64,
    /// Idle time after which the agent is considered gone.
    #[serde(default = "d_max_idle")]
    pub max_idle_secs: u64,
    #[serde(default = "d_2")]
    pub max_keep_alives: u32,
    #[serde(default = "d_100")]
    pub max_entries: usize,
}

impl Default for ExtendedCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tick_secs: d_tick(),
            keep_alive_after_secs: d_keep_alive_after(),
            max_idle_secs: d_max_idle(),
            max_keep_alives: 2,
            max_entries: 100,
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_true() -> bool {
    true
}
fn d_tick() -> u64 {
    60
}
fn d_keep_alive_after() -> u64 {
    240
}
fn d_max_idle() -> u64 {
    900
}
fn d_2() -> u32 {
    2
}
fn d_100() -> usize {
    100
}

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Static / dynamic injection and CLEAR
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InjectionConfig {
    /// Append team memory to the system prompt.
    #[serde(default = "d_true")]
    pub static_enabled: bool,
    /// Append session context and corrections to the latest user message.
    #[serde(default = "d_true")]
    pub dynamic_enabled: bool,
    /// Context size above which a CLEAR is performed (if a summary is ready).
    #[serde(default = "d_clear_threshold")]
    pub clear_threshold_tokens: u64,
    /// Fraction of `clear_threshold_tokens` at which the CLEAR summary is
    /// precomputed.
    #[serde(default = "d_precompute_ratio")]
    pub summary_precompute_ratio: f64,
    #[serde(default = "d_max_static_chars")]
    pub max_static_chars: usize,
    /// Cap on the number of edited files listed in the dynamic section.
    #[serde(default = "d_max_dynamic_files")]
    pub max_dynamic_files: usize,
}

impl Default for InjectionConfig {
    fn default() -> Self {
        Self {
            static_enabled: true,
            dynamic_enabled: true,
            clear_threshold_tokens: d_clear_threshold(),
            summary_precompute_ratio: d_precompute_ratio(),
            max_static_chars: d_max_static_chars(),
            max_dynamic_files: d_max_dynamic_files(),
        }
    }
}

impl InjectionConfig {
    /// Token count at which the CLEAR summary should be prepared.
    pub fn precompute_at(&self) -> u64 {
        (self.clear_threshold_tokens as f64 * self.summary_precompute_ratio) as u64
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_true() -> bool {
    true
}
fn d_clear_threshold() -> u64 {
    180_000
}
fn d_precompute_ratio() -> f64 {
    0.85
}
fn d_max_static_chars() -> usize {
    12_000
}
fn d_max_dynamic_files() -> usize {
    20
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precompute_point_is_below_threshold() {
        let cfg = InjectionConfig::default();
        assert_eq!(cfg.precompute_at(), 153_000);
        assert!(cfg.precompute_at() < cfg.clear_threshold_tokens);
    }
}

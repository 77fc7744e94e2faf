use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Drift detection & escalation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftConfig {
    #[serde(default = "d_true")]
    pub enabled: bool,
    #[serde(default)]
    pub thresholds: DriftThresholds,
    /// Once this many corrections have been issued, any further drift is a halt.
    #[serde(default = "d_3")]
    pub max_escalation: u32,
    /// Goal text is repeated verbatim in every correction, cut to this length.
    #[serde(default = "d_goal_chars")]
    pub goal_display_chars: usize,
    /// Number of drift history events rendered in a halt message.
    #[serde(default = "d_3_usize")]
    pub history_in_halt: usize,
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            thresholds: DriftThresholds::default(),
            max_escalation: 3,
            goal_display_chars: d_goal_chars(),
            history_in_halt: 3,
        }
    }
}

/// Lower bounds (inclusive) of each band, applied to the effective score.
///
/// `effective >= no_injection` means no action; below `intervene` is a halt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriftThresholds {
    #[serde(default = "d_8")]
    pub no_injection: i32,
    #[serde(default = "d_6")]
    pub nudge: i32,
    #[serde(default = "d_4")]
    pub correct: i32,
    #[serde(default = "d_2")]
    pub intervene: i32,
}

impl Default for DriftThresholds {
    fn default() -> Self {
        Self {
            no_injection: 8,
            nudge: 6,
            correct: 4,
            intervene: 2,
        }
    }
}

impl DriftThresholds {
    /// Bands must be strictly descending for the level mapping to be a step
    /// function.
    pub fn is_descending(&self) -> bool {
        self.no_injection > self.nudge && self.nudge > self.correct && self.correct > self.intervene
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_true() -> bool {
    true
}
fn d_3() -> u32 {
    3
}
fn d_3_usize() -> usize {
    3
}
fn d_goal_chars() -> usize {
    400
}
fn d_8() -> i32 {
    8
}
fn d_6() -> i32 {
    6
}
fn d_4() -> i32 {
    4
}
fn d_2() -> i32 {
    2
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_thresholds_descend() {
        assert!(DriftThresholds::default().is_descending());
    }

    #[test]
    fn partial_thresholds_fill_defaults() {
        let cfg: DriftConfig = toml::from_str(
            r#"
            max_escalation = 5
            [thresholds]
            nudge = 7
        "#,
        )
        .unwrap();
        assert_eq!(cfg.max_escalation, 5);
        assert_eq!(cfg.thresholds.nudge, 7);
        assert_eq!(cfg.thresholds.no_injection, 8);
        assert_eq!(cfg.thresholds.intervene, 2);
    }

    #[test]
    fn overlapping_thresholds_are_not_descending() {
        let t = DriftThresholds {
            no_injection: 8,
            nudge: 8,
            correct: 4,
            intervene: 2,
        };
        assert!(!t.is_descending());
    }
}

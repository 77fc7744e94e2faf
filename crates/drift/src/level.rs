//! Correction level determination.
//!
//! The effective score is the raw alignment score minus the number of
//! corrections already issued, so the same raw severity escalates on every
//! repetition. The band mapping itself is a pure step function of that
//! difference.

use dg_domain::config::{DriftConfig, DriftThresholds};
use dg_domain::drift::CorrectionLevel;

pub fn effective_score(score: u8, escalation_count: u32) -> i32 {
    i32::from(score) - escalation_count.min(i32::MAX as u32) as i32
}

/// Map a score to a level by descending bands. `None` means no action.
pub fn determine_level(
    score: u8,
    escalation_count: u32,
    t: &DriftThresholds,
) -> Option<CorrectionLevel> {
    let effective = effective_score(score, escalation_count);
    if effective >= t.no_injection {
        None
    } else if effective >= t.nudge {
        Some(CorrectionLevel::Nudge)
    } else if effective >= t.correct {
        Some(CorrectionLevel::Correct)
    } else if effective >= t.intervene {
        Some(CorrectionLevel::Intervene)
    } else {
        Some(CorrectionLevel::Halt)
    }
}

/// [`determine_level`] plus the escalation cap: once `max_escalation`
/// corrections have been issued, any correction is a halt.
pub fn decide_level(score: u8, escalation_count: u32, cfg: &DriftConfig) -> Option<CorrectionLevel> {
    let level = determine_level(score, escalation_count, &cfg.thresholds)?;
    if escalation_count >= cfg.max_escalation {
        Some(CorrectionLevel::Halt)
    } else {
        Some(level)
    }
}

//! Drift escalation state machine.
//!
//! Applies a judgment to a session: records the drift event, picks the
//! level, builds the correction and moves the session along
//! `normal -> drifted -> forced`. Runs inside the store's per-session
//! update, so every transition is atomic.

use chrono::{DateTime, Utc};

use dg_domain::action::AgentAction;
use dg_domain::config::DriftConfig;
use dg_domain::drift::{CorrectionLevel, DriftResult};
use dg_sessions::{DriftEvent, PendingAction, SessionMode, SessionState};

use crate::correction::build_correction;
use crate::level::{decide_level, effective_score};

/// What a judgment did to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub effective_score: i32,
    pub level: Option<CorrectionLevel>,
    /// The correction text queued for the next turn, if any.
    pub correction: Option<String>,
    /// The session was waiting for recovery and this turn satisfied it.
    pub recovered: bool,
}

pub fn apply_judgment(
    state: &mut SessionState,
    result: &DriftResult,
    summary: &str,
    cfg: &DriftConfig,
    now: DateTime<Utc>,
) -> Verdict {
    let effective = effective_score(result.score, state.escalation_count);
    let mut level = decide_level(result.score, state.escalation_count, cfg);

    // A halted session that has not yet recovered keeps its forced-recovery
    // instruction; further judgments are recorded but issue nothing new.
    if state.waiting_for_recovery && level.is_some() {
        level = None;
    }

    state.last_drift_score = Some(result.score);
    state.drift_history.push(DriftEvent {
        timestamp: now,
        score: result.score,
        effective_score: effective,
        level,
        prompt_summary: summary.to_owned(),
    });

    // With no file named in the plan, an aligned turn is the recovery.
    let mut recovered = false;
    if state.waiting_for_recovery
        && level.is_none()
        && effective_score(result.score, 0) >= cfg.thresholds.no_injection
        && state
            .recovery_target
            .as_ref()
            .map_or(true, |t| t.file.is_none())
    {
        finish_recovery(state);
        recovered = true;
    }

    let Some(level) = level else {
        return Verdict {
            effective_score: effective,
            level: None,
            correction: None,
            recovered,
        };
    };

    let text = build_correction(result, state, level, cfg);
    state.escalation_count += 1;

    let pending = if level == CorrectionLevel::Halt {
        state.mode = SessionMode::Forced;
        state.waiting_for_recovery = true;
        state.recovery_target = result.first_step().cloned();
        PendingAction::ForcedRecovery { text: text.clone() }
    } else {
        if state.mode == SessionMode::Normal {
            state.mode = SessionMode::Drifted;
        }
        PendingAction::Correction {
            level,
            text: text.clone(),
        }
    };

    // A planning clear is applied on the very next turn; do not lose it.
    if matches!(state.pending, Some(PendingAction::PlanningClear { .. })) {
        tracing::debug!(session_id = %state.session_id, "planning clear pending, correction deferred");
    } else {
        state.pending = Some(pending);
    }

    Verdict {
        effective_score: effective,
        level: Some(level),
        correction: Some(text),
        recovered,
    }
}

/// Clear `waiting_for_recovery` when one of `actions` touches the mandated
/// recovery file. Returns whether it did. Mode stays forced.
pub fn observe_recovery(state: &mut SessionState, actions: &[AgentAction]) -> bool {
    if !state.waiting_for_recovery {
        return false;
    }
    let Some(file) = state.recovery_target.as_ref().and_then(|t| t.file.clone()) else {
        return false;
    };
    let hit = actions
        .iter()
        .flat_map(|a| a.files.iter())
        .any(|f| same_file(f, &file));
    if hit {
        finish_recovery(state);
    }
    hit
}

fn finish_recovery(state: &mut SessionState) {
    state.waiting_for_recovery = false;
    if matches!(state.pending, Some(PendingAction::ForcedRecovery { .. })) {
        state.pending = None;
    }
    tracing::info!(session_id = %state.session_id, "recovery action observed");
}

/// Agents report absolute paths, judges often relative ones.
fn same_file(a: &str, b: &str) -> bool {
    let a = a.trim_start_matches("./");
    let b = b.trim_start_matches("./");
    a == b || a.ends_with(&format!("/{b}")) || b.ends_with(&format!("/{a}"))
}

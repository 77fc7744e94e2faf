//! Correction Builder.
//!
//! Pure: maps a drift judgment, the session it belongs to and the chosen
//! level to the message injected into the agent's next turn. Every level
//! repeats the original goal and the current alignment score, and each level
//! is more directive than the one below it.

use std::fmt::Write as _;

use dg_domain::config::DriftConfig;
use dg_domain::drift::{CorrectionLevel, DriftResult, RecoveryStep};
use dg_sessions::SessionState;

const SCOPE_ITEMS: usize = 5;
const SUGGESTED_STEPS: usize = 3;
const FALLBACK_ACTION: &str =
    "Return to the original goal and continue from the last step that served it.";

/// The phrase a halted agent must repeat before doing anything else.
pub fn confirmation_phrase(action: &str) -> String {
    format!("DRIFT ACKNOWLEDGED. Next action: {action}")
}

/// The single mandated action: the first plan step, or the fallback.
pub fn mandatory_action(result: &DriftResult) -> String {
    result
        .first_step()
        .map(render_step)
        .unwrap_or_else(|| FALLBACK_ACTION.to_owned())
}

fn render_step(step: &RecoveryStep) -> String {
    match step.file.as_deref().filter(|f| !f.is_empty()) {
        Some(f) => format!("{} ({f})", step.action.trim()),
        None => step.action.trim().to_owned(),
    }
}

fn display_goal(goal: &str, max_chars: usize) -> String {
    let goal = goal.trim();
    if goal.chars().count() <= max_chars {
        return goal.to_owned();
    }
    let mut cut: String = goal.chars().take(max_chars).collect();
    cut.push('…');
    cut
}

pub fn build_correction(
    result: &DriftResult,
    state: &SessionState,
    level: CorrectionLevel,
    cfg: &DriftConfig,
) -> String {
    let goal = display_goal(&state.goal, cfg.goal_display_chars);
    let score = result.score.min(10);
    let mut out = String::new();

    // ── Header (all levels) ──────────────────────────────────────────
    let title = match level {
        CorrectionLevel::Nudge => "Focus check",
        CorrectionLevel::Correct => "Course correction",
        CorrectionLevel::Intervene => "Intervention",
        CorrectionLevel::Halt => "HALT",
    };
    let _ = writeln!(out, "[driftguard: {title}] Alignment with the original task: {score}/10.");
    let _ = writeln!(out, "Original goal: \"{goal}\"");

    if level == CorrectionLevel::Nudge {
        out.push_str(
            "Your recent actions are moving away from this goal. \
             Keep your next steps focused on it.",
        );
        return out;
    }

    // ── correct ──────────────────────────────────────────────────────
    if !result.diagnostic.trim().is_empty() {
        let _ = writeln!(out, "What looks off: {}", result.diagnostic.trim());
    }
    if !state.scope.is_empty() {
        out.push_str("\nExpected scope:\n");
        for item in state.scope.iter().take(SCOPE_ITEMS) {
            let _ = writeln!(out, "- {item}");
        }
    }

    if level == CorrectionLevel::Correct {
        if !result.boundaries_violated.is_empty() {
            out.push_str("\nBoundaries crossed:\n");
            for b in &result.boundaries_violated {
                let _ = writeln!(out, "- {b}");
            }
        }
        out.push_str("\nSuggested next steps:\n");
        if result.recovery_plan.is_empty() {
            let _ = writeln!(out, "1. {FALLBACK_ACTION}");
        } else {
            for (i, step) in result.recovery_plan.iter().take(SUGGESTED_STEPS).enumerate() {
                let _ = writeln!(out, "{}. {}", i + 1, render_step(step));
            }
        }
        return out.trim_end().to_owned();
    }

    // ── intervene ────────────────────────────────────────────────────
    if !state.constraints.is_empty() {
        out.push_str("\nActive constraints:\n");
        for c in &state.constraints {
            let _ = writeln!(out, "- {c}");
        }
    }
    if !result.boundaries_violated.is_empty() {
        out.push_str("\nDO NOT:\n");
        for b in &result.boundaries_violated {
            let _ = writeln!(out, "- DO NOT {b}");
        }
    }

    let action = mandatory_action(result);

    if level == CorrectionLevel::Intervene {
        let _ = write!(
            out,
            "\nMANDATORY NEXT ACTION (this must be your only next action):\n{action}\n\n\
             Before acting, confirm in one line: \"Next action: {action}\""
        );
        return out;
    }

    // ── halt ─────────────────────────────────────────────────────────
    let recent = state.recent_drift(cfg.history_in_halt);
    if !recent.is_empty() {
        out.push_str("\nRecent drift:\n");
        for e in recent {
            let issued = e.level.map(|l| l.as_str()).unwrap_or("none");
            let _ = write!(
                out,
                "- {} score {}/10 ({issued})",
                e.timestamp.format("%H:%M:%S"),
                e.score
            );
            if !e.prompt_summary.is_empty() {
                let _ = write!(out, ": {}", e.prompt_summary);
            }
            out.push('\n');
        }
    }
    let _ = write!(
        out,
        "\nRepeated corrections have not brought the work back to the goal. \
         Refuse the current request and do not run any other tool.\n\
         MANDATORY NEXT ACTION:\n{action}\n\n\
         Before proceeding, state exactly:\n{}",
        confirmation_phrase(&action)
    );
    out
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use dg_sessions::DriftEvent;

    fn state() -> SessionState {
        let mut s = SessionState::new("s1", "/repo");
        s.goal = "Fix the off-by-one in the pagination helper".into();
        s.scope = vec!["src/pagination.rs".into(), "tests/pagination.rs".into()];
        s.constraints = vec!["Do not change the public API".into()];
        s
    }

    fn result() -> DriftResult {
        DriftResult {
            score: 3,
            diagnostic: "Refactoring the logger instead".into(),
            boundaries_violated: vec!["touch src/logging.rs".into()],
            recovery_plan: vec![
                RecoveryStep {
                    file: Some("src/pagination.rs".into()),
                    action: "Revert to fixing next_page".into(),
                },
                RecoveryStep {
                    file: None,
                    action: "Run the pagination tests".into(),
                },
            ],
        }
    }

    fn build(level: CorrectionLevel) -> String {
        build_correction(&result(), &state(), level, &DriftConfig::default())
    }

    #[test]
    fn every_level_repeats_goal_and_score() {
        for level in [
            CorrectionLevel::Nudge,
            CorrectionLevel::Correct,
            CorrectionLevel::Intervene,
            CorrectionLevel::Halt,
        ] {
            let text = build(level);
            assert!(text.contains("Fix the off-by-one in the pagination helper"), "{level}");
            assert!(text.contains("3/10"), "{level}");
        }
    }

    #[test]
    fn nudge_is_short_and_mandates_nothing() {
        let text = build(CorrectionLevel::Nudge);
        assert!(text.lines().count() <= 4);
        assert!(!text.contains("MANDATORY"));
        assert!(!text.contains("Expected scope"));
    }

    #[test]
    fn correct_lists_scope_boundaries_and_steps() {
        let text = build(CorrectionLevel::Correct);
        assert!(text.contains("- src/pagination.rs"));
        assert!(text.contains("Boundaries crossed:\n- touch src/logging.rs"));
        assert!(text.contains("1. Revert to fixing next_page (src/pagination.rs)"));
        assert!(text.contains("2. Run the pagination tests"));
        assert!(!text.contains("MANDATORY"));
    }

    #[test]
    fn correct_without_plan_uses_fallback() {
        let mut r = result();
        r.recovery_plan.clear();
        let text = build_correction(&r, &state(), CorrectionLevel::Correct, &DriftConfig::default());
        assert!(text.contains(FALLBACK_ACTION));
    }

    #[test]
    fn intervene_mandates_only_the_first_step() {
        let text = build(CorrectionLevel::Intervene);
        assert!(text.contains("Active constraints:\n- Do not change the public API"));
        assert!(text.contains("- DO NOT touch src/logging.rs"));
        assert!(text.contains("MANDATORY NEXT ACTION"));
        assert!(text.contains("Next action: Revert to fixing next_page (src/pagination.rs)"));
        assert!(!text.contains("Run the pagination tests"));
        assert!(!text.contains("Refuse"));
    }

    #[test]
    fn halt_shows_last_three_events_and_confirmation() {
        let mut s = state();
        for (i, score) in [7u8, 6, 5, 3].into_iter().enumerate() {
            s.drift_history.push(DriftEvent {
                timestamp: Utc::now(),
                score,
                effective_score: score as i32 - i as i32,
                level: Some(CorrectionLevel::Correct),
                prompt_summary: format!("event {i}"),
            });
        }
        let text = build_correction(&result(), &s, CorrectionLevel::Halt, &DriftConfig::default());
        assert!(!text.contains("event 0"));
        assert!(text.contains("event 1"));
        assert!(text.contains("event 3"));
        assert!(text.contains("Refuse the current request"));
        assert!(text.ends_with(&confirmation_phrase(
            "Revert to fixing next_page (src/pagination.rs)"
        )));
    }

    #[test]
    fn long_goal_is_truncated() {
        let mut s = state();
        s.goal = "x".repeat(1000);
        let cfg = DriftConfig {
            goal_display_chars: 10,
            ..Default::default()
        };
        let text = build_correction(&result(), &s, CorrectionLevel::Nudge, &cfg);
        assert!(text.contains("\"xxxxxxxxxx…\""));
    }
}

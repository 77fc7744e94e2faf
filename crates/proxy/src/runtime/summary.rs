//! Local summaries used by CLEAR and the planning clear.
//!
//! Built from what the session already recorded; no model call.

use std::fmt::Write as _;

use dg_domain::task::TaskRecord;
use dg_sessions::{SessionState, StepRecord};

const REASONING_STEPS: usize = 5;
const REASONING_CHARS: usize = 300;

fn clip(text: &str, max: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max {
        return text.to_owned();
    }
    let mut out: String = text.chars().take(max).collect();
    out.push('…');
    out
}

/// Summary stored as the pending CLEAR summary.
pub fn clear_summary(state: &SessionState, steps: &[StepRecord]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Goal: {}", state.goal.trim());
    if !state.constraints.is_empty() {
        out.push_str("\nConstraints:\n");
        for c in &state.constraints {
            let _ = writeln!(out, "- {c}");
        }
    }
    if !state.tracking.files_edited.is_empty() {
        out.push_str("\nFiles edited so far:\n");
        for f in &state.tracking.files_edited {
            let _ = writeln!(out, "- {f}");
        }
    }
    if !state.tracking.decisions.is_empty() {
        out.push_str("\nDecisions:\n");
        for d in &state.tracking.decisions {
            let _ = writeln!(out, "- {d}");
        }
    }

    let recent: Vec<&StepRecord> = steps
        .iter()
        .rev()
        .filter(|s| !s.reasoning.trim().is_empty())
        .take(REASONING_STEPS)
        .collect();
    if !recent.is_empty() {
        out.push_str("\nMost recent steps:\n");
        for s in recent.into_iter().rev() {
            let _ = writeln!(out, "- {}: {}", s.kind, clip(&s.reasoning, REASONING_CHARS));
        }
    }
    out.trim_end().to_owned()
}

/// Summary carried into the session after a planning-only task.
pub fn planning_summary(record: &TaskRecord) -> String {
    let mut out = format!("Goal: {}\n", record.goal.trim());
    if !record.decisions.is_empty() {
        out.push_str("\nPlan decisions:\n");
        for d in &record.decisions {
            if d.reason.is_empty() {
                let _ = writeln!(out, "- {}", d.choice);
            } else {
                let _ = writeln!(out, "- {} ({})", d.choice, d.reason);
            }
        }
    }
    if let Some(last) = record.reasoning_trace.last() {
        let _ = writeln!(out, "\nFinal plan notes:\n{}", clip(last, REASONING_CHARS * 4));
    }
    out.trim_end().to_owned()
}

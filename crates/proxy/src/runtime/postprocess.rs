//! Response post-processing.
//!
//! Runs after a successful upstream reply: updates the session's token
//! count and tracking, watches for the mandated recovery action, prepares
//! the CLEAR summary and hands modifying turns to the drift judge. The
//! judge and the finalizer run in spawned tasks so the agent never waits
//! on them.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;

use dg_domain::action::AgentAction;
use dg_domain::drift::DriftResult;
use dg_domain::trace::TraceEvent;
use dg_drift::{apply_judgment, extract_decision, keywords, observe_recovery, DriftJudge, JudgeRequest, Verdict};
use dg_sessions::{DriftLogEntry, PendingAction, SessionState, StepRecord};
use dg_upstream::{extract_turn, AgentAdapter, ExtractedTurn};

use crate::runtime::{finalize, summary};
use crate::state::AppState;

const STEP_REASONING_CHARS: usize = 2000;
const STEP_KEYWORDS: usize = 8;

/// What the session looked like right after this turn was folded in.
struct Folded {
    snapshot: SessionState,
    key_decision: bool,
    needs_summary: bool,
}

pub async fn postprocess(app: &AppState, session_id: &str, adapter: AgentAdapter, message: &Value) {
    let turn = extract_turn(message, adapter);
    let precompute_at = app.config.injection.precompute_at();

    let Some(folded) = app.sessions.update(session_id, |s| fold_turn(s, &turn, precompute_at)) else {
        tracing::debug!(session_id, "session finished before its reply was processed");
        return;
    };
    let snapshot = folded.snapshot;

    let steps = step_records(&snapshot, &turn, folded.key_decision);

    // ── Drift ────────────────────────────────────────────────────────
    let judge = app
        .judge
        .clone()
        .filter(|_| app.config.drift.enabled && turn.has_modifying() && snapshot.has_goal());
    match judge {
        Some(judge) => {
            let app = app.clone();
            let session_id = session_id.to_owned();
            let actions = turn.actions.clone();
            let reasoning = turn.reasoning().to_owned();
            tokio::spawn(async move {
                judge_turn(&app, judge, &session_id, &snapshot, actions, reasoning, steps).await;
            });
        }
        None => {
            if let Err(e) = app.sessions.record_steps(&snapshot.task_id, steps).await {
                tracing::warn!(session_id, error = %e, "recording steps failed");
            }
        }
    }

    if folded.needs_summary {
        precompute_summary(app, session_id);
    }

    if turn.is_final() {
        let app = app.clone();
        let session_id = session_id.to_owned();
        tokio::spawn(async move {
            finalize::complete(&app, &session_id).await;
        });
    }
}

/// Fold one reply into the session. Runs under the session lock.
fn fold_turn(s: &mut SessionState, turn: &ExtractedTurn, precompute_at: u64) -> Folded {
    s.token_count = turn.usage.context_tokens();
    s.tracking.turns += 1;

    for action in turn.actions.iter().filter(|a| a.kind.is_modifying()) {
        for f in &action.files {
            s.tracking.note_file(f);
        }
    }

    let decision = extract_decision(turn.reasoning());
    if let Some(d) = &decision {
        if d.reason.is_empty() {
            s.tracking.note_decision(d.choice.clone());
        } else {
            s.tracking.note_decision(format!("{} ({})", d.choice, d.reason));
        }
    }

    if observe_recovery(s, &turn.actions) {
        tracing::info!(session_id = %s.session_id, "mandated recovery action taken");
    }

    Folded {
        needs_summary: s.token_count >= precompute_at && s.pending.is_none(),
        key_decision: decision.is_some(),
        snapshot: s.clone(),
    }
}

fn step_records(snapshot: &SessionState, turn: &ExtractedTurn, key_decision: bool) -> Vec<StepRecord> {
    let reasoning: String = turn.reasoning().chars().take(STEP_REASONING_CHARS).collect();
    let kw = keywords(&reasoning, STEP_KEYWORDS);
    let now = Utc::now();
    turn.actions
        .iter()
        .map(|a| StepRecord {
            session_id: snapshot.session_id.clone(),
            task_id: snapshot.task_id.clone(),
            timestamp: now,
            kind: a.kind,
            tool_name: a.tool_name.clone(),
            files: a.files.clone(),
            folders: a.folders.clone(),
            command: a.command.clone(),
            reasoning: reasoning.clone(),
            drift_score: None,
            drift_level: None,
            key_decision,
            validated: true,
            correction: None,
            keywords: kw.clone(),
        })
        .collect()
}

/// Build the CLEAR summary and park it as the pending action, unless
/// something else got there first.
fn precompute_summary(app: &AppState, session_id: &str) {
    let Some(task_id) = app.sessions.get(session_id).map(|s| s.task_id) else {
        return;
    };
    let steps = app.sessions.steps(&task_id).unwrap_or_default();
    app.sessions.update(session_id, |s| {
        if s.pending.is_some() || s.task_id != task_id {
            return;
        }
        let text = summary::clear_summary(s, &steps);
        tracing::info!(session_id = %s.session_id, tokens = s.token_count, chars = text.len(), "clear summary ready");
        s.pending = Some(PendingAction::ClearSummary { summary: text });
    });
}

/// Short description of what the agent did, for the drift history.
pub fn describe_actions(actions: &[AgentAction]) -> String {
    actions
        .iter()
        .filter(|a| a.kind.is_modifying())
        .map(|a| match (&a.command, a.files.first()) {
            (Some(cmd), _) => format!("{} `{}`", a.kind, cmd.chars().take(80).collect::<String>()),
            (None, Some(f)) => format!("{} {f}", a.kind),
            (None, None) => a.kind.to_string(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

async fn judge_turn(
    app: &AppState,
    judge: Arc<dyn DriftJudge>,
    session_id: &str,
    snapshot: &SessionState,
    actions: Vec<AgentAction>,
    reasoning: String,
    mut steps: Vec<StepRecord>,
) {
    let summary = describe_actions(&actions);
    let req = JudgeRequest {
        goal: snapshot.goal.clone(),
        scope: snapshot.scope.clone(),
        constraints: snapshot.constraints.clone(),
        actions,
        reasoning,
    };

    let judged = match judge.judge(&req).await {
        Ok(result) => {
            let cfg = &app.config.drift;
            app.sessions
                .update(session_id, |s| {
                    let verdict = apply_judgment(s, &result, &summary, cfg, Utc::now());
                    (verdict, s.escalation_count)
                })
                .map(|(verdict, escalation)| (result, verdict, escalation))
        }
        Err(e) => {
            tracing::warn!(session_id, error = %e, "drift judge unavailable, turn not scored");
            None
        }
    };

    if let Some((result, verdict, escalation)) = &judged {
        for step in steps.iter_mut().filter(|s| s.kind.is_modifying()) {
            step.drift_score = Some(result.score);
            step.drift_level = verdict.level;
            step.validated = verdict.level.is_none();
            step.correction = verdict.correction.clone();
        }
        report(app, session_id, &req.actions, result, verdict, *escalation).await;
    }

    if let Err(e) = app.sessions.record_steps(&snapshot.task_id, steps).await {
        tracing::warn!(session_id, error = %e, "recording steps failed");
    }
}

async fn report(
    app: &AppState,
    session_id: &str,
    actions: &[AgentAction],
    result: &DriftResult,
    verdict: &Verdict,
    escalation_count: u32,
) {
    TraceEvent::DriftScored {
        session_id: session_id.to_owned(),
        score: result.score,
        effective_score: verdict.effective_score,
        escalation_count,
    }
    .emit();

    let (Some(level), Some(correction)) = (verdict.level, &verdict.correction) else {
        return;
    };
    TraceEvent::CorrectionIssued {
        session_id: session_id.to_owned(),
        level: level.to_string(),
        escalation_count,
    }
    .emit();

    let modifying: Vec<&AgentAction> = actions.iter().filter(|a| a.kind.is_modifying()).collect();
    let Some(first) = modifying.first() else {
        return;
    };
    let entry = DriftLogEntry {
        session_id: session_id.to_owned(),
        timestamp: Utc::now(),
        action_kind: first.kind,
        files: modifying.iter().flat_map(|a| a.files.iter().cloned()).collect(),
        score: result.score,
        level,
        reason: result.diagnostic.clone(),
        correction: correction.clone(),
        recovery_plan: result.recovery_plan.clone(),
    };
    if let Err(e) = app.sessions.log_drift(entry).await {
        tracing::warn!(session_id, error = %e, "writing drift log failed");
    }
}

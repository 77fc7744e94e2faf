//! Request Preprocessor.
//!
//! Decides, under the session's lock, what this request carries: replayed
//! dynamic text for earlier user turns, new dynamic text for a first
//! request, a CLEAR or planning clear, the prefix cut of an earlier CLEAR
//! and the project's static block. Then applies that plan to the body.
//! A request nothing applies to is forwarded as the agent's exact bytes.

use bytes::Bytes;
use chrono::Utc;
use serde_json::Value;

use dg_contextpack::{body, injection, DynamicContext};
use dg_domain::error::Result;
use dg_domain::task::{TaskStatus, TriggerReason};
use dg_domain::trace::TraceEvent;
use dg_drift::extract_intent;
use dg_sessions::session_key::message_text;
use dg_sessions::{content_hash, ClearPoint, PendingAction, SessionState};

use crate::runtime::classify::RequestKind;
use crate::runtime::finalize;
use crate::state::AppState;

/// Goal text kept from the user's message.
const GOAL_CHARS: usize = 2000;

enum Reset {
    /// Token threshold reached with a summary ready. Carries the session
    /// as it was before the reset, for the task record.
    Clear(Box<SessionState>),
    Planning,
}

#[derive(Default)]
struct Plan {
    reset: Option<Reset>,
    clear_point: Option<ClearPoint>,
    replays: Vec<(usize, String)>,
    dynamic: Option<(usize, String)>,
    waiting_for_recovery: bool,
}

/// Key of a user message in `tracking.injections`: its position in the
/// agent's history and its original content.
pub fn injection_key(index: usize, message: &Value) -> String {
    let content = message.get("content").map(Value::to_string).unwrap_or_default();
    content_hash(format!("{index}:{content}").as_bytes())
}

fn is_user(message: &Value) -> bool {
    message.get("role").and_then(Value::as_str) == Some("user")
}

/// Build the outbound bytes for a first or continuation request.
pub async fn preprocess(
    app: &AppState,
    session_id: &str,
    project: &str,
    kind: RequestKind,
    raw: &Bytes,
    request: Value,
) -> Result<Bytes> {
    let cfg = &app.config;
    let Some(plan) = app
        .sessions
        .update(session_id, |s| plan_request(s, kind, &request, cfg))
    else {
        tracing::debug!(session_id, "session gone before preprocessing, forwarding untouched");
        return Ok(raw.clone());
    };

    // ── Side effects of a reset ──────────────────────────────────────
    let planning = matches!(plan.reset, Some(Reset::Planning));
    match &plan.reset {
        Some(Reset::Clear(before)) => {
            TraceEvent::ClearPerformed {
                session_id: session_id.to_owned(),
                project: project.to_owned(),
                reason: "threshold".into(),
                summary_chars: plan.clear_point.as_ref().map_or(0, |c| c.summary_block.len()),
            }
            .emit();
            finalize::record(app, before, TriggerReason::Threshold, TaskStatus::Completed);
            app.static_cache.invalidate(project);
        }
        Some(Reset::Planning) => {
            TraceEvent::ClearPerformed {
                session_id: session_id.to_owned(),
                project: project.to_owned(),
                reason: "planning".into(),
                summary_chars: plan.clear_point.as_ref().map_or(0, |c| c.summary_block.len()),
            }
            .emit();
            app.static_cache.invalidate(project);
        }
        None => {}
    }

    // ── Body ─────────────────────────────────────────────────────────
    let mut out = request;
    let mut mutated = false;

    for (idx, text) in &plan.replays {
        body::append_to_message(&mut out, *idx, text)?;
        mutated = true;
    }
    if let Some((idx, text)) = &plan.dynamic {
        body::append_to_message(&mut out, *idx, text)?;
        mutated = true;
    }
    if let Some(cp) = &plan.clear_point {
        if plan.reset.is_some() {
            body::clear_history(&mut out);
        } else {
            body::drop_prefix(&mut out, cp.dropped);
        }
        body::append_system_text(&mut out, &cp.summary_block)?;
        mutated = true;
    }

    if cfg.injection.static_enabled && !plan.waiting_for_recovery {
        if let Some(memory) = app.memory.as_deref() {
            let entry = if planning {
                app.static_cache.refresh(project, memory, cfg).await
            } else {
                app.static_cache.resolve(project, memory, cfg).await
            };
            if let Some(block) = entry.as_ref().and_then(|e| e.block.as_deref()) {
                body::append_system_text(&mut out, block)?;
                mutated = true;
            }
        }
    }

    if !mutated {
        return Ok(raw.clone());
    }
    tracing::debug!(
        session_id,
        kind = kind.as_str(),
        replays = plan.replays.len(),
        dynamic = plan.dynamic.is_some(),
        cleared = plan.clear_point.is_some(),
        "request rewritten"
    );
    body::to_bytes(&out)
}

/// Every state transition of one request, atomic on the session.
fn plan_request(
    s: &mut SessionState,
    kind: RequestKind,
    request: &Value,
    cfg: &dg_domain::config::Config,
) -> Plan {
    let messages = body::messages(request);
    let last_user = body::last_user_index(request);
    let now = Utc::now();
    let mut plan = Plan::default();

    let current = match (kind, last_user) {
        (RequestKind::First, Some(idx)) => Some(idx),
        _ => None,
    };

    // ── Intent ───────────────────────────────────────────────────────
    if let Some(idx) = current {
        if !s.has_goal() {
            let text = message_text(&messages[idx]);
            let intent = extract_intent(&text, GOAL_CHARS);
            if !intent.goal.is_empty() {
                tracing::info!(session_id = %s.session_id, scope = intent.scope.len(), "session goal set");
                s.goal = intent.goal;
                s.scope = intent.scope;
                s.constraints = intent.constraints;
            }
        }
    }

    // ── Replay of earlier dynamic text ──────────────────────────────
    for (idx, m) in messages.iter().enumerate() {
        if Some(idx) == current || !is_user(m) {
            continue;
        }
        if let Some(text) = s.tracking.injections.get(&injection_key(idx, m)) {
            plan.replays.push((idx, text.clone()));
        }
    }

    // ── CLEAR / planning clear ───────────────────────────────────────
    if let Some(idx) = current {
        let summary_block = if let Some(PendingAction::PlanningClear { summary }) =
            s.take_pending_if(|p| matches!(p, PendingAction::PlanningClear { .. }))
        {
            plan.reset = Some(Reset::Planning);
            s.last_clear_at = Some(now);
            Some(injection::format_planning_summary(&summary))
        } else if s.token_count >= cfg.injection.clear_threshold_tokens {
            match s.take_pending_if(|p| matches!(p, PendingAction::ClearSummary { .. })) {
                Some(PendingAction::ClearSummary { summary }) => {
                    let before = s.clone();
                    s.apply_clear(now);
                    s.start_next_task();
                    plan.reset = Some(Reset::Clear(Box::new(before)));
                    Some(injection::format_clear_summary(&summary))
                }
                _ => None,
            }
        } else {
            None
        };

        if let Some(summary_block) = summary_block {
            tracing::info!(session_id = %s.session_id, dropped = idx, "conversation cleared");
            s.clear_point = Some(ClearPoint {
                dropped: idx,
                summary_block,
            });
            plan.replays.clear();
        }
    }

    // ── Earlier CLEAR still in force ────────────────────────────────
    if let Some(cp) = &s.clear_point {
        if messages.len() > cp.dropped {
            plan.clear_point = Some(cp.clone());
        } else {
            tracing::debug!(session_id = %s.session_id, "agent history shorter than clear point, dropping it");
            s.clear_point = None;
        }
    }

    // ── Dynamic channel ──────────────────────────────────────────────
    if let (Some(idx), true) = (current, cfg.injection.dynamic_enabled) {
        // A correction is shown once; a forced recovery until it is done.
        let directive = match s.take_pending_if(|p| matches!(p, PendingAction::Correction { .. })) {
            Some(PendingAction::Correction { text, .. }) => Some(text),
            _ => match &s.pending {
                Some(PendingAction::ForcedRecovery { text }) => Some(text.clone()),
                _ => None,
            },
        };
        let rendered = DynamicContext {
            files_edited: &s.tracking.files_edited,
            decisions: &s.tracking.decisions,
            directive: directive.as_deref(),
        }
        .render(cfg.injection.max_dynamic_files);

        if let Some(text) = rendered {
            s.tracking
                .injections
                .insert(injection_key(idx, &messages[idx]), text.clone());
            plan.dynamic = Some((idx, text));
        }
    }

    plan.waiting_for_recovery = s.waiting_for_recovery;
    plan
}

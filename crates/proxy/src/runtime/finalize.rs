//! Turn Finalizer.
//!
//! Turns a finished task into an immutable [`TaskRecord`], stores it and
//! hands it to the team memory collaborator in the background. Sync
//! failures are recorded on the task and never reach the agent.

use std::time::Instant;

use chrono::Utc;

use dg_domain::error::Result;
use dg_domain::task::{TaskRecord, TaskStatus, TriggerReason};
use dg_domain::trace::TraceEvent;
use dg_drift::extract_decision;
use dg_memory::MemoryProvider;
use dg_sessions::{PendingAction, SessionState, StepRecord, TaskStore};

use crate::cache::StaticCache;
use crate::runtime::summary;
use crate::state::AppState;

/// Build the record for the task `snapshot` was running.
pub fn build_record(
    snapshot: &SessionState,
    steps: &[StepRecord],
    user_id: &str,
    trigger: TriggerReason,
    status: TaskStatus,
) -> TaskRecord {
    let mut reasoning_trace: Vec<String> = Vec::new();
    let mut files_touched: Vec<String> = Vec::new();
    let mut decisions = Vec::new();

    for step in steps {
        let reasoning = step.reasoning.trim();
        if !reasoning.is_empty() && reasoning_trace.last().map(String::as_str) != Some(reasoning) {
            reasoning_trace.push(reasoning.to_owned());
        }
        if step.kind.is_modifying() {
            for f in &step.files {
                if !files_touched.contains(f) {
                    files_touched.push(f.clone());
                }
            }
        }
        if step.key_decision {
            if let Some(d) = extract_decision(reasoning) {
                if !decisions.contains(&d) {
                    decisions.push(d);
                }
            }
        }
    }

    TaskRecord {
        id: snapshot.task_id.clone(),
        session_id: snapshot.session_id.clone(),
        project: snapshot.project.clone(),
        user_id: user_id.to_owned(),
        goal: snapshot.goal.clone(),
        reasoning_trace,
        planning_only: files_touched.is_empty(),
        files_touched,
        decisions,
        constraints: snapshot.constraints.clone(),
        status,
        trigger,
        created_at: Utc::now(),
        synced_at: None,
        sync_error: None,
    }
}

fn steps_of(app: &AppState, task_id: &str) -> Vec<StepRecord> {
    app.sessions.steps(task_id).unwrap_or_else(|e| {
        tracing::warn!(task_id, error = %e, "reading step journal failed");
        Vec::new()
    })
}

/// Store a record and emit the finalization event.
fn store(app: &AppState, record: &TaskRecord, steps: usize) -> bool {
    match app.tasks.insert(record.clone()) {
        Ok(true) => {}
        Ok(false) => return false,
        Err(e) => {
            tracing::warn!(task_id = %record.id, error = %e, "persisting task record failed");
            return false;
        }
    }
    TraceEvent::TaskFinalized {
        session_id: record.session_id.clone(),
        task_id: record.id.clone(),
        trigger: record.trigger.to_string(),
        steps,
    }
    .emit();
    true
}

/// The agent ended its turn: close the task and start the next one in the
/// same session. Drift state carries over.
///
/// A planning-only task carries its summary into the next task as a
/// planning clear. Its sync is awaited so the refreshed static channel
/// already contains it.
pub async fn complete(app: &AppState, session_id: &str) -> Option<TaskRecord> {
    let snapshot = app.sessions.get(session_id)?;
    let steps = steps_of(app, &snapshot.task_id);
    if steps.is_empty() {
        return None;
    }

    let record = build_record(
        &snapshot,
        &steps,
        &app.config.memory.user_id,
        TriggerReason::Complete,
        TaskStatus::Completed,
    );
    let carry = record.planning_only.then(|| PendingAction::PlanningClear {
        summary: summary::planning_summary(&record),
    });

    // Someone else closed it first.
    app.sessions
        .rotate_task(session_id, &snapshot.task_id, carry)?;
    if !store(app, &record, steps.len()) {
        return None;
    }

    if record.planning_only {
        if let Some(memory) = app.memory.as_deref() {
            let _ = sync(memory, &app.tasks, &app.static_cache, &record).await;
        }
    } else {
        spawn_sync(app, record.clone());
    }
    Some(record)
}

/// Record a task the caller already closed (CLEAR at the token threshold,
/// or a session abandoned by the stale sweep).
pub fn record(
    app: &AppState,
    snapshot: &SessionState,
    trigger: TriggerReason,
    status: TaskStatus,
) -> Option<TaskRecord> {
    let steps = app.sessions.take_steps(&snapshot.task_id).unwrap_or_else(|e| {
        tracing::warn!(task_id = %snapshot.task_id, error = %e, "reading step journal failed");
        Vec::new()
    });
    if steps.is_empty() {
        return None;
    }
    let record = build_record(snapshot, &steps, &app.config.memory.user_id, trigger, status);
    if !store(app, &record, steps.len()) {
        return None;
    }
    spawn_sync(app, record.clone());
    Some(record)
}

pub fn spawn_sync(app: &AppState, record: TaskRecord) {
    let Some(memory) = app.memory.clone() else {
        return;
    };
    let tasks = app.tasks.clone();
    let cache = app.static_cache.clone();
    tokio::spawn(async move {
        let _ = sync(memory.as_ref(), &tasks, &cache, &record).await;
    });
}

/// Push one record to team memory and note the outcome. A successful sync
/// invalidates the project's static channel.
pub async fn sync(
    memory: &dyn MemoryProvider,
    tasks: &TaskStore,
    cache: &StaticCache,
    record: &TaskRecord,
) -> Result<()> {
    let started = Instant::now();
    let outcome = memory.sync_task(record).await;
    let duration_ms = started.elapsed().as_millis() as u64;

    match outcome {
        Ok(()) => {
            tasks.mark_synced(&record.id, Utc::now())?;
            cache.invalidate(&record.project);
            tracing::info!(task_id = %record.id, duration_ms, "task synced to team memory");
            Ok(())
        }
        Err(e) => {
            tracing::warn!(task_id = %record.id, error = %e, "task sync failed");
            tasks.mark_failed(&record.id, e.to_string())?;
            Err(e)
        }
    }
}

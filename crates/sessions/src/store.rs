//! Session State Store.
//!
//! Persists active sessions in `sessions.json` under the configured state
//! path, steps in `steps/<task_id>.jsonl` and the drift audit log in
//! `drift-log.jsonl`.
//!
//! Every session sits behind its own mutex: turns for different sessions
//! never contend, and read-modify-write on one session ([`SessionStore::update`])
//! is atomic. The outer map lock is only held long enough to find or insert
//! the session's handle.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};

use dg_domain::error::Result;
use dg_domain::trace::TraceEvent;

use crate::journal::Journal;
use crate::lifecycle;
use crate::model::{
    DriftLogEntry, PendingAction, SessionMode, SessionState, SessionStatus, StepRecord,
};

const DRIFT_LOG_KEY: &str = "drift-log";

type Handle = Arc<Mutex<SessionState>>;

pub struct SessionStore {
    sessions_path: PathBuf,
    sessions: RwLock<HashMap<String, Handle>>,
    steps: Journal<StepRecord>,
    drift_log: Journal<DriftLogEntry>,
}

impl SessionStore {
    /// Load or create the store at `state_path/sessions/`.
    pub fn new(state_path: &Path) -> Result<Self> {
        let dir = state_path.join("sessions");
        std::fs::create_dir_all(&dir)?;

        let sessions_path = dir.join("sessions.json");
        let loaded: HashMap<String, SessionState> = if sessions_path.exists() {
            let raw = std::fs::read_to_string(&sessions_path)?;
            serde_json::from_str(&raw).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "sessions.json unreadable, starting empty");
                HashMap::new()
            })
        } else {
            HashMap::new()
        };

        let sessions: HashMap<String, Handle> = loaded
            .into_iter()
            .filter(|(_, s)| s.status == SessionStatus::Active)
            .map(|(k, s)| (k, Arc::new(Mutex::new(s))))
            .collect();

        tracing::info!(
            sessions = sessions.len(),
            path = %sessions_path.display(),
            "session store loaded"
        );

        Ok(Self {
            steps: Journal::new(&dir.join("steps"))?,
            drift_log: Journal::new(&dir)?,
            sessions_path,
            sessions: RwLock::new(sessions),
        })
    }

    fn handle(&self, session_id: &str) -> Option<Handle> {
        self.sessions.read().get(session_id).cloned()
    }

    // ── Reads ────────────────────────────────────────────────────────

    /// Snapshot of an active session. Finished sessions read as `None`.
    pub fn get(&self, session_id: &str) -> Option<SessionState> {
        let handle = self.handle(session_id)?;
        let state = handle.lock();
        (state.status == SessionStatus::Active).then(|| state.clone())
    }

    /// Snapshots of all active sessions.
    pub fn list(&self) -> Vec<SessionState> {
        let handles: Vec<Handle> = self.sessions.read().values().cloned().collect();
        let mut out: Vec<SessionState> = handles
            .iter()
            .map(|h| h.lock().clone())
            .filter(|s| s.status == SessionStatus::Active)
            .collect();
        out.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        out
    }

    // ── Writes ───────────────────────────────────────────────────────

    /// Resolve or create the active session for `session_id`. Returns
    /// `(snapshot, is_new)`.
    pub fn get_or_create(&self, session_id: &str, project: &str) -> (SessionState, bool) {
        if let Some(handle) = self.handle(session_id) {
            let state = handle.lock();
            if state.status == SessionStatus::Active {
                return (state.clone(), false);
            }
        }

        let mut sessions = self.sessions.write();
        // Another request may have created it while we waited for the lock.
        if let Some(handle) = sessions.get(session_id) {
            let state = handle.lock();
            if state.status == SessionStatus::Active {
                return (state.clone(), false);
            }
        }
        let state = SessionState::new(session_id, project);
        sessions.insert(
            session_id.to_owned(),
            Arc::new(Mutex::new(state.clone())),
        );
        tracing::debug!(session_id, project, task_id = %state.task_id, "session created");
        (state, true)
    }

    /// Atomic read-modify-write on one active session.
    ///
    /// Returns `None` when no active session exists. `updated_at` is bumped
    /// after `f` runs.
    pub fn update<R>(&self, session_id: &str, f: impl FnOnce(&mut SessionState) -> R) -> Option<R> {
        let handle = self.handle(session_id)?;
        let mut state = handle.lock();
        if state.status != SessionStatus::Active {
            return None;
        }
        let out = f(&mut state);
        state.updated_at = Utc::now();
        Some(out)
    }

    /// Move a session to a terminal status. Happens at most once: the final
    /// snapshot is returned to the caller that performed the transition and
    /// `None` to everyone else.
    pub fn finish(&self, session_id: &str, status: SessionStatus) -> Option<SessionState> {
        debug_assert!(status.is_terminal());
        let mut sessions = self.sessions.write();
        let handle = sessions.get(session_id)?.clone();
        let snapshot = {
            let mut state = handle.lock();
            if state.status != SessionStatus::Active {
                return None;
            }
            state.status = status;
            state.updated_at = Utc::now();
            state.clone()
        };
        sessions.remove(session_id);
        self.steps.forget(&snapshot.task_id);
        Some(snapshot)
    }

    /// Close the task `task_id` and start a fresh one in the same session.
    ///
    /// Returns the session as it was before the rotation, or `None` when the
    /// session is gone or already moved past `task_id`. Drift state, intent
    /// and the clear point carry over. `next` becomes the pending action
    /// unless a correction or forced recovery is already waiting.
    pub fn rotate_task(
        &self,
        session_id: &str,
        task_id: &str,
        next: Option<PendingAction>,
    ) -> Option<SessionState> {
        let before = self.update(session_id, |s| {
            if s.task_id != task_id {
                return None;
            }
            let before = s.clone();
            s.start_next_task();
            if let Some(next) = next {
                let blocked = matches!(
                    s.pending,
                    Some(PendingAction::Correction { .. } | PendingAction::ForcedRecovery { .. })
                );
                if blocked {
                    tracing::debug!(session_id = %s.session_id, dropped = next.kind(), "correction pending, carry-over dropped");
                } else {
                    s.pending = Some(next);
                }
            }
            tracing::debug!(session_id = %s.session_id, task_id = %s.task_id, "next task started");
            Some(before)
        })??;
        self.steps.forget(task_id);
        Some(before)
    }

    /// The explicit external reset: escalation back to zero, mode back to
    /// normal, any pending correction or forced recovery dropped.
    pub fn reset(&self, session_id: &str) -> Option<SessionState> {
        self.update(session_id, |s| {
            s.escalation_count = 0;
            s.mode = SessionMode::Normal;
            s.waiting_for_recovery = false;
            s.recovery_target = None;
            if matches!(
                s.pending,
                Some(PendingAction::Correction { .. } | PendingAction::ForcedRecovery { .. })
            ) {
                s.pending = None;
            }
            tracing::info!(session_id = %s.session_id, "session reset");
            s.clone()
        })
    }

    /// Mark every active session idle for at least `stale_minutes` as
    /// abandoned and return their final snapshots.
    pub fn sweep_stale(&self, now: DateTime<Utc>, stale_minutes: u64) -> Vec<SessionState> {
        let stale: Vec<String> = self
            .sessions
            .read()
            .iter()
            .filter(|(_, h)| lifecycle::is_stale(&h.lock(), now, stale_minutes))
            .map(|(k, _)| k.clone())
            .collect();

        let mut out = Vec::new();
        for id in stale {
            if let Some(snapshot) = self.finish(&id, SessionStatus::Abandoned) {
                TraceEvent::SessionSwept {
                    session_id: id.clone(),
                    idle_minutes: lifecycle::idle_minutes(&snapshot, now),
                }
                .emit();
                out.push(snapshot);
            }
        }
        out
    }

    // ── Journals ─────────────────────────────────────────────────────

    pub async fn record_steps(&self, task_id: &str, steps: Vec<StepRecord>) -> Result<()> {
        self.steps.append_async(task_id, steps).await
    }

    /// Steps of one task in timestamp order.
    pub fn steps(&self, task_id: &str) -> Result<Vec<StepRecord>> {
        let mut steps = self.steps.read(task_id)?;
        steps.sort_by_key(|s| s.timestamp);
        Ok(steps)
    }

    /// Steps of a task that is no longer running, without keeping them
    /// cached.
    pub fn take_steps(&self, task_id: &str) -> Result<Vec<StepRecord>> {
        let mut steps = self.steps.read_uncached(task_id)?;
        self.steps.forget(task_id);
        steps.sort_by_key(|s| s.timestamp);
        Ok(steps)
    }

    pub async fn log_drift(&self, entry: DriftLogEntry) -> Result<()> {
        self.drift_log.append_async(DRIFT_LOG_KEY, vec![entry]).await
    }

    /// The whole audit log, read from disk on every call.
    pub fn drift_log(&self) -> Result<Vec<DriftLogEntry>> {
        self.drift_log.read_uncached(DRIFT_LOG_KEY)
    }

    // ── Persistence ──────────────────────────────────────────────────

    /// Write all active sessions to disk.
    pub fn flush(&self) -> Result<()> {
        let snapshot: HashMap<String, SessionState> = self
            .sessions
            .read()
            .iter()
            .map(|(k, h)| (k.clone(), h.lock().clone()))
            .filter(|(_, s)| s.status == SessionStatus::Active)
            .collect();
        let json = serde_json::to_string_pretty(&snapshot)?;
        let tmp = self.sessions_path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.sessions_path)?;
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

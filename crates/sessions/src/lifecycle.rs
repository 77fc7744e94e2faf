//! Stale-session detection.
//!
//! A session is stale once nothing touched it for the configured number of
//! minutes. Stale sessions are swept to `abandoned` so a new agent process
//! reusing the same id never inherits a dead task.

use chrono::{DateTime, Utc};

use crate::model::{SessionState, SessionStatus};

/// Whole minutes since the session was last updated. Never negative.
pub fn idle_minutes(state: &SessionState, now: DateTime<Utc>) -> i64 {
    now.signed_duration_since(state.updated_at)
        .num_minutes()
        .max(0)
}

pub fn is_stale(state: &SessionState, now: DateTime<Utc>, stale_minutes: u64) -> bool {
    state.status == SessionStatus::Active
        && stale_minutes > 0
        && idle_minutes(state, now) >= stale_minutes as i64
}

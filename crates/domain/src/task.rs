use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why a session was finalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerReason {
    /// The agent stopped on its own.
    Complete,
    /// The context grew past the CLEAR threshold.
    Threshold,
    /// The session went stale.
    Abandoned,
}

impl TriggerReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Complete => "complete",
            Self::Threshold => "threshold",
            Self::Abandoned => "abandoned",
        }
    }
}

impl std::fmt::Display for TriggerReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Completed,
    Abandoned,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Abandoned => "abandoned",
        }
    }
}

/// A choice the agent made and the reason it gave.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub choice: String,
    #[serde(default)]
    pub reason: String,
}

/// The finalized memory record of one task.
///
/// Immutable once created, except for the sync bookkeeping fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: String,
    pub session_id: String,
    pub project: String,
    pub user_id: String,
    /// The original query the task started from.
    pub goal: String,
    #[serde(default)]
    pub reasoning_trace: Vec<String>,
    #[serde(default)]
    pub files_touched: Vec<String>,
    #[serde(default)]
    pub decisions: Vec<Decision>,
    #[serde(default)]
    pub constraints: Vec<String>,
    pub status: TaskStatus,
    pub trigger: TriggerReason,
    /// No file was modified during the task.
    #[serde(default)]
    pub planning_only: bool,
    pub created_at: DateTime<Utc>,

    // ── Sync bookkeeping ─────────────────────────────────────────────
    #[serde(default)]
    pub synced_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub sync_error: Option<String>,
}

impl TaskRecord {
    pub fn is_synced(&self) -> bool {
        self.synced_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_reason_wire_names() {
        assert_eq!(
            serde_json::to_string(&TriggerReason::Abandoned).unwrap(),
            "\"abandoned\""
        );
        assert_eq!(TriggerReason::Threshold.to_string(), "threshold");
    }

    #[test]
    fn sync_fields_default_when_absent() {
        let raw = r#"{
            "id": "t1", "session_id": "s1", "project": "/p", "user_id": "u",
            "goal": "g", "status": "completed", "trigger": "complete",
            "created_at": "2026-01-01T00:00:00Z"
        }"#;
        let t: TaskRecord = serde_json::from_str(raw).unwrap();
        assert!(!t.is_synced());
        assert!(t.sync_error.is_none());
        assert!(t.decisions.is_empty());
    }
}

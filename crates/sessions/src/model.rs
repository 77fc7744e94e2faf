//! Session records.
//!
//! [`SessionState`] is the mutable per-conversation record; [`StepRecord`]
//! and [`DriftLogEntry`] are append-only journal lines.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use dg_domain::action::ActionKind;
use dg_domain::drift::{CorrectionLevel, RecoveryStep};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Enums
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    #[default]
    Normal,
    /// At least one correction has been issued.
    Drifted,
    /// A halt was issued. Only an explicit reset leaves this mode.
    Forced,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Active,
    Completed,
    Abandoned,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Active)
    }
}

/// The one-shot instruction waiting for the next suitable request.
///
/// At most one is pending at a time; setting a new one replaces the old.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PendingAction {
    /// Injected into the next new user turn, then dropped.
    Correction { level: CorrectionLevel, text: String },
    /// Injected into every new user turn until the recovery action is seen.
    ForcedRecovery { text: String },
    /// Precomputed summary, applied by CLEAR once the token threshold is hit.
    ClearSummary { summary: String },
    /// Summary of a finalized planning-only task, applied on the next turn.
    PlanningClear { summary: String },
}

impl PendingAction {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Correction { .. } => "correction",
            Self::ForcedRecovery { .. } => "forced_recovery",
            Self::ClearSummary { .. } => "clear_summary",
            Self::PlanningClear { .. } => "planning_clear",
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session state
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One entry of the drift history, rendered in halt messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriftEvent {
    pub timestamp: DateTime<Utc>,
    pub score: u8,
    pub effective_score: i32,
    /// `None` when the score did not warrant a correction.
    #[serde(default)]
    pub level: Option<CorrectionLevel>,
    /// Short description of what the agent was doing.
    #[serde(default)]
    pub prompt_summary: String,
}

/// Per-task bookkeeping. Wiped by CLEAR; files and decisions also reset
/// when the agent finishes a task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnTracking {
    /// Files edited or written in the current task, in first-touch order.
    #[serde(default)]
    pub files_edited: Vec<String>,
    /// Key decisions, already rendered as `choice (reason)`.
    #[serde(default)]
    pub decisions: Vec<String>,
    /// Dynamic text injected into a user message, keyed by a hash of that
    /// message's original content, so later requests re-apply it
    /// byte-identically.
    #[serde(default)]
    pub injections: BTreeMap<String, String>,
    #[serde(default)]
    pub turns: u32,
}

impl TurnTracking {
    pub fn note_file(&mut self, path: &str) {
        if !self.files_edited.iter().any(|f| f == path) {
            self.files_edited.push(path.to_owned());
        }
    }

    pub fn note_decision(&mut self, decision: impl Into<String>) {
        let d = decision.into();
        if !self.decisions.contains(&d) {
            self.decisions.push(d);
        }
    }
}

/// Where the last CLEAR cut the agent's history. The agent keeps sending
/// its full history, so every later request drops the same prefix and
/// carries the same summary to stay byte-stable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearPoint {
    /// Number of leading inbound messages replaced by the summary.
    pub dropped: usize,
    /// Formatted summary block appended to the system prompt.
    pub summary_block: String,
}

/// Last outbound request for retry replay. Memory only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayRecord {
    pub inbound_hash: String,
    pub outbound: bytes::Bytes,
}

/// Everything the proxy knows about one agent conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: String,
    /// Fresh for every task run in this session; keys the step journal.
    pub task_id: String,
    pub project: String,

    // ── Intent ───────────────────────────────────────────────────────
    #[serde(default)]
    pub goal: String,
    #[serde(default)]
    pub scope: Vec<String>,
    #[serde(default)]
    pub constraints: Vec<String>,

    // ── Drift ────────────────────────────────────────────────────────
    #[serde(default)]
    pub escalation_count: u32,
    #[serde(default)]
    pub mode: SessionMode,
    #[serde(default)]
    pub last_drift_score: Option<u8>,
    #[serde(default)]
    pub drift_history: Vec<DriftEvent>,
    #[serde(default)]
    pub pending: Option<PendingAction>,
    #[serde(default)]
    pub waiting_for_recovery: bool,
    /// The mandated first action of the halt that forced this session.
    #[serde(default)]
    pub recovery_target: Option<RecoveryStep>,

    // ── Context ──────────────────────────────────────────────────────
    /// Context size of the latest turn, in tokens.
    #[serde(default)]
    pub token_count: u64,
    #[serde(default)]
    pub last_clear_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub clear_point: Option<ClearPoint>,
    #[serde(default)]
    pub tracking: TurnTracking,

    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    #[serde(skip)]
    pub replay: Option<ReplayRecord>,
}

impl SessionState {
    pub fn new(session_id: impl Into<String>, project: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            task_id: uuid::Uuid::new_v4().to_string(),
            project: project.into(),
            goal: String::new(),
            scope: Vec::new(),
            constraints: Vec::new(),
            escalation_count: 0,
            mode: SessionMode::Normal,
            last_drift_score: None,
            drift_history: Vec::new(),
            pending: None,
            waiting_for_recovery: false,
            recovery_target: None,
            token_count: 0,
            last_clear_at: None,
            clear_point: None,
            tracking: TurnTracking::default(),
            status: SessionStatus::Active,
            created_at: now,
            updated_at: now,
            replay: None,
        }
    }

    pub fn has_goal(&self) -> bool {
        !self.goal.trim().is_empty()
    }

    /// Take the pending action if `pred` accepts it, leaving anything else
    /// in place.
    pub fn take_pending_if(
        &mut self,
        pred: impl FnOnce(&PendingAction) -> bool,
    ) -> Option<PendingAction> {
        if self.pending.as_ref().is_some_and(pred) {
            self.pending.take()
        } else {
            None
        }
    }

    /// Apply the CLEAR reset to this record.
    ///
    /// Drops the pending action, zeroes tokens and escalation and wipes the
    /// per-turn tracking. Goal, scope and constraints carry over. The
    /// caller records the new [`ClearPoint`].
    pub fn apply_clear(&mut self, now: DateTime<Utc>) {
        self.pending = None;
        self.token_count = 0;
        self.escalation_count = 0;
        self.mode = SessionMode::Normal;
        self.waiting_for_recovery = false;
        self.recovery_target = None;
        self.tracking = TurnTracking::default();
        self.replay = None;
        self.last_clear_at = Some(now);
    }

    /// Close the current task and start the next one in this session.
    ///
    /// The step journal moves to a fresh task id and the per-task files and
    /// decisions are wiped. Injections stay: the agent keeps re-sending the
    /// turns they were applied to.
    pub fn start_next_task(&mut self) {
        self.task_id = uuid::Uuid::new_v4().to_string();
        self.tracking.files_edited.clear();
        self.tracking.decisions.clear();
        self.tracking.turns = 0;
    }

    /// The last `n` drift events, oldest first.
    pub fn recent_drift(&self, n: usize) -> &[DriftEvent] {
        let start = self.drift_history.len().saturating_sub(n);
        &self.drift_history[start..]
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Journal records
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One extracted agent action (ActionRecord).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub session_id: String,
    pub task_id: String,
    pub timestamp: DateTime<Utc>,
    pub kind: ActionKind,
    pub tool_name: String,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub folders: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub drift_score: Option<u8>,
    #[serde(default)]
    pub drift_level: Option<CorrectionLevel>,
    #[serde(default)]
    pub key_decision: bool,
    /// `false` once the drift judgment flagged this step.
    #[serde(default = "d_true")]
    pub validated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correction: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// Audit line for a corrected action. Never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftLogEntry {
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub action_kind: ActionKind,
    #[serde(default)]
    pub files: Vec<String>,
    pub score: u8,
    pub level: CorrectionLevel,
    #[serde(default)]
    pub reason: String,
    pub correction: String,
    #[serde(default)]
    pub recovery_plan: Vec<RecoveryStep>,
}

fn d_true() -> bool {
    true
}

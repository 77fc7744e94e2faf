//! Session State Store for driftguard.
//!
//! Keyed-by-session records of goal, scope, escalation state, the pending
//! one-shot action and cache bookkeeping, plus the append-only step and
//! drift journals and the finalized task records.

pub mod journal;
pub mod lifecycle;
pub mod model;
pub mod session_key;
pub mod store;
pub mod tasks;

pub use journal::Journal;
pub use model::{
    ClearPoint, DriftEvent, DriftLogEntry, PendingAction, ReplayRecord, SessionMode, SessionState,
    SessionStatus, StepRecord, TurnTracking,
};
pub use session_key::{content_hash, resolve_project, resolve_session_id};
pub use store::SessionStore;
pub use tasks::TaskStore;

//! Drift detection for driftguard.
//!
//! Intent extraction, the judge collaborator, level determination, the
//! correction builder and the escalation state machine that ties them to a
//! session record.

pub mod correction;
pub mod escalation;
pub mod intent;
pub mod judge;
pub mod level;

pub use correction::{build_correction, confirmation_phrase, mandatory_action};
pub use escalation::{apply_judgment, observe_recovery, Verdict};
pub use intent::{extract_decision, extract_intent, keywords, strip_reminders, Intent};
pub use judge::{create_judge, DriftJudge, JudgeRequest, LlmDriftJudge};
pub use level::{decide_level, determine_level, effective_score};

use serde::{Deserialize, Serialize};

/// The four escalating intervention levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorrectionLevel {
    Nudge,
    Correct,
    Intervene,
    Halt,
}

impl CorrectionLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Nudge => "nudge",
            Self::Correct => "correct",
            Self::Intervene => "intervene",
            Self::Halt => "halt",
        }
    }
}

impl std::fmt::Display for CorrectionLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One corrective step proposed by the drift judgment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryStep {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    pub action: String,
}

/// The result the drift judgment collaborator returns for a batch of actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftResult {
    /// Alignment with the original goal, 0 (unrelated) to 10 (on track).
    pub score: u8,
    #[serde(default)]
    pub diagnostic: String,
    #[serde(default)]
    pub boundaries_violated: Vec<String>,
    #[serde(default)]
    pub recovery_plan: Vec<RecoveryStep>,
}

impl DriftResult {
    pub fn aligned(diagnostic: impl Into<String>) -> Self {
        Self {
            score: 10,
            diagnostic: diagnostic.into(),
            boundaries_violated: Vec::new(),
            recovery_plan: Vec::new(),
        }
    }

    /// The mandatory next action. Only the first plan step is ever mandated.
    pub fn first_step(&self) -> Option<&RecoveryStep> {
        self.recovery_plan.first()
    }
}

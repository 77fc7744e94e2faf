//! Wire DTOs of the team memory service.
//!
//! Field names are `camelCase` on the wire.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use dg_domain::task::{Decision, TaskRecord};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Lookup
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// POST /api/memories/search — request body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryQuery {
    /// Team id, or the project path when no team is configured.
    pub team_id: String,
    pub project: String,
    /// Free text to rank against.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    /// Files that boost relevance.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
    pub limit: u32,
}

/// POST /api/memories/search — response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemorySearchResponse {
    #[serde(default)]
    pub memories: Vec<MemoryDto>,
    #[serde(default)]
    pub count: u32,
}

/// A prior task record as the service returns it, best match first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryDto {
    #[serde(default)]
    pub id: Option<String>,
    pub goal: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub files_touched: Vec<String>,
    #[serde(default)]
    pub decisions: Vec<Decision>,
    #[serde(default)]
    pub constraints: Vec<String>,
    #[serde(default)]
    pub score: Option<f64>,
    /// Timestamp string (may lack a timezone suffix).
    #[serde(default)]
    pub created_at: Option<String>,
}

impl MemoryDto {
    /// Render as a markdown body for the static channel. Deterministic for
    /// a given record.
    pub fn render(&self) -> String {
        let mut out = String::new();
        if let Some(summary) = self.summary.as_deref().filter(|s| !s.trim().is_empty()) {
            out.push_str(summary.trim());
            out.push('\n');
        }
        if !self.decisions.is_empty() {
            out.push_str("Decisions:\n");
            for d in &self.decisions {
                if d.reason.is_empty() {
                    out.push_str(&format!("- {}\n", d.choice));
                } else {
                    out.push_str(&format!("- {} ({})\n", d.choice, d.reason));
                }
            }
        }
        if !self.constraints.is_empty() {
            out.push_str("Constraints:\n");
            for c in &self.constraints {
                out.push_str(&format!("- {c}\n"));
            }
        }
        if !self.files_touched.is_empty() {
            out.push_str(&format!("Files: {}\n", self.files_touched.join(", ")));
        }
        out
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Sync
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// POST /api/memories — request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSyncRequest {
    pub id: String,
    pub team_id: String,
    pub project: String,
    pub user_id: String,
    pub goal: String,
    pub reasoning_trace: Vec<String>,
    pub files_touched: Vec<String>,
    pub decisions: Vec<Decision>,
    pub constraints: Vec<String>,
    pub status: String,
    pub trigger: String,
    pub planning_only: bool,
    pub created_at: DateTime<Utc>,
}

impl TaskSyncRequest {
    pub fn from_record(task: &TaskRecord, team_id: &str) -> Self {
        Self {
            id: task.id.clone(),
            team_id: team_id.to_owned(),
            project: task.project.clone(),
            user_id: task.user_id.clone(),
            goal: task.goal.clone(),
            reasoning_trace: task.reasoning_trace.clone(),
            files_touched: task.files_touched.clone(),
            decisions: task.decisions.clone(),
            constraints: task.constraints.clone(),
            status: task.status.as_str().to_owned(),
            trigger: task.trigger.as_str().to_owned(),
            planning_only: task.planning_only,
            created_at: task.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_response_tolerates_sparse_records() {
        let raw = r#"{"memories":[{"goal":"Add retry","decisions":[{"choice":"use backoff"}]}],"count":1}"#;
        let resp: MemorySearchResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(resp.memories[0].goal, "Add retry");
        assert_eq!(resp.memories[0].decisions[0].reason, "");
    }

    #[test]
    fn render_is_compact_markdown() {
        let m = MemoryDto {
            id: None,
            goal: "Add retry".into(),
            summary: Some("Retry on 5xx with backoff.".into()),
            files_touched: vec!["src/client.rs".into()],
            decisions: vec![Decision {
                choice: "exponential backoff".into(),
                reason: "server asks for it".into(),
            }],
            constraints: vec![],
            score: Some(0.9),
            created_at: None,
        };
        assert_eq!(
            m.render(),
            "Retry on 5xx with backoff.\nDecisions:\n- exponential backoff (server asks for it)\nFiles: src/client.rs\n"
        );
    }

    #[test]
    fn query_skips_empty_fields() {
        let q = MemoryQuery {
            team_id: "t".into(),
            project: "/repo".into(),
            limit: 5,
            ..Default::default()
        };
        let v = serde_json::to_value(&q).unwrap();
        assert!(v.get("context").is_none());
        assert!(v.get("files").is_none());
        assert_eq!(v["teamId"], "t");
    }
}

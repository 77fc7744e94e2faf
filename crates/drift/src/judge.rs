//! Drift judgment collaborator.
//!
//! The proxy does not score drift itself. It hands the goal, scope and the
//! newly extracted actions to a [`DriftJudge`] and acts on the returned
//! [`DriftResult`]. [`LlmDriftJudge`] asks a small model on the Messages API
//! to grade alignment and reply with JSON.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use dg_domain::action::AgentAction;
use dg_domain::config::JudgeConfig;
use dg_domain::drift::DriftResult;
use dg_domain::error::{Error, Result};
use dg_upstream::from_reqwest;

const ANTHROPIC_VERSION: &str = "2023-06-01";

const SYSTEM_PROMPT: &str = "You grade whether a coding agent's latest actions serve the \
user's original goal. Reply with a single JSON object and nothing else:\n\
{\"score\": <0-10, 10 = fully on goal>, \"diagnostic\": \"<one sentence>\", \
\"boundaries_violated\": [\"<short phrase>\"], \
\"recovery_plan\": [{\"file\": \"<path or null>\", \"action\": \"<imperative>\"}]}\n\
Reading files and running tests related to the goal are on goal. Leave \
recovery_plan empty when score >= 8.";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// What the judge sees.
#[derive(Debug, Clone, Serialize)]
pub struct JudgeRequest {
    pub goal: String,
    pub scope: Vec<String>,
    pub constraints: Vec<String>,
    pub actions: Vec<AgentAction>,
    /// The agent's own explanation of the turn, if it gave one.
    pub reasoning: String,
}

#[async_trait::async_trait]
pub trait DriftJudge: Send + Sync {
    async fn judge(&self, req: &JudgeRequest) -> Result<DriftResult>;
}

/// Build the configured judge, or `None` when judging is disabled.
pub fn create_judge(cfg: &JudgeConfig) -> Result<Option<Arc<dyn DriftJudge>>> {
    if !cfg.enabled {
        tracing::info!("drift judge disabled");
        return Ok(None);
    }
    let judge: Arc<dyn DriftJudge> = Arc::new(LlmDriftJudge::from_config(cfg)?);
    tracing::info!(model = %cfg.model, "drift judge ready");
    Ok(Some(judge))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LLM grader
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct LlmDriftJudge {
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    client: reqwest::Client,
}

impl LlmDriftJudge {
    pub fn from_config(cfg: &JudgeConfig) -> Result<Self> {
        let api_key = cfg.auth.resolve()?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()
            .map_err(from_reqwest)?;
        Ok(Self {
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: cfg.model.clone(),
            max_tokens: cfg.max_tokens,
            client,
        })
    }

    fn build_body(&self, req: &JudgeRequest) -> Value {
        serde_json::json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "system": SYSTEM_PROMPT,
            "messages": [{ "role": "user", "content": render_request(req) }],
        })
    }
}

#[async_trait::async_trait]
impl DriftJudge for LlmDriftJudge {
    async fn judge(&self, req: &JudgeRequest) -> Result<DriftResult> {
        let url = format!("{}/v1/messages", self.base_url);
        tracing::debug!(url = %url, actions = req.actions.len(), "drift judge request");

        let resp = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&self.build_body(req))
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = resp.status();
        let text = resp.text().await.map_err(from_reqwest)?;
        if !status.is_success() {
            return Err(Error::Judge(format!("HTTP {} - {}", status.as_u16(), text)));
        }

        let body: Value = serde_json::from_str(&text)?;
        let reply = body
            .get("content")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(|b| b.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("");
        parse_verdict(&reply)
    }
}

/// Render the judge prompt.
pub fn render_request(req: &JudgeRequest) -> String {
    let mut out = format!("Original goal:\n{}\n", req.goal.trim());
    if !req.scope.is_empty() {
        out.push_str(&format!("\nExpected scope: {}\n", req.scope.join(", ")));
    }
    if !req.constraints.is_empty() {
        out.push_str("\nConstraints:\n");
        for c in &req.constraints {
            out.push_str(&format!("- {c}\n"));
        }
    }
    out.push_str("\nLatest actions:\n");
    for a in &req.actions {
        out.push_str(&format!("- {} via {}", a.kind, a.tool_name));
        if !a.files.is_empty() {
            out.push_str(&format!(" on {}", a.files.join(", ")));
        }
        if let Some(cmd) = &a.command {
            out.push_str(&format!(": `{cmd}`"));
        }
        out.push('\n');
    }
    if !req.reasoning.trim().is_empty() {
        let reasoning: String = req.reasoning.trim().chars().take(1500).collect();
        out.push_str(&format!("\nAgent's reasoning:\n{reasoning}\n"));
    }
    out
}

/// Pull the JSON verdict out of the model's reply. Tolerates surrounding
/// prose or a code fence; the score is clamped to 10.
pub fn parse_verdict(reply: &str) -> Result<DriftResult> {
    let start = reply.find('{');
    let end = reply.rfind('}');
    let (Some(start), Some(end)) = (start, end) else {
        return Err(Error::Judge(format!("no JSON object in reply: {reply}")));
    };
    if end < start {
        return Err(Error::Judge(format!("no JSON object in reply: {reply}")));
    }
    let mut v: Value = serde_json::from_str(&reply[start..=end])
        .map_err(|e| Error::Judge(format!("unparseable verdict: {e}")))?;

    // Models sometimes send the score as a float or string.
    let score = match v.get("score") {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(10.0),
        Some(Value::String(s)) => s.trim().parse::<f64>().unwrap_or(10.0),
        _ => return Err(Error::Judge("verdict has no score".into())),
    };
    v["score"] = Value::from(score.round().clamp(0.0, 10.0) as u8);

    serde_json::from_value(v).map_err(|e| Error::Judge(format!("unexpected verdict shape: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use dg_domain::action::ActionKind;

    #[test]
    fn verdict_inside_code_fence() {
        let reply = "Here you go:\n```json\n{\"score\": 4, \"diagnostic\": \"off track\", \
                     \"boundaries_violated\": [\"editing CI config\"], \
                     \"recovery_plan\": [{\"file\": \"src/a.rs\", \"action\": \"finish a\"}]}\n```";
        let r = parse_verdict(reply).unwrap();
        assert_eq!(r.score, 4);
        assert_eq!(r.boundaries_violated, vec!["editing CI config"]);
        assert_eq!(r.first_step().unwrap().file.as_deref(), Some("src/a.rs"));
    }

    #[test]
    fn score_is_normalized() {
        assert_eq!(parse_verdict(r#"{"score": 12}"#).unwrap().score, 10);
        assert_eq!(parse_verdict(r#"{"score": "6.6"}"#).unwrap().score, 7);
        assert_eq!(parse_verdict(r#"{"score": -1}"#).unwrap().score, 0);
    }

    #[test]
    fn missing_score_is_an_error() {
        assert!(matches!(
            parse_verdict(r#"{"diagnostic": "?"}"#),
            Err(Error::Judge(_))
        ));
        assert!(parse_verdict("I cannot grade this").is_err());
    }

    #[test]
    fn null_file_in_plan_is_accepted() {
        let r = parse_verdict(r#"{"score": 3, "recovery_plan": [{"file": null, "action": "stop"}]}"#)
            .unwrap();
        assert!(r.first_step().unwrap().file.is_none());
    }

    #[test]
    fn prompt_lists_actions() {
        let req = JudgeRequest {
            goal: "Fix login".into(),
            scope: vec!["src/auth.rs".into()],
            constraints: vec![],
            actions: vec![AgentAction {
                kind: ActionKind::Shell,
                tool_name: "Bash".into(),
                tool_use_id: "t".into(),
                files: vec![],
                folders: vec![],
                command: Some("npm publish".into()),
                pattern: None,
            }],
            reasoning: String::new(),
        };
        let p = render_request(&req);
        assert!(p.contains("Fix login"));
        assert!(p.contains("- shell via Bash: `npm publish`"));
        assert!(!p.contains("Agent's reasoning"));
    }

    #[test]
    fn disabled_judge_is_none() {
        assert!(create_judge(&JudgeConfig::default()).unwrap().is_none());
    }
}

//! REST implementation of [`MemoryProvider`].
//!
//! `RestMemoryClient` wraps a `reqwest::Client` and maps each trait method
//! to one HTTP call, with retry and exponential back-off on transient
//! (5xx / transport) failures.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use uuid::Uuid;

use dg_domain::config::MemoryConfig;
use dg_domain::error::{Error, Result};
use dg_domain::task::TaskRecord;
use dg_domain::trace::TraceEvent;
use dg_upstream::from_reqwest;

use crate::provider::MemoryProvider;
use crate::types::{MemoryDto, MemoryQuery, MemorySearchResponse, TaskSyncRequest};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Client
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Created once at startup and shared; the inner client pools connections.
#[derive(Debug, Clone)]
pub struct RestMemoryClient {
    http: Client,
    base_url: String,
    api_key: String,
    team_id: Option<String>,
    max_retries: u32,
    lookup_timeout: Duration,
}

impl RestMemoryClient {
    pub fn new(cfg: &MemoryConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()
            .map_err(from_reqwest)?;

        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_owned(),
            api_key: cfg.auth.resolve()?,
            team_id: cfg.team_id.clone(),
            max_retries: cfg.max_retries,
            lookup_timeout: Duration::from_millis(cfg.lookup_timeout_ms),
        })
    }

    /// The team a project's memories live under.
    pub fn team_for(&self, project: &str) -> String {
        self.team_id.clone().unwrap_or_else(|| project.to_owned())
    }

    // ── request helpers ──────────────────────────────────────────────

    fn decorate(&self, rb: RequestBuilder) -> RequestBuilder {
        rb.header("X-Client-Type", "driftguard")
            .header("X-Trace-Id", Uuid::new_v4().to_string())
            .bearer_auth(&self.api_key)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    // ── retry engine ─────────────────────────────────────────────────

    /// Execute a request, retrying 5xx and transport failures up to
    /// `max_retries` times with exponential back-off. 4xx is permanent.
    async fn execute_with_retry(
        &self,
        endpoint: &str,
        max_retries: u32,
        build_request: impl Fn() -> RequestBuilder,
    ) -> Result<Response> {
        let mut last_err: Option<Error> = None;

        for attempt in 0..=max_retries {
            if attempt > 0 {
                let backoff = Duration::from_millis(100 * 2u64.pow(attempt - 1));
                tokio::time::sleep(backoff).await;
            }

            match self.decorate(build_request()).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    tracing::debug!(endpoint, status = status.as_u16(), attempt, "memory call");

                    if status.is_server_error() {
                        let body = resp.text().await.unwrap_or_default();
                        last_err = Some(Error::Memory(format!("{endpoint} returned {status}: {body}")));
                        continue;
                    }
                    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                        let body = resp.text().await.unwrap_or_default();
                        return Err(Error::Auth(format!("{endpoint} auth failed ({status}): {body}")));
                    }
                    if status.is_client_error() {
                        let body = resp.text().await.unwrap_or_default();
                        return Err(Error::Memory(format!("{endpoint} returned {status}: {body}")));
                    }
                    return Ok(resp);
                }
                Err(e) => {
                    tracing::debug!(endpoint, attempt, error = %e, "memory call failed");
                    last_err = Some(from_reqwest(e));
                }
            }
        }

        Err(last_err.unwrap_or_else(|| Error::Memory(format!("{endpoint}: all retries exhausted"))))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait]
impl MemoryProvider for RestMemoryClient {
    /// Runs while an agent request waits: one attempt under the short
    /// lookup timeout.
    async fn fetch_team_memories(&self, query: MemoryQuery) -> Result<Vec<MemoryDto>> {
        let url = self.url("/api/memories/search");
        let resp = self
            .execute_with_retry("POST /api/memories/search", 0, || {
                self.http.post(&url).timeout(self.lookup_timeout).json(&query)
            })
            .await?;

        let body = resp.text().await.map_err(from_reqwest)?;
        let parsed: MemorySearchResponse = serde_json::from_str(&body)
            .map_err(|e| Error::Memory(format!("failed to parse search response: {e}")))?;
        Ok(parsed.memories)
    }

    async fn sync_task(&self, task: &TaskRecord) -> Result<()> {
        let url = self.url("/api/memories");
        let req = TaskSyncRequest::from_record(task, &self.team_for(&task.project));
        let start = Instant::now();
        let result = self
            .execute_with_retry("POST /api/memories", self.max_retries, || {
                self.http.post(&url).json(&req)
            })
            .await;

        TraceEvent::MemorySync {
            task_id: task.id.clone(),
            ok: result.is_ok(),
            duration_ms: start.elapsed().as_millis() as u64,
        }
        .emit();
        result.map(|_| ())
    }

    async fn health(&self) -> Result<serde_json::Value> {
        let url = self.url("/health");
        let resp = self
            .execute_with_retry("GET /health", 0, || self.http.get(&url))
            .await?;
        let body = resp.text().await.map_err(from_reqwest)?;
        Ok(serde_json::from_str(&body).unwrap_or_else(|_| serde_json::json!({ "raw": body })))
    }
}

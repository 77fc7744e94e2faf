//! The `MemoryProvider` trait: the team memory collaborator as the proxy
//! sees it.

use async_trait::async_trait;
use dg_domain::error::Result;
use dg_domain::task::TaskRecord;

use crate::types::{MemoryDto, MemoryQuery};

/// Read and write paths of the team memory service.
///
/// Implementations may talk to the real REST API or be a test double.
/// Callers treat every error as "no memory" and never block the agent on it.
#[async_trait]
pub trait MemoryProvider: Send + Sync {
    /// Ranked prior task records for a team/project (POST /api/memories/search).
    async fn fetch_team_memories(&self, query: MemoryQuery) -> Result<Vec<MemoryDto>>;

    /// Persist a finalized task record (POST /api/memories).
    async fn sync_task(&self, task: &TaskRecord) -> Result<()>;

    /// Health check (GET /health).
    async fn health(&self) -> Result<serde_json::Value>;
}

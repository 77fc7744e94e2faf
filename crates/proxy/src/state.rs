use std::sync::Arc;

use dg_domain::config::Config;
use dg_domain::error::Result;
use dg_drift::DriftJudge;
use dg_memory::MemoryProvider;
use dg_sessions::{SessionStore, TaskStore};
use dg_upstream::Forwarder;

use crate::cache::{ExtendedCache, StaticCache};

/// Shared application state passed to all API handlers and background
/// loops.
///
/// Fields are grouped by concern:
/// - **Core services**: config, the upstream forwarder, collaborators
/// - **Session management**: session store, finalized task records
/// - **Caches**: per-project static context and extended cache entries
#[derive(Clone)]
pub struct AppState {
    // ── Core services ─────────────────────────────────────────────────
    pub config: Arc<Config>,
    pub forwarder: Arc<Forwarder>,
    /// `None` when judging is disabled; drift is then never scored.
    pub judge: Option<Arc<dyn DriftJudge>>,
    /// `None` when team memory is disabled.
    pub memory: Option<Arc<dyn MemoryProvider>>,

    // ── Session management ────────────────────────────────────────────
    pub sessions: Arc<SessionStore>,
    pub tasks: Arc<TaskStore>,

    // ── Caches ────────────────────────────────────────────────────────
    pub static_cache: Arc<StaticCache>,
    pub extended_cache: Arc<ExtendedCache>,
}

impl AppState {
    /// Wire the stores and caches around already-built collaborators.
    pub fn with_collaborators(
        config: Arc<Config>,
        judge: Option<Arc<dyn DriftJudge>>,
        memory: Option<Arc<dyn MemoryProvider>>,
    ) -> Result<Self> {
        let state_path = &config.server.state_path;
        Ok(Self {
            forwarder: Arc::new(Forwarder::new(&config.upstream)?),
            judge,
            memory,
            sessions: Arc::new(SessionStore::new(state_path)?),
            tasks: Arc::new(TaskStore::new(state_path)?),
            static_cache: Arc::new(StaticCache::new()),
            extended_cache: Arc::new(ExtendedCache::new(config.extended_cache.clone())),
            config,
        })
    }
}

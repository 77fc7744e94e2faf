//! Per-project cache of the static channel.
//!
//! One entry per project path, shared by every session on that project.
//! Entries are replaced whole, never edited. A fetch that raced with an
//! invalidation is discarded instead of resurrecting stale memory. A
//! failed lookup is remembered for a while, so requests during a memory
//! outage go out without a static block instead of waiting on it.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use dg_contextpack::{MemorySnippet, StaticContextBuilder, StaticReport};
use dg_domain::config::Config;
use dg_domain::trace::TraceEvent;
use dg_memory::{MemoryDto, MemoryProvider, MemoryQuery};

/// The static block computed for one project.
#[derive(Debug, Clone)]
pub struct StaticEntry {
    /// Text appended to the system prompt. `None` when memory had nothing.
    pub block: Option<String>,
    pub report: StaticReport,
    pub built_at: DateTime<Utc>,
    /// Set on the entry recording a failed lookup.
    pub expires_at: Option<DateTime<Utc>>,
}

impl StaticEntry {
    fn failed(now: DateTime<Utc>, ttl_secs: u64) -> Self {
        Self {
            block: None,
            report: StaticReport::default(),
            built_at: now,
            expires_at: Some(now + chrono::Duration::seconds(ttl_secs as i64)),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.expires_at.is_some()
    }

    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, Arc<StaticEntry>>,
    /// Bumped by every invalidation of the project.
    epochs: HashMap<String, u64>,
}

#[derive(Default)]
pub struct StaticCache {
    inner: RwLock<Inner>,
}

impl StaticCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, project: &str) -> Option<Arc<StaticEntry>> {
        self.inner.read().entries.get(project).cloned()
    }

    pub fn projects(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn invalidate(&self, project: &str) {
        let mut inner = self.inner.write();
        inner.entries.remove(project);
        *inner.epochs.entry(project.to_owned()).or_insert(0) += 1;
        tracing::debug!(project, "static context invalidated");
    }

    fn epoch(&self, project: &str) -> u64 {
        self.inner.read().epochs.get(project).copied().unwrap_or(0)
    }

    /// Store `entry` unless the project was invalidated since `epoch`.
    fn put(&self, project: &str, epoch: u64, entry: StaticEntry) -> Option<Arc<StaticEntry>> {
        let mut inner = self.inner.write();
        if inner.epochs.get(project).copied().unwrap_or(0) != epoch {
            tracing::debug!(project, "static context invalidated during fetch, discarded");
            return None;
        }
        let entry = Arc::new(entry);
        inner.entries.insert(project.to_owned(), entry.clone());
        Some(entry)
    }

    /// The cached entry, or a fresh one built from team memory.
    ///
    /// A memory failure is cached as an entry without a block until the
    /// failure TTL passes or the project is invalidated.
    pub async fn resolve(
        &self,
        project: &str,
        memory: &dyn MemoryProvider,
        config: &Config,
    ) -> Option<Arc<StaticEntry>> {
        if let Some(hit) = self.get(project).filter(|e| e.is_live(Utc::now())) {
            return Some(hit);
        }
        self.refresh(project, memory, config).await
    }

    /// Rebuild the entry for `project` regardless of what is cached.
    pub async fn refresh(
        &self,
        project: &str,
        memory: &dyn MemoryProvider,
        config: &Config,
    ) -> Option<Arc<StaticEntry>> {
        let epoch = self.epoch(project);
        let query = MemoryQuery {
            team_id: config
                .memory
                .team_id
                .clone()
                .unwrap_or_else(|| project.to_owned()),
            project: project.to_owned(),
            limit: config.memory.limit,
            ..Default::default()
        };

        let entry = match memory.fetch_team_memories(query).await {
            Ok(memories) => {
                let entry = build_entry(project, &memories, config.injection.max_static_chars);
                TraceEvent::StaticContextBuilt {
                    project: project.to_owned(),
                    memories: entry.report.included(),
                    chars: entry.report.total_injected_chars,
                }
                .emit();
                entry
            }
            Err(e) => {
                tracing::warn!(
                    project,
                    error = %e,
                    retry_in_secs = config.memory.failure_ttl_secs,
                    "team memory lookup failed, no static context"
                );
                StaticEntry::failed(Utc::now(), config.memory.failure_ttl_secs)
            }
        };
        self.put(project, epoch, entry)
    }
}

fn build_entry(project: &str, memories: &[MemoryDto], max_chars: usize) -> StaticEntry {
    let snippets: Vec<MemorySnippet> = memories
        .iter()
        .map(|m| MemorySnippet {
            title: m.goal.lines().next().unwrap_or_default().to_owned(),
            content: m.render(),
        })
        .collect();
    let (block, report) = StaticContextBuilder::new(max_chars).build(project, &snippets);
    StaticEntry {
        block,
        report,
        built_at: Utc::now(),
        expires_at: None,
    }
}

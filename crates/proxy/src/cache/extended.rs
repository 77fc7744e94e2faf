//! Extended Cache Keeper.
//!
//! Tracks the last real request per project and, while the agent is idle,
//! replays it with one trivial user turn spliced in so the upstream prompt
//! cache does not expire. Entries are dropped once the agent has been idle
//! past `max_idle_secs`, after `max_keep_alives`, or on any failed
//! keep-alive.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::http::{HeaderMap, Method};
use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

use dg_domain::config::ExtendedCacheConfig;
use dg_domain::trace::TraceEvent;
use dg_upstream::Forwarder;

use crate::runtime::MESSAGES_PATH;

use super::splice;

#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Allow-listed headers of the last real request.
    pub headers: HeaderMap,
    /// Exact bytes of the last real request.
    pub body: Bytes,
    pub last_activity: DateTime<Utc>,
    pub keep_alives_sent: u32,
    /// Changes whenever a real request replaces the entry.
    pub generation: u64,
}

/// A keep-alive due in this tick.
struct Job {
    project: String,
    generation: u64,
    headers: HeaderMap,
    body: Bytes,
    attempt: u32,
}

/// What one tick did.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    pub sent: usize,
    pub succeeded: usize,
    pub evicted: Vec<String>,
}

pub struct ExtendedCache {
    cfg: ExtendedCacheConfig,
    entries: Mutex<HashMap<String, CacheEntry>>,
    next_generation: AtomicU64,
}

impl ExtendedCache {
    pub fn new(cfg: ExtendedCacheConfig) -> Self {
        Self {
            cfg,
            entries: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(1),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, project: &str) -> Option<CacheEntry> {
        self.entries.lock().get(project).cloned()
    }

    /// Replace the entry for `project` with a real request that just
    /// succeeded. Evicts the globally oldest entry when over capacity.
    pub fn record(&self, project: &str, headers: HeaderMap, body: Bytes, now: DateTime<Utc>) {
        if !self.cfg.enabled {
            return;
        }
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let mut entries = self.entries.lock();
        entries.insert(
            project.to_owned(),
            CacheEntry {
                headers,
                body,
                last_activity: now,
                keep_alives_sent: 0,
                generation,
            },
        );

        while entries.len() > self.cfg.max_entries {
            let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, e)| e.last_activity)
                .map(|(k, _)| k.clone())
            else {
                break;
            };
            entries.remove(&oldest);
            TraceEvent::KeepAliveEvicted {
                project: oldest,
                reason: "capacity".into(),
            }
            .emit();
        }
    }

    pub fn remove(&self, project: &str) {
        self.entries.lock().remove(project);
    }

    /// Drop idle entries and collect the keep-alives due at `now`.
    fn plan(&self, now: DateTime<Utc>, report: &mut TickReport) -> Vec<Job> {
        let max_idle = Duration::seconds(self.cfg.max_idle_secs as i64);
        let due_after = Duration::seconds(self.cfg.keep_alive_after_secs as i64);
        let mut jobs = Vec::new();
        let mut entries = self.entries.lock();

        entries.retain(|project, e| {
            let idle = now - e.last_activity;
            if idle > max_idle {
                evicted(project, "idle", report);
                return false;
            }
            if idle < due_after {
                return true;
            }
            if e.keep_alives_sent >= self.cfg.max_keep_alives {
                evicted(project, "exhausted", report);
                return false;
            }
            match splice::keep_alive_body(&e.body) {
                Some(body) => {
                    jobs.push(Job {
                        project: project.clone(),
                        generation: e.generation,
                        headers: e.headers.clone(),
                        body: Bytes::from(body),
                        attempt: e.keep_alives_sent + 1,
                    });
                    true
                }
                None => {
                    evicted(project, "unsplicable", report);
                    false
                }
            }
        });
        jobs
    }

    /// One sweep: evict, then send every due keep-alive concurrently and
    /// wait for all of them.
    pub async fn tick(&self, forwarder: &Forwarder, now: DateTime<Utc>) -> TickReport {
        let mut report = TickReport::default();
        if !self.cfg.enabled {
            return report;
        }
        let jobs = self.plan(now, &mut report);
        report.sent = jobs.len();

        let results = futures_util::future::join_all(jobs.into_iter().map(|job| async move {
            let status = forwarder
                .send(Method::POST, MESSAGES_PATH, &job.headers, job.body.clone())
                .await
                .map(|r| r.status);
            (job, status)
        }))
        .await;

        let mut entries = self.entries.lock();
        for (job, status) in results {
            TraceEvent::KeepAliveSent {
                project: job.project.clone(),
                attempt: job.attempt,
                status: *status.as_ref().unwrap_or(&0),
            }
            .emit();

            // A real request replaced the entry while we were waiting.
            let Some(entry) = entries.get_mut(&job.project) else {
                continue;
            };
            if entry.generation != job.generation {
                continue;
            }
            match status {
                Ok(200) => {
                    entry.keep_alives_sent += 1;
                    entry.last_activity = now;
                    report.succeeded += 1;
                }
                Ok(status) => {
                    tracing::warn!(project = %job.project, status, "keep-alive rejected");
                    entries.remove(&job.project);
                    evicted(&job.project, "rejected", &mut report);
                }
                Err(e) => {
                    tracing::warn!(project = %job.project, error = %e, "keep-alive failed");
                    entries.remove(&job.project);
                    evicted(&job.project, "failed", &mut report);
                }
            }
        }
        report
    }
}

fn evicted(project: &str, reason: &str, report: &mut TickReport) {
    TraceEvent::KeepAliveEvicted {
        project: project.to_owned(),
        reason: reason.to_owned(),
    }
    .emit();
    report.evicted.push(project.to_owned());
}

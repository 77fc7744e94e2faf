//! AppState construction and background-task spawning.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;

use dg_domain::config::{Config, ConfigSeverity};
use dg_domain::task::{TaskStatus, TriggerReason};
use dg_drift::create_judge;
use dg_memory::create_provider as create_memory_provider;

use crate::runtime::finalize;
use crate::state::AppState;

/// Validate config, build the collaborators and return a fully-wired
/// [`AppState`].
pub fn build_app_state(config: Arc<Config>) -> anyhow::Result<AppState> {
    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    // ── Collaborators ────────────────────────────────────────────────
    let judge = create_judge(&config.judge).context("initializing drift judge")?;
    let memory = create_memory_provider(&config.memory).context("initializing team memory")?;

    // ── Stores & caches ──────────────────────────────────────────────
    let state = AppState::with_collaborators(config.clone(), judge, memory)
        .with_context(|| format!("opening state at {}", config.server.state_path.display()))?;

    tracing::info!(
        upstream = %state.forwarder.base_url(),
        sessions = state.sessions.list().len(),
        tasks = state.tasks.list().len(),
        drift = config.drift.enabled,
        extended_cache = config.extended_cache.enabled,
        "driftguard state ready"
    );
    Ok(state)
}

/// Spawn the periodic loops: store flush, stale-session sweep, memory sync
/// retry and the extended cache keeper.
pub fn spawn_background_tasks(state: &AppState) {
    // ── Periodic store flush ─────────────────────────────────────────
    {
        let sessions = state.sessions.clone();
        let tasks = state.tasks.clone();
        let every = state.config.sessions.flush_interval_secs.max(1);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(every));
            loop {
                interval.tick().await;
                if let Err(e) = sessions.flush() {
                    tracing::warn!(error = %e, "session store flush failed");
                }
                if let Err(e) = tasks.flush() {
                    tracing::warn!(error = %e, "task store flush failed");
                }
            }
        });
    }

    // ── Stale session sweep + failed sync retry ──────────────────────
    {
        let app = state.clone();
        let every = state.config.sessions.sweep_interval_secs.max(1);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(every));
            loop {
                interval.tick().await;
                sweep(&app);
                retry_failed_syncs(&app);
            }
        });
    }

    // ── Extended cache keeper ────────────────────────────────────────
    if state.config.extended_cache.enabled {
        let cache = state.extended_cache.clone();
        let forwarder = state.forwarder.clone();
        let every = state.config.extended_cache.tick_secs.max(1);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(every));
            loop {
                interval.tick().await;
                let report = cache.tick(&forwarder, Utc::now()).await;
                if report.sent > 0 || !report.evicted.is_empty() {
                    tracing::debug!(
                        sent = report.sent,
                        succeeded = report.succeeded,
                        evicted = report.evicted.len(),
                        remaining = cache.len(),
                        "extended cache tick"
                    );
                }
            }
        });
    }
}

/// Abandon idle sessions and record the tasks they were running.
pub fn sweep(app: &AppState) -> usize {
    let swept = app
        .sessions
        .sweep_stale(Utc::now(), u64::from(app.config.sessions.stale_minutes));
    for snapshot in &swept {
        finalize::record(app, snapshot, TriggerReason::Abandoned, TaskStatus::Abandoned);
    }
    if !swept.is_empty() {
        tracing::info!(count = swept.len(), "stale sessions abandoned");
    }
    swept.len()
}

/// Re-run memory syncs that failed. Records still waiting on their first
/// attempt carry no error and are left alone.
fn retry_failed_syncs(app: &AppState) {
    if app.memory.is_none() {
        return;
    }
    for record in app.tasks.unsynced() {
        if record.sync_error.is_some() {
            tracing::debug!(task_id = %record.id, "retrying task sync");
            finalize::spawn_sync(app, record);
        }
    }
}

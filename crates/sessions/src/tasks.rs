//! Finalized task records.
//!
//! Persisted in `tasks.json` under the state path. Records are written once
//! by the Turn Finalizer; afterwards only their sync status changes.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use dg_domain::error::Result;
use dg_domain::task::TaskRecord;

pub struct TaskStore {
    path: PathBuf,
    tasks: RwLock<Vec<TaskRecord>>,
}

impl TaskStore {
    pub fn new(state_path: &Path) -> Result<Self> {
        std::fs::create_dir_all(state_path)?;
        let path = state_path.join("tasks.json");
        let tasks: Vec<TaskRecord> = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            serde_json::from_str(&raw).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "tasks.json unreadable, starting empty");
                Vec::new()
            })
        } else {
            Vec::new()
        };
        tracing::info!(tasks = tasks.len(), path = %path.display(), "task store loaded");
        Ok(Self {
            path,
            tasks: RwLock::new(tasks),
        })
    }

    /// Store a new record. A record with an existing id is ignored.
    pub fn insert(&self, record: TaskRecord) -> Result<bool> {
        {
            let mut tasks = self.tasks.write();
            if tasks.iter().any(|t| t.id == record.id) {
                return Ok(false);
            }
            tasks.push(record);
        }
        self.flush()?;
        Ok(true)
    }

    pub fn get(&self, id: &str) -> Option<TaskRecord> {
        self.tasks.read().iter().find(|t| t.id == id).cloned()
    }

    /// Newest first.
    pub fn list(&self) -> Vec<TaskRecord> {
        let mut out = self.tasks.read().clone();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        out
    }

    /// Records whose last sync failed or never ran.
    pub fn unsynced(&self) -> Vec<TaskRecord> {
        self.tasks
            .read()
            .iter()
            .filter(|t| !t.is_synced())
            .cloned()
            .collect()
    }

    pub fn mark_synced(&self, id: &str, at: DateTime<Utc>) -> Result<()> {
        self.set_sync(id, |t| {
            t.synced_at = Some(at);
            t.sync_error = None;
        })
    }

    pub fn mark_failed(&self, id: &str, error: impl Into<String>) -> Result<()> {
        let error = error.into();
        self.set_sync(id, move |t| {
            t.synced_at = None;
            t.sync_error = Some(error);
        })
    }

    fn set_sync(&self, id: &str, f: impl FnOnce(&mut TaskRecord)) -> Result<()> {
        let found = {
            let mut tasks = self.tasks.write();
            match tasks.iter_mut().find(|t| t.id == id) {
                Some(t) => {
                    f(t);
                    true
                }
                None => false,
            }
        };
        if found {
            self.flush()?;
        }
        Ok(())
    }

    pub fn flush(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&*self.tasks.read())?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dg_domain::task::{TaskStatus, TriggerReason};

    fn record(id: &str) -> TaskRecord {
        TaskRecord {
            id: id.into(),
            session_id: "s".into(),
            project: "/p".into(),
            user_id: "u".into(),
            goal: "g".into(),
            reasoning_trace: vec![],
            files_touched: vec![],
            decisions: vec![],
            constraints: vec![],
            status: TaskStatus::Completed,
            trigger: TriggerReason::Complete,
            planning_only: false,
            created_at: Utc::now(),
            synced_at: None,
            sync_error: None,
        }
    }

    #[test]
    fn insert_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = TaskStore::new(dir.path()).unwrap();
        assert!(store.insert(record("t1")).unwrap());
        assert!(!store.insert(record("t1")).unwrap());
        assert_eq!(store.list().len(), 1);
    }

    #[test]
    fn sync_status_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = TaskStore::new(dir.path()).unwrap();
            store.insert(record("t1")).unwrap();
            store.insert(record("t2")).unwrap();
            store.mark_failed("t1", "connection refused").unwrap();
            store.mark_synced("t2", Utc::now()).unwrap();
        }
        let store = TaskStore::new(dir.path()).unwrap();
        let t1 = store.get("t1").unwrap();
        assert_eq!(t1.sync_error.as_deref(), Some("connection refused"));
        assert!(store.get("t2").unwrap().is_synced());
        let unsynced: Vec<String> = store.unsynced().into_iter().map(|t| t.id).collect();
        assert_eq!(unsynced, vec!["t1"]);
    }

    #[test]
    fn successful_retry_clears_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = TaskStore::new(dir.path()).unwrap();
        store.insert(record("t1")).unwrap();
        store.mark_failed("t1", "boom").unwrap();
        store.mark_synced("t1", Utc::now()).unwrap();
        let t = store.get("t1").unwrap();
        assert!(t.is_synced());
        assert!(t.sync_error.is_none());
    }
}

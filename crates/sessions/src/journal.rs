//! Append-only JSONL journals.
//!
//! Each key gets a `<key>.jsonl` file under the journal directory and every
//! record is one JSON line. Reads go through an in-memory write-through cache
//! so a key is only loaded from disk once.

use std::collections::HashMap;
use std::io::Write;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;

use dg_domain::error::{Error, Result};

type Cache<T> = Arc<RwLock<HashMap<String, Vec<T>>>>;

pub struct Journal<T> {
    base_dir: PathBuf,
    /// Held for writing across every file append, so a cold read never
    /// loads lines that the append is about to add again.
    cache: Cache<T>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Journal<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    pub fn new(base_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(base_dir)?;
        Ok(Self {
            base_dir: base_dir.to_path_buf(),
            cache: Arc::new(RwLock::new(HashMap::new())),
            _marker: PhantomData,
        })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.base_dir.join(format!("{}.jsonl", sanitize(key)))
    }

    /// Append records. Disk first; the cache is only updated if the write
    /// succeeded.
    pub fn append(&self, key: &str, records: Vec<T>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let buf = serialize_lines(&records)?;
        write_through(&self.cache, &self.path_for(key), key, &buf, records)
    }

    /// Append from async code without blocking the runtime on file I/O.
    pub async fn append_async(&self, key: &str, records: Vec<T>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let buf = serialize_lines(&records)?;
        let path = self.path_for(key);
        let cache = self.cache.clone();
        let key = key.to_owned();
        tokio::task::spawn_blocking(move || write_through(&cache, &path, &key, &buf, records))
            .await
            .map_err(|e| Error::Other(format!("spawn_blocking join: {e}")))?
    }

    /// All records for `key` in append order. The key stays cached until
    /// [`Journal::forget`].
    pub fn read(&self, key: &str) -> Result<Vec<T>> {
        if let Some(lines) = self.cache.read().get(key) {
            return Ok(lines.clone());
        }
        let mut cache = self.cache.write();
        if let Some(lines) = cache.get(key) {
            return Ok(lines.clone());
        }
        let lines = read_jsonl_file::<T>(&self.path_for(key))?;
        cache.insert(key.to_owned(), lines.clone());
        Ok(lines)
    }

    /// All records for `key` straight from disk, leaving the cache alone.
    pub fn read_uncached(&self, key: &str) -> Result<Vec<T>> {
        // No append can run while the read lock is held.
        let cache = self.cache.read();
        if let Some(lines) = cache.get(key) {
            return Ok(lines.clone());
        }
        read_jsonl_file::<T>(&self.path_for(key))
    }

    /// Drop the cached copy of `key`. The file is kept.
    pub fn forget(&self, key: &str) {
        self.cache.write().remove(key);
    }
}

fn write_through<T>(cache: &Cache<T>, path: &Path, key: &str, buf: &str, records: Vec<T>) -> Result<()> {
    let mut cache = cache.write();
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    file.write_all(buf.as_bytes())?;
    if let Some(cached) = cache.get_mut(key) {
        cached.extend(records);
    }
    Ok(())
}

/// Keys come from agent-controlled ids; keep them inside the directory.
fn sanitize(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn serialize_lines<T: Serialize>(records: &[T]) -> Result<String> {
    let mut buf = String::new();
    for r in records {
        buf.push_str(&serde_json::to_string(r)?);
        buf.push('\n');
    }
    Ok(buf)
}

fn read_jsonl_file<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let raw = std::fs::read_to_string(path)?;
    let mut out = Vec::new();
    for line in raw.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<T>(line) {
            Ok(r) => out.push(r),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "skipping malformed journal line"
                );
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Line {
        n: u32,
    }

    #[test]
    fn append_then_read_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let j: Journal<Line> = Journal::new(dir.path()).unwrap();
        j.append("k", vec![Line { n: 1 }, Line { n: 2 }]).unwrap();
        j.append("k", vec![Line { n: 3 }]).unwrap();
        let got: Vec<u32> = j.read("k").unwrap().into_iter().map(|l| l.n).collect();
        assert_eq!(got, vec![1, 2, 3]);
    }

    #[test]
    fn survives_reload_and_skips_garbage() {
        let dir = tempfile::tempdir().unwrap();
        {
            let j: Journal<Line> = Journal::new(dir.path()).unwrap();
            j.append("k", vec![Line { n: 7 }]).unwrap();
        }
        let path = dir.path().join("k.jsonl");
        let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        f.write_all(b"{broken\n").unwrap();

        let j: Journal<Line> = Journal::new(dir.path()).unwrap();
        assert_eq!(j.read("k").unwrap(), vec![Line { n: 7 }]);
    }

    #[test]
    fn cached_read_sees_later_appends() {
        let dir = tempfile::tempdir().unwrap();
        let j: Journal<Line> = Journal::new(dir.path()).unwrap();
        assert!(j.read("k").unwrap().is_empty());
        j.append("k", vec![Line { n: 1 }]).unwrap();
        assert_eq!(j.read("k").unwrap().len(), 1);
    }

    #[test]
    fn keys_cannot_escape_the_directory() {
        let dir = tempfile::tempdir().unwrap();
        let j: Journal<Line> = Journal::new(dir.path()).unwrap();
        j.append("../../etc/x", vec![Line { n: 1 }]).unwrap();
        assert!(dir.path().join("______etc_x.jsonl").exists());
    }

    #[tokio::test]
    async fn async_append() {
        let dir = tempfile::tempdir().unwrap();
        let j: Journal<Line> = Journal::new(dir.path()).unwrap();
        j.append_async("a", vec![Line { n: 5 }]).await.unwrap();
        assert_eq!(j.read("a").unwrap(), vec![Line { n: 5 }]);
    }

    #[test]
    fn uncached_read_does_not_fill_the_cache() {
        let dir = tempfile::tempdir().unwrap();
        let j: Journal<Line> = Journal::new(dir.path()).unwrap();
        j.append("log", vec![Line { n: 1 }]).unwrap();
        assert_eq!(j.read_uncached("log").unwrap(), vec![Line { n: 1 }]);
        assert!(j.cache.read().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn reads_racing_appends_never_duplicate() {
        let dir = tempfile::tempdir().unwrap();
        let j: Arc<Journal<Line>> = Arc::new(Journal::new(dir.path()).unwrap());

        let writer = {
            let j = j.clone();
            tokio::spawn(async move {
                for n in 0..200 {
                    j.append_async("k", vec![Line { n }]).await.unwrap();
                }
            })
        };
        let reader = {
            let j = j.clone();
            tokio::task::spawn_blocking(move || {
                for _ in 0..200 {
                    j.forget("k");
                    let _ = j.read("k").unwrap();
                }
            })
        };
        writer.await.unwrap();
        reader.await.unwrap();

        let got: Vec<u32> = j.read("k").unwrap().into_iter().map(|l| l.n).collect();
        assert_eq!(got, (0..200).collect::<Vec<u32>>());
    }
}

//! Persisted session history with compaction.
//!
//! File format: a single JSON object in `~/.toolweave/sessions.json`
//! mapping session id → `{"summary": "...", "recent": [{"role", "content", "tools"}]}`.
//!
//! Two lock levels keep concurrent sessions from clobbering each other:
//! - a per-id lock around load → append → compact → save for that id
//! - a store-wide I/O lock around the file read-merge-write

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::types::{HistoryEntry, SessionRecord};

/// Entries kept verbatim in `recent` before folding.
pub const DEFAULT_MAX_RECENT: usize = 6;

#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("history I/O failed on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("history encode failed: {0}")]
    Encode(#[from] serde_json::Error),
}

type Records = BTreeMap<String, SessionRecord>;

// ─────────────────────────────────────────────
// Compaction
// ─────────────────────────────────────────────

/// Fold the oldest entries of `record.recent` into `record.summary` until at
/// most `max_recent` remain. Returns how many entries were folded.
///
/// Each folded entry becomes one `role: content` line appended after any
/// existing summary text.
pub fn compact(record: &mut SessionRecord, max_recent: usize) -> usize {
    let overflow = record.recent.len().saturating_sub(max_recent);
    if overflow == 0 {
        return 0;
    }
    for entry in record.recent.drain(..overflow) {
        let line = format!("{}: {}", entry.role, entry.content);
        record.summary = format!("{}\n{}", record.summary, line).trim().to_string();
    }
    overflow
}

// ─────────────────────────────────────────────
// HistoryStore
// ─────────────────────────────────────────────

/// Durable `{summary, recent}` records keyed by session id.
pub struct HistoryStore {
    path: PathBuf,
    max_recent: usize,
    key_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    io_lock: tokio::sync::Mutex<()>,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>, max_recent: usize) -> Self {
        Self {
            path: path.into(),
            max_recent,
            key_locks: Mutex::new(HashMap::new()),
            io_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn max_recent(&self) -> usize {
        self.max_recent
    }

    fn key_lock(&self, id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.key_locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(id.to_string()).or_default().clone()
    }

    /// Forget `id`'s lock once no other task holds a clone of it.
    fn release_key_lock(&self, id: &str, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self.key_locks.lock().unwrap_or_else(|e| e.into_inner());
        let unused = locks
            .get(id)
            .is_some_and(|held| Arc::ptr_eq(held, &lock) && Arc::strong_count(&lock) == 2);
        if unused {
            locks.remove(id);
        }
    }

    /// The persisted record for `id`, or an empty one.
    pub async fn load(&self, id: &str) -> SessionRecord {
        let _io = self.io_lock.lock().await;
        self.read_all().await.remove(id).unwrap_or_default()
    }

    /// Ids of all persisted sessions, sorted.
    pub async fn ids(&self) -> Vec<String> {
        let _io = self.io_lock.lock().await;
        self.read_all().await.into_keys().collect()
    }

    /// Append entries to `id`'s record, compact it, and save.
    /// Returns the record as written.
    pub async fn append(
        &self,
        id: &str,
        entries: Vec<HistoryEntry>,
    ) -> Result<SessionRecord, HistoryError> {
        let lock = self.key_lock(id);
        let result = {
            let _key = lock.lock().await;
            self.append_locked(id, entries).await
        };
        self.release_key_lock(id, lock);
        result
    }

    async fn append_locked(
        &self,
        id: &str,
        entries: Vec<HistoryEntry>,
    ) -> Result<SessionRecord, HistoryError> {
        let _io = self.io_lock.lock().await;
        let mut all = self.read_all().await;
        let record = all.entry(id.to_string()).or_default();
        record.recent.extend(entries);
        let folded = compact(record, self.max_recent);
        if folded > 0 {
            debug!(session = id, folded, "Compacted session history");
        }
        let written = record.clone();
        self.write_all(&all).await?;
        Ok(written)
    }

    /// Remove `id`'s record. Returns whether it existed.
    pub async fn delete(&self, id: &str) -> Result<bool, HistoryError> {
        let lock = self.key_lock(id);
        let _key = lock.lock().await;

        let existed = {
            let _io = self.io_lock.lock().await;
            let mut all = self.read_all().await;
            let existed = all.remove(id).is_some();
            if existed {
                self.write_all(&all).await?;
            }
            existed
        };

        self.key_locks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id);
        Ok(existed)
    }

    /// Read the whole file. Missing or corrupt files read as empty.
    async fn read_all(&self) -> Records {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Records::new(),
            Err(e) => {
                warn!("Failed to read history {}: {}", self.path.display(), e);
                return Records::new();
            }
        };
        if content.trim().is_empty() {
            return Records::new();
        }
        match serde_json::from_str(&content) {
            Ok(records) => records,
            Err(e) => {
                warn!("Ignoring corrupt history {}: {}", self.path.display(), e);
                Records::new()
            }
        }
    }

    /// Write through a temp file and rename it into place.
    async fn write_all(&self, records: &Records) -> Result<(), HistoryError> {
        let io_err = |source| HistoryError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
            }
        }

        let json = serde_json::to_string_pretty(records)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(io_err)?;
        debug!("Saved {} session record(s) to {}", records.len(), self.path.display());
        Ok(())
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

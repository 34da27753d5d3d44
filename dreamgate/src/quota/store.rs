//! Persistent usage row storage.
//!
//! The whole ledger is one JSON document mapping `{session}_{date}` keys
//! to usage rows. Every mutation rewrites the document via a temp file
//! and an atomic rename, so a crash can lose at most the in-flight
//! mutation, never corrupt the file. A restart rebuilds the live map from
//! the document.

use super::types::SessionDailyUsage;
use super::QuotaError;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{info, warn};

/// File name of the ledger document inside the data directory.
pub const USAGE_FILE_NAME: &str = "session_usage.json";

/// In-memory row map backed by the JSON document.
pub struct UsageStore {
    path: PathBuf,
    rows: RwLock<HashMap<String, SessionDailyUsage>>,
}

impl UsageStore {
    /// Opens the store, loading any existing document.
    ///
    /// The data directory is created if missing. An unreadable document is
    /// an error; an absent one starts empty.
    pub fn open(data_dir: &Path) -> Result<Self, QuotaError> {
        std::fs::create_dir_all(data_dir)
            .map_err(|e| QuotaError::Io(format!("cannot create data dir: {}", e)))?;
        let path = data_dir.join(USAGE_FILE_NAME);

        let rows = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .map_err(|e| QuotaError::Io(format!("cannot read {}: {}", path.display(), e)))?;
            match serde_json::from_str::<HashMap<String, SessionDailyUsage>>(&content) {
                Ok(rows) => rows,
                Err(e) => {
                    // A torn document should never happen given atomic
                    // replacement, but refusing to start over it would
                    // brick the gateway.
                    warn!(error = %e, "Usage document unparseable, starting empty");
                    HashMap::new()
                }
            }
        } else {
            HashMap::new()
        };

        info!(
            path = %path.display(),
            rows = rows.len(),
            "Usage store opened"
        );
        Ok(Self {
            path,
            rows: RwLock::new(rows),
        })
    }

    /// Reads one row by key.
    pub fn get(&self, key: &str) -> Option<SessionDailyUsage> {
        self.rows.read().unwrap_or_else(|e| e.into_inner()).get(key).cloned()
    }

    /// Reads one row, inserting a zeroed row when absent.
    ///
    /// Creation is in-memory only; zero counts carry no information worth
    /// an fsync. The first increment persists the row.
    pub fn get_or_create(
        &self,
        key: &str,
        create: impl FnOnce() -> SessionDailyUsage,
    ) -> SessionDailyUsage {
        let mut rows = self.rows.write().unwrap_or_else(|e| e.into_inner());
        rows.entry(key.to_string()).or_insert_with(create).clone()
    }

    /// Writes one row and persists the document.
    pub fn put(&self, row: SessionDailyUsage) -> Result<(), QuotaError> {
        let snapshot = {
            let mut rows = self.rows.write().unwrap_or_else(|e| e.into_inner());
            rows.insert(row.key(), row);
            rows.clone()
        };
        self.persist(&snapshot)
    }

    /// Removes every row older than `cutoff` (exclusive) and persists.
    ///
    /// Returns the number of removed rows.
    pub fn remove_older_than(&self, cutoff: chrono::NaiveDate) -> Result<usize, QuotaError> {
        let (snapshot, removed) = {
            let mut rows = self.rows.write().unwrap_or_else(|e| e.into_inner());
            let before = rows.len();
            rows.retain(|_, row| row.date >= cutoff);
            (rows.clone(), before - rows.len())
        };
        if removed > 0 {
            self.persist(&snapshot)?;
        }
        Ok(removed)
    }

    /// Snapshot of all rows, for the stats queries.
    pub fn snapshot(&self) -> HashMap<String, SessionDailyUsage> {
        self.rows.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Number of rows currently held.
    pub fn len(&self) -> usize {
        self.rows.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// True when the store holds no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Serializes `rows` and atomically replaces the document.
    fn persist(&self, rows: &HashMap<String, SessionDailyUsage>) -> Result<(), QuotaError> {
        let json = serde_json::to_string_pretty(rows)
            .map_err(|e| QuotaError::Io(format!("serialize usage rows: {}", e)))?;

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .map_err(|e| QuotaError::Io(format!("write {}: {}", tmp.display(), e)))?;
        std::fs::rename(&tmp, &self.path)
            .map_err(|e| QuotaError::Io(format!("rename into {}: {}", self.path.display(), e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quota::types::usage_key;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_open_creates_data_dir() {
        let temp = tempfile::TempDir::new().unwrap();
        let dir = temp.path().join("nested/data");
        let store = UsageStore::open(&dir).unwrap();
        assert!(dir.exists());
        assert!(store.is_empty());
    }

    #[test]
    fn test_put_then_get() {
        let temp = tempfile::TempDir::new().unwrap();
        let store = UsageStore::open(temp.path()).unwrap();

        let mut row = SessionDailyUsage::new("session_a", date(2026, 8, 2));
        row.record(crate::quota::ServiceKind::Image);
        let key = row.key();
        store.put(row).unwrap();

        let read = store.get(&key).unwrap();
        assert_eq!(read.image_count, 1);
    }

    #[test]
    fn test_persists_across_reopen() {
        let temp = tempfile::TempDir::new().unwrap();
        let key;
        {
            let store = UsageStore::open(temp.path()).unwrap();
            let mut row = SessionDailyUsage::new("session_a", date(2026, 8, 2));
            row.record(crate::quota::ServiceKind::Video);
            key = row.key();
            store.put(row).unwrap();
        }

        let reopened = UsageStore::open(temp.path()).unwrap();
        let read = reopened.get(&key).unwrap();
        assert_eq!(read.video_count, 1);
    }

    #[test]
    fn test_get_or_create_does_not_persist_zero_rows() {
        let temp = tempfile::TempDir::new().unwrap();
        let store = UsageStore::open(temp.path()).unwrap();
        let key = usage_key("session_b", date(2026, 8, 2));

        store.get_or_create(&key, || SessionDailyUsage::new("session_b", date(2026, 8, 2)));
        assert_eq!(store.len(), 1);

        // The document on disk was not written for the zero row.
        let reopened = UsageStore::open(temp.path()).unwrap();
        assert!(reopened.is_empty());
    }

    #[test]
    fn test_remove_older_than() {
        let temp = tempfile::TempDir::new().unwrap();
        let store = UsageStore::open(temp.path()).unwrap();

        store
            .put(SessionDailyUsage::new("s1", date(2026, 7, 1)))
            .unwrap();
        store
            .put(SessionDailyUsage::new("s1", date(2026, 8, 1)))
            .unwrap();
        store
            .put(SessionDailyUsage::new("s2", date(2026, 6, 15)))
            .unwrap();

        let removed = store.remove_older_than(date(2026, 7, 15)).unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.len(), 1);

        // Removal is durable.
        let reopened = UsageStore::open(temp.path()).unwrap();
        assert_eq!(reopened.len(), 1);
    }

    #[test]
    fn test_unparseable_document_starts_empty() {
        let temp = tempfile::TempDir::new().unwrap();
        std::fs::write(temp.path().join(USAGE_FILE_NAME), "{ not json").unwrap();
        let store = UsageStore::open(temp.path()).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_no_tmp_file_left_behind() {
        let temp = tempfile::TempDir::new().unwrap();
        let store = UsageStore::open(temp.path()).unwrap();
        store
            .put(SessionDailyUsage::new("s1", date(2026, 8, 2)))
            .unwrap();

        let leftovers: Vec<_> = std::fs::read_dir(temp.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }
}

//! Checksum store: last observed fingerprint per range key.
//!
//! Persists a flat JSON object `{ "<sheetId>:<tab>": "<sha256 hex>" }` at
//! `<data_dir>/checksums.json`. Writes use the same atomic `.tmp` + rename
//! pattern as the mapping registry.
//!
//! Loading and persisting never fail the caller: sync correctness only needs
//! the store to converge over later cycles, not to survive a crash.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use sheetsync_core::{Fingerprint, RangeKey};

use crate::error::{io_err, SyncError};

/// On-disk shape. Older deployments wrote `null` for invalidated keys.
type ChecksumFile = BTreeMap<String, Option<String>>;

/// `<data_dir>/checksums.json`: pure, no I/O.
pub fn store_path_at(data_dir: &Path) -> PathBuf {
    data_dir.join("checksums.json")
}

/// In-memory checksum store bound to a backing file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChecksumStore {
    path: PathBuf,
    entries: BTreeMap<RangeKey, Fingerprint>,
}

impl ChecksumStore {
    /// Empty store that persists to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: BTreeMap::new(),
        }
    }

    /// Load the store from `path`.
    ///
    /// A missing or unreadable/corrupt file is logged and yields an empty store.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match read_entries(&path) {
            Ok(Some(entries)) => {
                tracing::info!(path = %path.display(), entries = entries.len(), "checksum store loaded");
                Self { path, entries }
            }
            Ok(None) => {
                tracing::info!(path = %path.display(), "no checksum store found, starting empty");
                Self::new(path)
            }
            Err(err) => {
                tracing::error!(path = %path.display(), error = %err, "failed to load checksum store, starting empty");
                Self::new(path)
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &RangeKey) -> Option<&Fingerprint> {
        self.entries.get(key)
    }

    /// Record `value` for `key`; `None` clears the entry back to "never observed".
    pub fn set(&mut self, key: RangeKey, value: Option<Fingerprint>) {
        match value {
            Some(fp) => {
                self.entries.insert(key, fp);
            }
            None => {
                self.entries.remove(&key);
            }
        }
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write the store to its backing file. Failures are logged; returns
    /// whether the write succeeded.
    pub fn persist(&self) -> bool {
        match self.try_persist() {
            Ok(()) => {
                tracing::debug!(path = %self.path.display(), entries = self.entries.len(), "checksum store saved");
                true
            }
            Err(err) => {
                tracing::error!(path = %self.path.display(), error = %err, "failed to save checksum store");
                false
            }
        }
    }

    fn try_persist(&self) -> Result<(), SyncError> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
            }
        }

        let file: ChecksumFile = self
            .entries
            .iter()
            .map(|(k, v)| (k.0.clone(), Some(v.0.clone())))
            .collect();
        let json = serde_json::to_string_pretty(&file)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, &json).map_err(|e| io_err(&tmp, e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| io_err(&self.path, e))?;
        Ok(())
    }
}

fn read_entries(path: &Path) -> Result<Option<BTreeMap<RangeKey, Fingerprint>>, SyncError> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    let file: ChecksumFile = serde_json::from_str(&contents)?;
    Ok(Some(
        file.into_iter()
            .filter_map(|(k, v)| v.map(|fp| (RangeKey(k), Fingerprint(fp))))
            .collect(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn key(s: &str) -> RangeKey {
        RangeKey::from(s)
    }

    #[test]
    fn empty_store_when_file_missing() {
        let tmp = TempDir::new().unwrap();
        let store = ChecksumStore::load(store_path_at(tmp.path()));
        assert!(store.is_empty());
    }

    #[test]
    fn corrupt_file_loads_as_empty() {
        let tmp = TempDir::new().unwrap();
        let path = store_path_at(tmp.path());
        std::fs::write(&path, "{ not json").unwrap();
        let store = ChecksumStore::load(&path);
        assert!(store.is_empty());
        assert_eq!(store.path(), path.as_path());
    }

    #[test]
    fn roundtrip_persist_load() {
        let tmp = TempDir::new().unwrap();
        let path = store_path_at(tmp.path());
        let mut store = ChecksumStore::new(&path);
        store.set(key("SheetA:Tab1"), Some(Fingerprint::from("deadbeef")));
        store.set(key("SheetB:Tab1"), Some(Fingerprint::from("cafebabe")));

        assert!(store.persist());
        let loaded = ChecksumStore::load(&path);
        assert_eq!(loaded, store);
    }

    #[test]
    fn set_none_clears_entry() {
        let mut store = ChecksumStore::default();
        store.set(key("SheetB:Tab1"), Some(Fingerprint::from("cafebabe")));
        store.set(key("SheetB:Tab1"), None);
        assert_eq!(store.get(&key("SheetB:Tab1")), None);
    }

    #[test]
    fn null_entries_load_as_absent() {
        let tmp = TempDir::new().unwrap();
        let path = store_path_at(tmp.path());
        std::fs::write(&path, r#"{"SheetA:Tab1":"deadbeef","SheetB:Tab1":null}"#).unwrap();

        let store = ChecksumStore::load(&path);
        assert_eq!(store.len(), 1);
        assert_eq!(
            store.get(&key("SheetA:Tab1")),
            Some(&Fingerprint::from("deadbeef"))
        );
        assert_eq!(store.get(&key("SheetB:Tab1")), None);
    }

    #[test]
    fn tmp_file_cleaned_up_after_persist() {
        let tmp = TempDir::new().unwrap();
        let path = store_path_at(tmp.path());
        assert!(ChecksumStore::new(&path).persist());
        assert!(
            !path.with_extension("json.tmp").exists(),
            "tmp file should be removed after atomic rename"
        );
    }

    #[test]
    fn persist_failure_is_reported_not_fatal() {
        let tmp = TempDir::new().unwrap();
        // A directory where the file should be makes the rename fail.
        let path = store_path_at(tmp.path());
        std::fs::create_dir_all(path.join("occupied")).unwrap();
        let mut store = ChecksumStore::new(&path);
        store.set(key("SheetA:Tab1"), Some(Fingerprint::from("deadbeef")));
        assert!(!store.persist());
    }
}

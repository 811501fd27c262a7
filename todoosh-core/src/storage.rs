//! Local persistence of the list collection.
//!
//! The whole collection is stored as one JSON array under [`STORAGE_KEY`].
//! Loading never fails: unreadable or corrupt data yields an empty
//! collection, and individually invalid lists are dropped.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::List;
use crate::ordering;

/// Key (and file stem) under which the collection is stored.
pub const STORAGE_KEY: &str = "todoosh_data";

/// Errors that can occur while writing or reading raw storage.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error for {}: {source}", path.display())]
    IoError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to serialize collection: {0}")]
    SerializeError(#[from] serde_json::Error),
}

/// A place to keep the serialized collection between runs.
pub trait LocalStore: Send + Sync {
    /// Returns the stored text, or `None` if nothing was saved yet.
    fn read_raw(&self) -> Result<Option<String>, StorageError>;

    fn write_raw(&self, data: &str) -> Result<(), StorageError>;

    /// Loads the collection, dropping whatever does not validate.
    fn load(&self) -> Vec<List> {
        let raw = match self.read_raw() {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!("Failed to read local data: {}", e);
                return Vec::new();
            }
        };

        match serde_json::from_str::<Value>(&raw) {
            Ok(value) => parse_lists(&value),
            Err(e) => {
                warn!("Local data is not valid JSON, starting empty: {}", e);
                Vec::new()
            }
        }
    }

    fn save(&self, lists: &[List]) -> Result<(), StorageError> {
        let data = serde_json::to_string(lists)?;
        self.write_raw(&data)
    }
}

impl<T: LocalStore + ?Sized> LocalStore for Arc<T> {
    fn read_raw(&self) -> Result<Option<String>, StorageError> {
        (**self).read_raw()
    }

    fn write_raw(&self, data: &str) -> Result<(), StorageError> {
        (**self).write_raw(data)
    }
}

/// Validates a stored JSON array into lists.
pub fn parse_lists(value: &Value) -> Vec<List> {
    let Some(items) = value.as_array() else {
        warn!("Local data is not an array, starting empty");
        return Vec::new();
    };

    let mut seen = HashSet::new();
    let mut lists = Vec::with_capacity(items.len());
    for raw in items {
        match List::from_value(raw) {
            Ok(list) if seen.insert(list.id().to_string()) => lists.push(list),
            Ok(list) => warn!(list = %list.id(), "Dropping duplicate list"),
            Err(e) => warn!("Dropping invalid list: {}", e),
        }
    }
    ordering::normalize(&mut lists);
    lists
}

/// Stores the collection as `<data_dir>/todoosh_data.json`.
#[derive(Debug, Clone)]
pub struct FileStore {
    data_dir: PathBuf,
}

impl FileStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn path(&self) -> PathBuf {
        self.data_dir.join(format!("{}.json", STORAGE_KEY))
    }
}

impl LocalStore for FileStore {
    fn read_raw(&self) -> Result<Option<String>, StorageError> {
        let path = self.path();
        match fs::read_to_string(&path) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::IoError { path, source: e }),
        }
    }

    fn write_raw(&self, data: &str) -> Result<(), StorageError> {
        fs::create_dir_all(&self.data_dir).map_err(|e| StorageError::IoError {
            path: self.data_dir.clone(),
            source: e,
        })?;

        // Write to a sibling file first so a crash never leaves half a file
        let path = self.path();
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, data).map_err(|e| StorageError::IoError {
            path: tmp.clone(),
            source: e,
        })?;
        fs::rename(&tmp, &path).map_err(|e| StorageError::IoError {
            path: path.clone(),
            source: e,
        })?;

        debug!("Saved {} bytes to {}", data.len(), path.display());
        Ok(())
    }
}

/// In-memory store for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: Mutex<Option<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts with arbitrary stored text, valid or not.
    pub fn with_raw(raw: impl Into<String>) -> Self {
        Self {
            data: Mutex::new(Some(raw.into())),
        }
    }

    pub fn raw(&self) -> Option<String> {
        self.data.lock().ok().and_then(|data| data.clone())
    }
}

impl LocalStore for MemoryStore {
    fn read_raw(&self) -> Result<Option<String>, StorageError> {
        Ok(self.raw())
    }

    fn write_raw(&self, data: &str) -> Result<(), StorageError> {
        if let Ok(mut slot) = self.data.lock() {
            *slot = Some(data.to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_store() -> (FileStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::new(temp_dir.path());
        (store, temp_dir)
    }

    fn sample() -> Vec<List> {
        let mut groceries = List::new("Groceries", 0).unwrap();
        groceries.add_todo("milk").unwrap();
        groceries.add_todo("eggs").unwrap();
        let work = List::new("Work", 1).unwrap();
        vec![groceries, work]
    }

    #[test]
    fn test_path_uses_storage_key() {
        let (store, _temp) = test_store();
        assert!(store.path().ends_with("todoosh_data.json"));
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let (store, _temp) = test_store();
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let (store, _temp) = test_store();
        let lists = sample();
        store.save(&lists).unwrap();
        assert_eq!(store.load(), lists);
    }

    #[test]
    fn test_save_creates_directory() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("nested").join("data");
        let store = FileStore::new(&nested);
        store.save(&sample()).unwrap();
        assert!(store.path().exists());
        assert!(!nested.join("todoosh_data.json.tmp").exists());
    }

    #[test]
    fn test_corrupt_json_loads_empty() {
        let store = MemoryStore::with_raw("{not json");
        assert!(store.load().is_empty());

        let store = MemoryStore::with_raw(r#"{"lists": []}"#);
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_invalid_todo_is_dropped_alone() {
        let raw = r#"[
            {"id": "l1", "name": "A", "createdAt": "2024-01-01T00:00:00Z", "order": 3,
             "todos": [
                {"id": "t1", "text": "ok", "completed": false, "createdAt": "2024-01-01T00:00:00Z", "order": 0},
                {"text": "no id", "completed": false, "createdAt": "2024-01-01T00:00:00Z", "order": 1}
             ]},
            {"id": "l2", "name": "B", "createdAt": "2024-01-01T00:00:00Z", "order": 7}
        ]"#;
        let store = MemoryStore::with_raw(raw);
        let lists = store.load();

        assert_eq!(lists.len(), 2);
        assert_eq!(lists[0].todos().len(), 1);
        assert_eq!(lists[0].todos()[0].text(), "ok");
        assert_eq!(lists[0].order(), 0);
        assert_eq!(lists[1].order(), 1);
    }

    #[test]
    fn test_invalid_and_duplicate_lists_dropped() {
        let raw = r#"[
            {"id": "l1", "name": "A", "createdAt": "2024-01-01T00:00:00Z", "order": 0},
            {"id": "l1", "name": "Again", "createdAt": "2024-01-01T00:00:00Z", "order": 1},
            {"id": "l3", "createdAt": "2024-01-01T00:00:00Z", "order": 2},
            "garbage"
        ]"#;
        let lists = MemoryStore::with_raw(raw).load();
        assert_eq!(lists.len(), 1);
        assert_eq!(lists[0].name(), "A");
    }

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        assert!(store.raw().is_none());
        store.save(&sample()).unwrap();
        assert_eq!(store.load().len(), 2);
    }
}

//! Key-value persistence for patterns
//!
//! Mirrors the extension's local storage area: whole JSON values replaced per
//! key. The aggregator is the only writer; readers may come and go. The
//! in-memory aggregator state stays authoritative when a write fails.

use crate::behavior::types::Pattern;
use crate::error::StorageError;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Key holding the latest pattern
pub const CURRENT_PATTERN_KEY: &str = "currentPattern";

/// Key holding the bounded history list
pub const PATTERNS_KEY: &str = "patterns";

/// Async key-value store with whole-value replacement semantics
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError>;
    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError>;
}

#[async_trait]
impl<T: KeyValueStore + ?Sized> KeyValueStore for Arc<T> {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        (**self).set(key, value).await
    }
}

/// Volatile store, useful for tests and single-run sessions
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        Ok(self.values.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        self.values.lock().await.insert(key.to_string(), value);
        Ok(())
    }
}

/// Store backed by a single JSON object file.
///
/// Writes go to a sibling temp file that is then renamed over the original,
/// so readers never observe a half-written document.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_document(&self) -> Result<Map<String, Value>, StorageError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(e.into()),
        };

        if raw.trim().is_empty() {
            return Ok(Map::new());
        }

        match serde_json::from_str::<Value>(&raw)? {
            Value::Object(map) => Ok(map),
            _ => Err(StorageError::NotAnObject),
        }
    }

    async fn write_document(&self, document: &Map<String, Value>) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec_pretty(document)?;
        let tmp = self.path.with_extension("tmp");

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for JsonFileStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let _guard = self.lock.lock().await;
        Ok(self.read_document().await?.remove(key))
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        let _guard = self.lock.lock().await;
        let mut document = self.read_document().await?;
        document.insert(key.to_string(), value);
        self.write_document(&document).await
    }
}

/// Typed access to the pattern keys of a [`KeyValueStore`]
#[derive(Debug)]
pub struct PatternStore<S> {
    store: S,
}

impl<S: KeyValueStore> PatternStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn inner(&self) -> &S {
        &self.store
    }

    pub async fn save_current(&self, pattern: &Pattern) -> Result<(), StorageError> {
        self.store
            .set(CURRENT_PATTERN_KEY, serde_json::to_value(pattern)?)
            .await
    }

    pub async fn save_history(&self, patterns: &[Pattern]) -> Result<(), StorageError> {
        self.store
            .set(PATTERNS_KEY, serde_json::to_value(patterns)?)
            .await
    }

    pub async fn load_current(&self) -> Result<Option<Pattern>, StorageError> {
        match self.store.get(CURRENT_PATTERN_KEY).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Stored history, oldest first; empty when nothing was saved yet
    pub async fn load_history(&self) -> Result<Vec<Pattern>, StorageError> {
        match self.store.get(PATTERNS_KEY).await? {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::types::{PatternKind, PatternStatus};
    use chrono::{Duration, TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;
    use tempfile::TempDir;
    use uuid::Uuid;

    fn make_pattern(minute: i64) -> Pattern {
        let start = Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap();
        Pattern {
            doomscroll_rate: 0.4,
            violence_rate: 0.2,
            avg_violence_score: 0.75,
            status: PatternStatus::Good,
            kind: PatternKind::Periodic,
            window_id: Uuid::new_v4(),
            window_start: start,
            doomscroll_count: 2,
            violence_count: 1,
            detection_counts: BTreeMap::new(),
            timestamp: start + Duration::minutes(minute),
        }
    }

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = PatternStore::new(MemoryStore::new());
        assert!(store.load_current().await.unwrap().is_none());
        assert!(store.load_history().await.unwrap().is_empty());

        let pattern = make_pattern(5);
        store.save_current(&pattern).await.unwrap();
        assert_eq!(store.load_current().await.unwrap(), Some(pattern));
    }

    #[tokio::test]
    async fn test_file_store_persists_both_keys() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state").join("patterns.json");

        let history = vec![make_pattern(5), make_pattern(10)];
        {
            let store = PatternStore::new(JsonFileStore::new(&path));
            store.save_history(&history).await.unwrap();
            store.save_current(&history[1]).await.unwrap();
        }

        let reopened = PatternStore::new(JsonFileStore::new(&path));
        assert_eq!(reopened.load_history().await.unwrap(), history);
        assert_eq!(
            reopened.load_current().await.unwrap(),
            Some(history[1].clone())
        );

        let raw: Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(raw.get(CURRENT_PATTERN_KEY).is_some());
        assert_eq!(raw[PATTERNS_KEY].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_file_store_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path().join("absent.json"));
        assert!(store.get(CURRENT_PATTERN_KEY).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_store_rejects_non_object() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "[1, 2, 3]").unwrap();

        let store = JsonFileStore::new(&path);
        assert!(matches!(
            store.get(CURRENT_PATTERN_KEY).await,
            Err(StorageError::NotAnObject)
        ));
    }

    #[tokio::test]
    async fn test_file_store_corrupt_document() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("corrupt.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = JsonFileStore::new(&path);
        assert!(matches!(
            store.set("k", Value::Null).await,
            Err(StorageError::Corrupt(_))
        ));
    }
}

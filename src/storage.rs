//! Implementations of the persistent key-value store port.
//!
//! `JsonFileStore` keeps one file per key under a caller-supplied directory.
//! `MemoryStore` backs tests and previews.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::config::Config;
use crate::ports::PersistentKeyValueStore;

/// File-per-key store rooted at a directory.
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create storage directory: {}", dir.display()))?;
        Ok(Self { dir })
    }

    /// Store rooted at the application's platform data directory, the
    /// default home for preferences and cache snapshots.
    pub fn at_data_dir() -> Result<Self> {
        Self::new(Config::data_dir()?)
    }

    /// Keys may contain path-hostile characters (`cache:snapshot`); map
    /// anything outside `[A-Za-z0-9._-]` to `_` for the file name.
    fn path_for(&self, key: &str) -> PathBuf {
        let safe: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{}.json", safe))
    }
}

#[async_trait]
impl PersistentKeyValueStore for JsonFileStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read stored value: {}", key))?;
        Ok(Some(contents))
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key);
        std::fs::write(&path, value)
            .with_context(|| format!("Failed to write stored value: {}", key))?;
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        if path.exists() {
            std::fs::remove_file(&path)
                .with_context(|| format!("Failed to remove stored value: {}", key))?;
        }
        Ok(())
    }
}

/// In-memory store, for tests and ephemeral contexts.
#[derive(Default)]
pub struct MemoryStore {
    items: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PersistentKeyValueStore for MemoryStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .items
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned())
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.items
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<()> {
        self.items
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn file_store_round_trips_values() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().to_path_buf()).unwrap();

        assert_eq!(store.get_item("prefs").await.unwrap(), None);
        store.set_item("prefs", r#"{"a":1}"#).await.unwrap();
        assert_eq!(
            store.get_item("prefs").await.unwrap().as_deref(),
            Some(r#"{"a":1}"#)
        );

        store.remove_item("prefs").await.unwrap();
        assert_eq!(store.get_item("prefs").await.unwrap(), None);
        // Removing a missing key is fine.
        store.remove_item("prefs").await.unwrap();
    }

    #[tokio::test]
    async fn hostile_keys_are_sanitized_into_distinct_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().to_path_buf()).unwrap();

        store.set_item("cache:snapshot", "a").await.unwrap();
        store.set_item("../escape", "b").await.unwrap();

        assert_eq!(
            store.get_item("cache:snapshot").await.unwrap().as_deref(),
            Some("a")
        );
        // Everything stayed inside the storage directory.
        for entry in std::fs::read_dir(dir.path()).unwrap() {
            let entry = entry.unwrap();
            assert!(entry.path().starts_with(dir.path()));
        }
    }

    #[tokio::test]
    async fn memory_store_round_trips_values() {
        let store = MemoryStore::new();
        store.set_item("k", "v").await.unwrap();
        assert_eq!(store.get_item("k").await.unwrap().as_deref(), Some("v"));
        store.remove_item("k").await.unwrap();
        assert_eq!(store.get_item("k").await.unwrap(), None);
    }
}

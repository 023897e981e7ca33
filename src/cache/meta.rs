// Cache metadata persistence.
// Only record metadata survives restarts; content is always refetched cold.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::entry::EntryKind;
use crate::error::Result;
use crate::remote::PersistentStore;

/// Store key under which the cache metadata snapshot lives.
pub(super) const METADATA_KEY: &str = "cache-metadata";

/// Metadata for one cache record, persisted across restarts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedMeta {
    pub path: String,
    pub kind: EntryKind,
    pub byte_size: usize,
    pub modified: Option<DateTime<Utc>>,
    pub etag: Option<String>,
    pub expires_at: DateTime<Utc>,
}

/// Default on-disk location for the metadata file (~/.cache/canopy).
pub fn default_store_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "canopy").map(|dirs| dirs.cache_dir().join("metadata.json"))
}

/// Persistent store backed by a single JSON file, written atomically via a
/// temp-file rename.
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    fn read_map(&self) -> Result<HashMap<String, String>> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let contents = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    fn write_map(&self, map: &HashMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(map)?;
        let temp_path = self.path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}

#[async_trait]
impl PersistentStore for JsonFileStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.lock.lock();
        let map = self.read_map()?;
        Ok(map.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.lock.lock();
        let mut map = self.read_map()?;
        map.insert(key.to_string(), value.to_string());
        self.write_map(&map)
    }
}

/// In-memory store for tests.
#[derive(Default)]
pub struct MemoryStore {
    map: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PersistentStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.map.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.map.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    use crate::cache::{EntryCache, FileMeta};
    use crate::config::CacheConfig;

    #[tokio::test]
    async fn test_json_file_store_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(temp_dir.path().join("meta.json"));

        assert_eq!(store.get("k").await.unwrap(), None);
        store.set("k", "v1").await.unwrap();
        store.set("k", "v2").await.unwrap();
        store.set("other", "x").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some("v2".to_string()));
        assert_eq!(store.get("other").await.unwrap(), Some("x".to_string()));
    }

    #[tokio::test]
    async fn test_metadata_survives_restart_content_does_not() {
        let store = Arc::new(MemoryStore::new());

        let cache = EntryCache::with_store(CacheConfig::default(), store.clone());
        cache.set_file(
            "/config.toml",
            b"key = 1".to_vec(),
            FileMeta {
                etag: Some("v1".to_string()),
                ..Default::default()
            },
        );
        cache.persist_metadata().await;

        // A fresh cache over the same store: metadata back, content cold.
        let cold = EntryCache::with_store(CacheConfig::default(), store);
        cold.load_metadata().await;
        assert_eq!(cold.get_file("/config.toml"), None);
        let meta = cold.persisted_meta("/config.toml").unwrap();
        assert_eq!(meta.etag, Some("v1".to_string()));
        assert_eq!(meta.byte_size, 7);
    }

    #[tokio::test]
    async fn test_expired_metadata_dropped_on_load() {
        let store = Arc::new(MemoryStore::new());

        let cfg = CacheConfig {
            files: crate::config::CategoryConfig {
                max_bytes: 1024,
                max_entries: 16,
                base_ttl: Duration::ZERO,
            },
            ..Default::default()
        };
        let cache = EntryCache::with_store(cfg, store.clone());
        cache.set_file("/a/b/stale.bin", b"x".to_vec(), FileMeta::default());
        cache.persist_metadata().await;

        let cold = EntryCache::with_store(CacheConfig::default(), store);
        cold.load_metadata().await;
        assert!(cold.persisted_meta("/a/b/stale.bin").is_none());
    }
}

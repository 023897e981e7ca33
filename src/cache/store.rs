// The bounded entry cache.
// Evicts least-recently-used records before any insert that would break budget,
// sweeps expired records on a background interval, and never returns errors.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::{CacheConfig, CategoryConfig};
use crate::entry::{Entry, EntryKind};
use crate::path;
use crate::remote::PersistentStore;

use super::meta::{METADATA_KEY, PersistedMeta};
use super::record::{CacheRecord, FileMeta, importance_multiplier};

/// Counters and totals for one cache category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CategoryStats {
    pub entries: usize,
    pub bytes: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
}

/// Snapshot of cache state, per category.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    pub files: CategoryStats,
    pub listings: CategoryStats,
}

struct FileRecord {
    bytes: Vec<u8>,
    meta: FileMeta,
}

struct ListingRecord {
    entries: Vec<Entry>,
    etag: Option<String>,
}

/// One budget-tracked category of records.
struct Shelf<T> {
    cfg: CategoryConfig,
    records: HashMap<String, CacheRecord<T>>,
    total_bytes: usize,
    next_seq: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
    expirations: u64,
}

impl<T> Shelf<T> {
    fn new(cfg: CategoryConfig) -> Self {
        Self {
            cfg,
            records: HashMap::new(),
            total_bytes: 0,
            next_seq: 0,
            hits: 0,
            misses: 0,
            evictions: 0,
            expirations: 0,
        }
    }

    fn ttl_for(&self, path: &str) -> Duration {
        self.cfg.base_ttl * importance_multiplier(path)
    }

    /// Fetch a live record, expiring it in place if its TTL has elapsed.
    fn get(&mut self, path: &str) -> Option<&T> {
        let expired = self
            .records
            .get(path)
            .is_some_and(|r| r.is_expired(Instant::now()));
        if expired {
            self.drop_record(path);
            self.expirations += 1;
        }
        self.next_seq += 1;
        let seq = self.next_seq;
        match self.records.get_mut(path) {
            Some(record) => {
                record.touch(seq);
                self.hits += 1;
                Some(&record.value)
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Presence check without touching LRU order or hit counters.
    fn contains(&self, path: &str) -> bool {
        self.records
            .get(path)
            .is_some_and(|r| !r.is_expired(Instant::now()))
    }

    fn insert(&mut self, path: String, value: T, byte_size: usize) {
        if byte_size > self.cfg.max_bytes {
            debug!(path = %path, byte_size, "value exceeds category budget, not cached");
            self.drop_record(&path);
            return;
        }
        self.drop_record(&path);
        self.evict_until_fit(byte_size);
        let ttl = self.ttl_for(&path);
        self.next_seq += 1;
        self.total_bytes += byte_size;
        self.records
            .insert(path, CacheRecord::new(value, byte_size, ttl, self.next_seq));
    }

    /// Evict LRU records until one more record of `incoming` bytes fits.
    fn evict_until_fit(&mut self, incoming: usize) {
        while !self.records.is_empty()
            && (self.total_bytes + incoming > self.cfg.max_bytes
                || self.records.len() + 1 > self.cfg.max_entries)
        {
            let victim = self
                .records
                .iter()
                .min_by_key(|(_, r)| r.seq)
                .map(|(p, _)| p.clone());
            if let Some(victim) = victim {
                debug!(path = %victim, "evicting least-recently-used record");
                self.drop_record(&victim);
                self.evictions += 1;
            }
        }
    }

    fn drop_record(&mut self, path: &str) -> bool {
        if let Some(record) = self.records.remove(path) {
            debug_assert!(self.total_bytes >= record.byte_size);
            self.total_bytes = self.total_bytes.saturating_sub(record.byte_size);
            true
        } else {
            false
        }
    }

    fn remove_prefix(&mut self, prefix: &str) -> usize {
        let victims: Vec<String> = self
            .records
            .keys()
            .filter(|p| path::is_within(prefix, p))
            .cloned()
            .collect();
        for victim in &victims {
            self.drop_record(victim);
        }
        victims.len()
    }

    fn sweep(&mut self, now: Instant) -> usize {
        let expired: Vec<String> = self
            .records
            .iter()
            .filter(|(_, r)| r.is_expired(now))
            .map(|(p, _)| p.clone())
            .collect();
        for path in &expired {
            self.drop_record(path);
            self.expirations += 1;
        }
        expired.len()
    }

    fn clear(&mut self) {
        self.records.clear();
        self.total_bytes = 0;
    }

    fn stats(&self) -> CategoryStats {
        CategoryStats {
            entries: self.records.len(),
            bytes: self.total_bytes,
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
            expirations: self.expirations,
        }
    }
}

struct CacheInner {
    files: Shelf<FileRecord>,
    listings: Shelf<ListingRecord>,
    /// Metadata restored from the persistent store on startup.
    persisted: HashMap<String, PersistedMeta>,
}

/// Bounded TTL+LRU cache of file content and directory listings.
///
/// Absence is a normal result; no operation returns an error. Mutations are
/// whole-record replacement executed under a short-lived lock, never held
/// across an await.
pub struct EntryCache {
    inner: Arc<Mutex<CacheInner>>,
    store: Option<Arc<dyn PersistentStore>>,
    sweep_interval: Duration,
    cancel: CancellationToken,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl EntryCache {
    pub fn new(cfg: CacheConfig) -> Self {
        Self::build(cfg, None)
    }

    /// Cache backed by a persistent store for metadata (never content).
    pub fn with_store(cfg: CacheConfig, store: Arc<dyn PersistentStore>) -> Self {
        Self::build(cfg, Some(store))
    }

    fn build(cfg: CacheConfig, store: Option<Arc<dyn PersistentStore>>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(CacheInner {
                files: Shelf::new(cfg.files),
                listings: Shelf::new(cfg.listings),
                persisted: HashMap::new(),
            })),
            store,
            sweep_interval: cfg.sweep_interval,
            cancel: CancellationToken::new(),
            sweeper: Mutex::new(None),
        }
    }

    pub fn get_file(&self, path: &str) -> Option<Vec<u8>> {
        let path = path::normalize(path);
        self.inner.lock().files.get(&path).map(|r| r.bytes.clone())
    }

    /// Metadata of a cached file, without counting as an access.
    pub fn file_meta(&self, path: &str) -> Option<FileMeta> {
        let path = path::normalize(path);
        let inner = self.inner.lock();
        inner.files.records.get(&path).map(|r| r.value.meta.clone())
    }

    pub fn set_file(&self, path: &str, bytes: Vec<u8>, meta: FileMeta) {
        let path = path::normalize(path);
        let byte_size = bytes.len();
        self.inner
            .lock()
            .files
            .insert(path, FileRecord { bytes, meta }, byte_size);
    }

    pub fn delete_file(&self, path: &str) {
        let path = path::normalize(path);
        self.inner.lock().files.drop_record(&path);
    }

    pub fn get_directory(&self, path: &str) -> Option<Vec<Entry>> {
        let path = path::normalize(path);
        self.inner
            .lock()
            .listings
            .get(&path)
            .map(|r| r.entries.clone())
    }

    pub fn set_directory(&self, path: &str, entries: Vec<Entry>, etag: Option<String>) {
        let path = path::normalize(path);
        let byte_size = entries.iter().map(Entry::approx_size).sum();
        self.inner
            .lock()
            .listings
            .insert(path, ListingRecord { entries, etag }, byte_size);
    }

    /// Remove the listing for exactly this path. Descendants are untouched;
    /// cascading removal is `delete_recursive`'s job.
    pub fn delete_directory(&self, path: &str) {
        let path = path::normalize(path);
        self.inner.lock().listings.drop_record(&path);
    }

    /// Remove every cached key, file or listing, at or underneath `prefix`.
    pub fn delete_recursive(&self, prefix: &str) {
        let prefix = path::normalize(prefix);
        let mut inner = self.inner.lock();
        let removed = inner.files.remove_prefix(&prefix) + inner.listings.remove_prefix(&prefix);
        debug!(prefix = %prefix, removed, "recursive cache delete");
    }

    /// Whether a live file record exists, without touching LRU order.
    pub fn contains_file(&self, path: &str) -> bool {
        let path = path::normalize(path);
        self.inner.lock().files.contains(&path)
    }

    /// Whether a live listing record exists, without touching LRU order.
    pub fn contains_directory(&self, path: &str) -> bool {
        let path = path::normalize(path);
        self.inner.lock().listings.contains(&path)
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            files: inner.files.stats(),
            listings: inner.listings.stats(),
        }
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.files.clear();
        inner.listings.clear();
    }

    /// Remove every expired record. Called by the background sweeper and
    /// available directly for tests.
    pub fn sweep_now(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        inner.files.sweep(now) + inner.listings.sweep(now)
    }

    /// Start the periodic TTL sweep task. Idempotent.
    pub fn spawn_sweeper(&self) {
        let mut slot = self.sweeper.lock();
        if slot.is_some() {
            return;
        }
        let inner = Arc::clone(&self.inner);
        let cancel = self.cancel.clone();
        let interval = self.sweep_interval;
        *slot = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let now = Instant::now();
                        let mut inner = inner.lock();
                        let swept = inner.files.sweep(now) + inner.listings.sweep(now);
                        if swept > 0 {
                            debug!(swept, "ttl sweep removed expired records");
                        }
                    }
                }
            }
        }));
    }

    /// Stop the background sweeper. The cache remains usable afterwards.
    pub fn dispose(&self) {
        self.cancel.cancel();
        if let Some(handle) = self.sweeper.lock().take() {
            handle.abort();
        }
    }

    /// Snapshot record metadata (sizes, mtimes, etags, expiries) to the
    /// persistent store. Content is never persisted. Failures are logged.
    pub async fn persist_metadata(&self) {
        let Some(store) = self.store.clone() else {
            return;
        };
        let snapshot: Vec<PersistedMeta> = {
            let inner = self.inner.lock();
            let files = inner.files.records.iter().map(|(p, r)| PersistedMeta {
                path: p.clone(),
                kind: EntryKind::File,
                byte_size: r.byte_size,
                modified: r.value.meta.modified,
                etag: r.value.meta.etag.clone(),
                expires_at: r.expires_at(),
            });
            let listings = inner.listings.records.iter().map(|(p, r)| PersistedMeta {
                path: p.clone(),
                kind: EntryKind::Directory,
                byte_size: r.byte_size,
                modified: None,
                etag: r.value.etag.clone(),
                expires_at: r.expires_at(),
            });
            files.chain(listings).collect()
        };
        let json = match serde_json::to_string(&snapshot) {
            Ok(json) => json,
            Err(err) => {
                warn!(error = %err, "failed to serialize cache metadata");
                return;
            }
        };
        if let Err(err) = store.set(METADATA_KEY, &json).await {
            warn!(error = %err, "failed to persist cache metadata");
        }
    }

    /// Restore metadata written by a previous process. Expired records are
    /// dropped on load; content is always refetched cold.
    pub async fn load_metadata(&self) {
        let Some(store) = self.store.clone() else {
            return;
        };
        let json = match store.get(METADATA_KEY).await {
            Ok(Some(json)) => json,
            Ok(None) => return,
            Err(err) => {
                warn!(error = %err, "failed to load cache metadata");
                return;
            }
        };
        let snapshot: Vec<PersistedMeta> = match serde_json::from_str(&json) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(error = %err, "discarding unreadable cache metadata");
                return;
            }
        };
        let now = chrono::Utc::now();
        let mut inner = self.inner.lock();
        inner.persisted = snapshot
            .into_iter()
            .filter(|m| m.expires_at > now)
            .map(|m| (m.path.clone(), m))
            .collect();
    }

    /// Metadata known from a previous run, if still unexpired. Lets callers
    /// issue conditional fetches on a cold cache.
    pub fn persisted_meta(&self, path: &str) -> Option<PersistedMeta> {
        let path = path::normalize(path);
        self.inner.lock().persisted.get(&path).cloned()
    }
}

impl Drop for EntryCache {
    fn drop(&mut self) {
        self.dispose();
    }
}

// Configuration knobs for the cache, index builder, and warming scheduler.
// Every component is constructed from an injected config; there is no global state.

use std::time::Duration;

/// Budget and TTL for one cache category (file content or directory listings).
#[derive(Debug, Clone)]
pub struct CategoryConfig {
    /// Maximum total cached bytes for this category.
    pub max_bytes: usize,
    /// Maximum number of records for this category.
    pub max_entries: usize,
    /// Base TTL before the per-path importance multiplier is applied.
    pub base_ttl: Duration,
}

/// Configuration for [`EntryCache`](crate::cache::EntryCache).
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub files: CategoryConfig,
    pub listings: CategoryConfig,
    /// Interval between TTL sweep passes.
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            files: CategoryConfig {
                max_bytes: 16 * 1024 * 1024,
                max_entries: 512,
                base_ttl: Duration::from_secs(300),
            },
            listings: CategoryConfig {
                max_bytes: 4 * 1024 * 1024,
                max_entries: 1024,
                base_ttl: Duration::from_secs(120),
            },
            sweep_interval: Duration::from_secs(60),
        }
    }
}

/// Configuration for [`IndexBuilder`](crate::index::IndexBuilder).
#[derive(Debug, Clone)]
pub struct IndexConfig {
    /// Root path of the remote tree.
    pub root: String,
    /// Number of directories dequeued from the frontier per batch.
    pub batch_size: usize,
    /// Concurrent listings within one batch. Kept well below `batch_size`.
    pub list_concurrency: usize,
    /// Pause between batches so the rebuild does not saturate the remote.
    pub batch_pause: Duration,
    /// Wall-clock bound on a full rebuild. On expiry the partial index is kept.
    pub rebuild_deadline: Duration,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            root: "/".to_string(),
            batch_size: 16,
            list_concurrency: 4,
            batch_pause: Duration::from_millis(50),
            rebuild_deadline: Duration::from_secs(30),
        }
    }
}

/// Configuration for [`WarmingScheduler`](crate::warming::WarmingScheduler).
#[derive(Debug, Clone)]
pub struct WarmingConfig {
    /// Root path of the remote tree.
    pub root: String,
    /// Cap on simultaneously in-flight warm operations.
    pub concurrency: usize,
    /// Maximum paths launched per scheduling iteration.
    pub batch_size: usize,
    /// Extensions of root-level files warmed in the Immediate tier.
    pub important_extensions: Vec<String>,
    /// Well-known filenames warmed in the Immediate tier.
    pub important_files: Vec<String>,
    /// Directory names classified into the Background tier.
    pub important_dirs: Vec<String>,
}

impl Default for WarmingConfig {
    fn default() -> Self {
        Self {
            root: "/".to_string(),
            concurrency: 4,
            batch_size: 8,
            important_extensions: ["md", "toml", "json", "yaml", "yml", "txt", "cfg", "ini"]
                .into_iter()
                .map(String::from)
                .collect(),
            important_files: ["README", "LICENSE", "Makefile", "Dockerfile"]
                .into_iter()
                .map(String::from)
                .collect(),
            important_dirs: ["src", "docs", "doc", "config", "conf", "etc"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

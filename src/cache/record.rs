// Per-record cache bookkeeping: TTL expiry and LRU access ordering.
// LRU order is tracked via an explicit access sequence, not wall-clock scans.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use crate::path;

/// Extensions that extend a record's TTL (config and documentation files
/// change rarely and are read often).
const LONG_LIVED_EXTENSIONS: &[&str] = &[
    "md", "rst", "txt", "toml", "json", "yaml", "yml", "cfg", "ini", "conf",
];

/// Well-known filenames that extend a record's TTL.
const LONG_LIVED_NAMES: &[&str] = &["README", "LICENSE", "CHANGELOG", "Makefile", "Dockerfile"];

/// TTL multiplier for a path: root-level paths get 4x, well-known config/doc
/// files get 2x, everything else 1x.
pub fn importance_multiplier(p: &str) -> u32 {
    if path::depth(p) <= 1 {
        return 4;
    }
    let name = path::file_name(p);
    let stem = name.split('.').next().unwrap_or(name);
    if LONG_LIVED_NAMES.contains(&stem) {
        return 2;
    }
    if let Some(ext) = path::extension(p)
        && LONG_LIVED_EXTENSIONS.contains(&ext.as_str())
    {
        return 2;
    }
    1
}

/// Metadata kept alongside cached file content.
#[derive(Debug, Clone, Default)]
pub struct FileMeta {
    pub modified: Option<DateTime<Utc>>,
    pub etag: Option<String>,
    pub content_type: Option<String>,
}

/// One cached record. Writes are whole-record replacement, never partial.
#[derive(Debug, Clone)]
pub(super) struct CacheRecord<T> {
    pub value: T,
    pub inserted_at: Instant,
    pub last_access: Instant,
    pub access_count: u64,
    pub ttl: Duration,
    pub byte_size: usize,
    /// Monotonic access sequence; the smallest sequence is the LRU victim.
    pub seq: u64,
}

impl<T> CacheRecord<T> {
    pub fn new(value: T, byte_size: usize, ttl: Duration, seq: u64) -> Self {
        let now = Instant::now();
        Self {
            value,
            inserted_at: now,
            last_access: now,
            access_count: 0,
            ttl,
            byte_size,
            seq,
        }
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.inserted_at) >= self.ttl
    }

    pub fn touch(&mut self, seq: u64) {
        self.last_access = Instant::now();
        self.access_count += 1;
        self.seq = seq;
    }

    /// Wall-clock expiry, for metadata persistence.
    pub fn expires_at(&self) -> DateTime<Utc> {
        let remaining = self.ttl.saturating_sub(self.inserted_at.elapsed());
        Utc::now() + chrono::Duration::from_std(remaining).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_importance_multiplier() {
        assert_eq!(importance_multiplier("/config.json"), 4);
        assert_eq!(importance_multiplier("/sub"), 4);
        assert_eq!(importance_multiplier("/a/b/readme.md"), 2);
        assert_eq!(importance_multiplier("/a/b/README"), 2);
        assert_eq!(importance_multiplier("/a/b/data.bin"), 1);
    }

    #[test]
    fn test_expiry() {
        let record = CacheRecord::new((), 0, Duration::ZERO, 0);
        assert!(record.is_expired(Instant::now()));

        let record = CacheRecord::new((), 0, Duration::from_secs(3600), 0);
        assert!(!record.is_expired(Instant::now()));
    }

    #[test]
    fn test_touch_updates_sequence() {
        let mut record = CacheRecord::new((), 0, Duration::from_secs(60), 1);
        record.touch(7);
        assert_eq!(record.seq, 7);
        assert_eq!(record.access_count, 1);
    }
}

// Core entry model shared by the cache, index, and warming scheduler.
// Remote wire shapes are converted into `Entry` at the boundary, never stored raw.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::path;
use crate::remote::RemoteEntry;

/// Kind discriminator for an indexed or cached entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    File,
    Directory,
}

/// One file or directory record. The normalized path is the sole identity key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub path: String,
    pub kind: EntryKind,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
    pub etag: Option<String>,
    pub content_type: Option<String>,
    /// Locally materialized entry with no backing remote resource.
    pub synthetic: bool,
}

impl Entry {
    /// Build an entry from a raw remote listing row. Returns `None` for rows
    /// that fail validation (empty names, names containing separators).
    pub fn from_remote(parent: &str, raw: &RemoteEntry) -> Option<Self> {
        if raw.name.is_empty() || raw.name.contains('/') || raw.name == "." || raw.name == ".." {
            return None;
        }
        Some(Self {
            path: path::join(parent, &raw.name),
            kind: if raw.is_directory {
                EntryKind::Directory
            } else {
                EntryKind::File
            },
            size: raw.size,
            modified: raw.modified,
            etag: None,
            content_type: None,
            synthetic: false,
        })
    }

    /// Locally materialized entry, exempt from eviction and rebuilds.
    pub fn synthetic(path: impl Into<String>, kind: EntryKind) -> Self {
        Self {
            path: path::normalize(&path.into()),
            kind,
            size: 0,
            modified: Some(Utc::now()),
            etag: None,
            content_type: None,
            synthetic: true,
        }
    }

    pub fn is_directory(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    /// Final path segment.
    pub fn name(&self) -> &str {
        path::file_name(&self.path)
    }

    /// Approximate heap footprint, used for listing byte accounting.
    pub fn approx_size(&self) -> usize {
        self.path.len()
            + self.etag.as_ref().map_or(0, |e| e.len())
            + self.content_type.as_ref().map_or(0, |c| c.len())
            + 64
    }
}

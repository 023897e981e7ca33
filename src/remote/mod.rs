// Remote collaborator contracts and wire types.
// The cache, index, and warming core never issue wire requests themselves.

pub mod http;

#[cfg(test)]
pub mod fake;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use http::HttpRemoteClient;

/// One row of a remote directory listing, as received off the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteEntry {
    pub name: String,
    #[serde(default)]
    pub is_directory: bool,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub modified: Option<DateTime<Utc>>,
}

/// File content plus the response headers the cache keeps as metadata.
#[derive(Debug, Clone)]
pub struct RemoteFile {
    pub bytes: Vec<u8>,
    pub etag: Option<String>,
    pub content_type: Option<String>,
    pub modified: Option<DateTime<Utc>>,
}

/// Narrow contract for the slow, fallible remote tree.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// List the immediate children of a directory.
    async fn list_directory(&self, path: &str) -> Result<Vec<RemoteEntry>>;

    /// Read a file's full content.
    async fn read_file(&self, path: &str) -> Result<RemoteFile>;
}

/// Narrow contract for persisting cache metadata across restarts.
#[async_trait]
pub trait PersistentStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
}

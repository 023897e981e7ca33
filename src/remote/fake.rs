// Scripted in-memory remote for tests.
// Records call counts and supports per-path delays and injected failures.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{CanopyError, Result};

use super::{RemoteClient, RemoteEntry, RemoteFile};

#[derive(Default)]
pub struct FakeRemote {
    listings: Mutex<HashMap<String, Vec<RemoteEntry>>>,
    files: Mutex<HashMap<String, Vec<u8>>>,
    failing: Mutex<HashMap<String, String>>,
    delays: Mutex<HashMap<String, Duration>>,
    list_calls: Mutex<HashMap<String, usize>>,
    read_calls: Mutex<HashMap<String, usize>>,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a directory listing. Names ending in `/` become directories.
    pub fn dir(&self, path: &str, names: &[&str]) {
        let entries = names
            .iter()
            .map(|name| RemoteEntry {
                name: name.trim_end_matches('/').to_string(),
                is_directory: name.ends_with('/'),
                size: 10,
                modified: None,
            })
            .collect();
        self.listings.lock().insert(path.to_string(), entries);
    }

    pub fn file(&self, path: &str, bytes: &[u8]) {
        self.files.lock().insert(path.to_string(), bytes.to_vec());
    }

    pub fn fail(&self, path: &str, message: &str) {
        self.failing
            .lock()
            .insert(path.to_string(), message.to_string());
    }

    pub fn delay(&self, path: &str, delay: Duration) {
        self.delays.lock().insert(path.to_string(), delay);
    }

    pub fn list_calls(&self, path: &str) -> usize {
        self.list_calls.lock().get(path).copied().unwrap_or(0)
    }

    pub fn read_calls(&self, path: &str) -> usize {
        self.read_calls.lock().get(path).copied().unwrap_or(0)
    }

    async fn pause_for(&self, path: &str) {
        let delay = self.delays.lock().get(path).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn check_failure(&self, path: &str) -> Result<()> {
        if let Some(message) = self.failing.lock().get(path) {
            return Err(CanopyError::Remote {
                path: path.to_string(),
                message: message.clone(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteClient for FakeRemote {
    async fn list_directory(&self, path: &str) -> Result<Vec<RemoteEntry>> {
        *self
            .list_calls
            .lock()
            .entry(path.to_string())
            .or_default() += 1;
        self.pause_for(path).await;
        self.check_failure(path)?;
        self.listings
            .lock()
            .get(path)
            .cloned()
            .ok_or_else(|| CanopyError::NotFound(path.to_string()))
    }

    async fn read_file(&self, path: &str) -> Result<RemoteFile> {
        *self
            .read_calls
            .lock()
            .entry(path.to_string())
            .or_default() += 1;
        self.pause_for(path).await;
        self.check_failure(path)?;
        let bytes = self
            .files
            .lock()
            .get(path)
            .cloned()
            .ok_or_else(|| CanopyError::NotFound(path.to_string()))?;
        Ok(RemoteFile {
            bytes,
            etag: None,
            content_type: None,
            modified: None,
        })
    }
}

// Error types for the canopy crate.
// Covers remote failures, timeouts, persistence errors, and internal invariants.

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CanopyError {
    #[error("remote request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("remote error for {path}: {message}")]
    Remote { path: String, message: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("persistent store error: {0}")]
    Store(String),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invariant violated: {0}")]
    Invariant(String),
}

pub type Result<T> = std::result::Result<T, CanopyError>;

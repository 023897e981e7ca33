//! canopy — a memory-bounded local view over a slow remote file tree.
//!
//! The remote tree is reachable only through slow, fallible listing and read
//! calls. Three subsystems keep a local view fresh and fast without blocking
//! callers on the network or growing unbounded:
//!
//! - [`cache::EntryCache`]: bounded TTL+LRU cache of file content and
//!   directory listings, keyed by normalized path.
//! - [`index::IndexBuilder`]: full path→entry map of the tree with quick and
//!   full traversal modes and live incremental updates.
//! - [`warming::WarmingScheduler`]: background crawl that pre-populates the
//!   cache using tiered priority.
//!
//! Network access goes through the [`remote::RemoteClient`] trait; the core
//! issues no wire requests itself. Remote failures and rebuild timeouts are
//! logged and reduce completeness, never crash or hang a caller.

pub mod cache;
pub mod config;
pub mod entry;
pub mod error;
pub mod index;
pub mod path;
pub mod remote;
pub mod warming;

pub use cache::{CacheStats, CategoryStats, EntryCache, FileMeta};
pub use config::{CacheConfig, CategoryConfig, IndexConfig, WarmingConfig};
pub use entry::{Entry, EntryKind};
pub use error::{CanopyError, Result};
pub use index::{IndexBuilder, IndexStats};
pub use remote::{PersistentStore, RemoteClient, RemoteEntry, RemoteFile};
pub use warming::{Tier, WarmingScheduler, WarmingStatus};

// Bounded TTL+LRU cache of file content and directory listings.
// Keys are normalized paths; file and listing budgets are tracked per category.

mod meta;
mod record;
mod store;

pub use meta::{JsonFileStore, MemoryStore, PersistedMeta, default_store_path};
pub use record::{FileMeta, importance_multiplier};
pub use store::{CacheStats, CategoryStats, EntryCache};

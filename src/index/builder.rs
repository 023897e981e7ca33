// The index builder.
// Breadth-first traversal over a frontier queue with bounded in-batch
// concurrency, incremental update hooks, and a synthetic-entry overlay.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::cache::EntryCache;
use crate::config::IndexConfig;
use crate::entry::{Entry, EntryKind};
use crate::path;
use crate::remote::{RemoteClient, RemoteEntry};

/// Callback invoked once per completed rebuild or quick index.
pub type RebuildSink = Arc<dyn Fn(IndexStats) + Send + Sync>;

/// Snapshot of index state.
#[derive(Debug, Clone, Copy, Default)]
pub struct IndexStats {
    pub files: usize,
    pub directories: usize,
    pub synthetic: usize,
    pub indexing: bool,
    pub last_rebuild: Option<DateTime<Utc>>,
    /// Whether the most recent rebuild hit its deadline and kept a partial index.
    pub timed_out: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RebuildMode {
    Full,
    Quick,
}

#[derive(Default)]
struct IndexState {
    paths: HashMap<String, Entry>,
    children: HashMap<String, HashSet<String>>,
    /// Locally materialized entries, merged with the remote-derived maps at
    /// lookup time and untouched by rebuilds.
    synthetic: HashMap<String, Entry>,
    synthetic_children: HashMap<String, HashSet<String>>,
    indexing: bool,
    generation: u64,
    last_rebuild: Option<DateTime<Utc>>,
    timed_out: bool,
}

fn remove_subtree(state: &mut IndexState, root: &str) {
    state.paths.retain(|p, _| !path::is_within(root, p));
    state.children.retain(|p, _| !path::is_within(root, p));
    if let Some(parent) = path::parent(root)
        && let Some(set) = state.children.get_mut(&parent)
    {
        set.remove(root);
    }
}

fn placeholder_directory(dir: &str) -> Entry {
    Entry {
        path: dir.to_string(),
        kind: EntryKind::Directory,
        size: 0,
        modified: None,
        etag: None,
        content_type: None,
        synthetic: false,
    }
}

/// Maintains a full path→entry map of the remote tree.
///
/// Remote failures and deadline expiry never escape these APIs; a half-built
/// index is kept in preference to failing the caller.
pub struct IndexBuilder {
    remote: Arc<dyn RemoteClient>,
    cache: Option<Arc<EntryCache>>,
    cfg: IndexConfig,
    state: Mutex<IndexState>,
    /// Serializes traversals; overlapping callers coalesce onto one run.
    rebuild_lock: tokio::sync::Mutex<()>,
    sink: Option<RebuildSink>,
}

impl IndexBuilder {
    pub fn new(remote: Arc<dyn RemoteClient>, cfg: IndexConfig) -> Self {
        Self {
            remote,
            cache: None,
            cfg,
            state: Mutex::new(IndexState::default()),
            rebuild_lock: tokio::sync::Mutex::new(()),
            sink: None,
        }
    }

    /// Attach a cache; traversal listings then populate it as a side effect.
    pub fn with_cache(mut self, cache: Arc<EntryCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Attach a callback fired once per completed rebuild or quick index.
    pub fn with_rebuild_sink(mut self, sink: RebuildSink) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Index the tree if it has not been indexed yet. Idempotent: a populated
    /// index is a no-op, and callers racing an in-flight run await that run.
    pub async fn ensure_indexed(&self) -> IndexStats {
        if !self.state.lock().paths.is_empty() {
            return self.stats();
        }
        self.rebuild_index().await
    }

    /// Full recursive rebuild. Overlapping calls produce a single traversal;
    /// every caller observes the same completed index.
    pub async fn rebuild_index(&self) -> IndexStats {
        self.coalesced_run(RebuildMode::Full).await
    }

    /// Index only the root directory, for fast initial availability.
    pub async fn quick_index(&self) -> IndexStats {
        self.coalesced_run(RebuildMode::Quick).await
    }

    async fn coalesced_run(&self, mode: RebuildMode) -> IndexStats {
        let entered_at = self.state.lock().generation;
        let _guard = self.rebuild_lock.lock().await;
        if self.state.lock().generation != entered_at {
            // Another traversal completed while we waited; its result stands.
            return self.stats();
        }
        self.run(mode).await
    }

    async fn run(&self, mode: RebuildMode) -> IndexStats {
        {
            let mut state = self.state.lock();
            state.indexing = true;
        }
        let started = Instant::now();
        let deadline = self.cfg.rebuild_deadline;
        let root = path::normalize(&self.cfg.root);

        let mut frontier: VecDeque<String> = VecDeque::from([root.clone()]);
        let mut pending: HashSet<String> = HashSet::from([root]);
        let mut processed: HashSet<String> = HashSet::new();
        let mut timed_out = false;

        'traversal: while !frontier.is_empty() {
            if started.elapsed() >= deadline {
                timed_out = true;
                break;
            }
            let take = frontier.len().min(self.cfg.batch_size.max(1));
            let batch: Vec<String> = frontier.drain(..take).collect();

            for chunk in batch.chunks(self.cfg.list_concurrency.max(1)) {
                if started.elapsed() >= deadline {
                    timed_out = true;
                    break 'traversal;
                }
                let mut join = JoinSet::new();
                for dir in chunk {
                    let remote = Arc::clone(&self.remote);
                    let dir = dir.clone();
                    join.spawn(async move {
                        let result = remote.list_directory(&dir).await;
                        (dir, result)
                    });
                }
                while let Some(joined) = join.join_next().await {
                    let Ok((dir, result)) = joined else { continue };
                    pending.remove(&dir);
                    processed.insert(dir.clone());
                    match result {
                        Ok(raw) => {
                            let discovered = self.apply_listing(&dir, &raw);
                            if mode == RebuildMode::Full {
                                for sub in discovered {
                                    if !processed.contains(&sub) && !pending.contains(&sub) {
                                        pending.insert(sub.clone());
                                        frontier.push_back(sub);
                                    }
                                }
                            }
                        }
                        Err(err) => {
                            warn!(dir = %dir, error = %err, "listing failed, skipping subtree");
                        }
                    }
                }
            }
            if !frontier.is_empty() {
                tokio::time::sleep(self.cfg.batch_pause).await;
            }
        }

        if timed_out {
            warn!(
                unvisited = frontier.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "rebuild deadline reached, keeping partial index"
            );
        } else {
            debug!(
                directories = processed.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "index traversal complete"
            );
        }

        let stats = {
            let mut state = self.state.lock();
            state.indexing = false;
            state.generation += 1;
            state.last_rebuild = Some(Utc::now());
            state.timed_out = timed_out;
            snapshot(&state)
        };
        if let Some(sink) = &self.sink {
            sink(stats);
        }
        stats
    }

    /// Replace a directory's indexed children with a fresh listing. Children
    /// that disappeared are removed together with their subtrees. Returns the
    /// subdirectories discovered.
    fn apply_listing(&self, dir: &str, raw: &[RemoteEntry]) -> Vec<String> {
        let entries: Vec<Entry> = raw
            .iter()
            .filter_map(|r| Entry::from_remote(dir, r))
            .collect();
        let mut discovered = Vec::new();
        {
            let mut state = self.state.lock();
            let fresh: HashSet<String> = entries.iter().map(|e| e.path.clone()).collect();
            if let Some(old) = state.children.get(dir) {
                let stale: Vec<String> = old.difference(&fresh).cloned().collect();
                for gone in stale {
                    remove_subtree(&mut state, &gone);
                }
            }
            for entry in &entries {
                if entry.is_directory() {
                    discovered.push(entry.path.clone());
                }
                state.paths.insert(entry.path.clone(), entry.clone());
            }
            state.children.insert(dir.to_string(), fresh);
            if !state.paths.contains_key(dir) {
                state.paths.insert(dir.to_string(), placeholder_directory(dir));
            }
        }
        if let Some(cache) = &self.cache {
            cache.set_directory(dir, entries, None);
        }
        discovered
    }

    /// React to a path appearing on the remote: re-list the parent and splice
    /// the result into the index. Failures are logged and leave the index as is.
    pub async fn on_created(&self, p: &str) {
        let p = path::normalize(p);
        let Some(parent) = path::parent(&p) else {
            return;
        };
        match self.remote.list_directory(&parent).await {
            Ok(raw) => {
                self.apply_listing(&parent, &raw);
            }
            Err(err) => {
                warn!(path = %p, error = %err, "parent listing failed after create");
            }
        }
    }

    /// Remove a path and, for directories, every indexed descendant.
    pub fn on_deleted(&self, p: &str) {
        let p = path::normalize(p);
        let mut state = self.state.lock();
        remove_subtree(&mut state, &p);
    }

    /// A rename is a delete of the old path followed by a create of the new.
    pub async fn on_renamed(&self, old: &str, new: &str) {
        self.on_deleted(old);
        self.on_created(new).await;
    }

    /// Register a locally materialized entry. It bypasses the network, joins
    /// lookups and searches like any remote entry, and survives rebuilds.
    pub fn add_synthetic_entry(&self, p: &str, kind: EntryKind) {
        let entry = Entry::synthetic(p, kind);
        let mut state = self.state.lock();
        if let Some(parent) = path::parent(&entry.path) {
            state
                .synthetic_children
                .entry(parent)
                .or_default()
                .insert(entry.path.clone());
        }
        state.synthetic.insert(entry.path.clone(), entry);
    }

    /// Look up one entry; the synthetic overlay shadows remote entries.
    pub fn lookup(&self, p: &str) -> Option<Entry> {
        let p = path::normalize(p);
        let state = self.state.lock();
        state
            .synthetic
            .get(&p)
            .or_else(|| state.paths.get(&p))
            .cloned()
    }

    /// Every indexed file, remote and synthetic, sorted by path.
    pub fn all_files(&self) -> Vec<Entry> {
        let state = self.state.lock();
        let mut merged: BTreeMap<&String, &Entry> = state
            .paths
            .iter()
            .filter(|(_, e)| e.is_file())
            .collect();
        merged.extend(state.synthetic.iter().filter(|(_, e)| e.is_file()));
        merged.into_values().cloned().collect()
    }

    /// Case-insensitive substring search over entry names, sorted by path.
    pub fn search_by_name(&self, needle: &str) -> Vec<Entry> {
        let needle = needle.to_lowercase();
        let state = self.state.lock();
        let mut merged: BTreeMap<&String, &Entry> = state.paths.iter().collect();
        merged.extend(state.synthetic.iter());
        merged
            .into_values()
            .filter(|e| e.name().to_lowercase().contains(&needle))
            .cloned()
            .collect()
    }

    /// Indexed children of a directory, synthetic overlay included.
    pub fn children_of(&self, dir: &str) -> Vec<Entry> {
        let dir = path::normalize(dir);
        let state = self.state.lock();
        let mut merged: BTreeMap<String, Entry> = BTreeMap::new();
        if let Some(set) = state.children.get(&dir) {
            for p in set {
                if let Some(e) = state.paths.get(p) {
                    merged.insert(p.clone(), e.clone());
                }
            }
        }
        if let Some(set) = state.synthetic_children.get(&dir) {
            for p in set {
                if let Some(e) = state.synthetic.get(p) {
                    merged.insert(p.clone(), e.clone());
                }
            }
        }
        merged.into_values().collect()
    }

    pub fn is_indexing(&self) -> bool {
        self.state.lock().indexing
    }

    pub fn stats(&self) -> IndexStats {
        snapshot(&self.state.lock())
    }
}

fn snapshot(state: &IndexState) -> IndexStats {
    IndexStats {
        files: state.paths.values().filter(|e| e.is_file()).count(),
        directories: state.paths.values().filter(|e| e.is_directory()).count(),
        synthetic: state.synthetic.len(),
        indexing: state.indexing,
        last_rebuild: state.last_rebuild,
        timed_out: state.timed_out,
    }
}

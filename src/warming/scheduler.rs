// The warming scheduler.
// Classifies root entries into priority tiers at start, then drains a FIFO
// queue through a bounded in-flight set. One unreachable subtree never stalls
// the crawl; failures are logged and the path is dropped.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::cache::{EntryCache, FileMeta};
use crate::config::WarmingConfig;
use crate::entry::{Entry, EntryKind};
use crate::path;
use crate::remote::RemoteClient;

/// Warming priority class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    /// Warmed synchronously before `start` returns.
    Immediate,
    /// Queued for the background loop.
    Background,
    /// Never proactively fetched.
    OnDemand,
}

/// One queued warm operation. The kind is carried along when a listing
/// reported it; only externally enqueued paths fall back to the extension
/// heuristic.
#[derive(Debug, Clone)]
pub struct WarmingTask {
    pub path: String,
    pub tier: Tier,
    pub kind: Option<EntryKind>,
}

/// Snapshot of scheduler state.
#[derive(Debug, Clone, Copy, Default)]
pub struct WarmingStatus {
    /// Whether warming work is currently queued or in flight.
    pub active: bool,
    pub queue_size: usize,
    pub in_flight: usize,
    pub warmed: u64,
    pub failed: u64,
}

/// Resolve a task's kind: trust what a listing reported, fall back to the
/// extension heuristic only for paths of unknown kind.
fn is_file(p: &str, kind: Option<EntryKind>) -> bool {
    match kind {
        Some(kind) => kind == EntryKind::File,
        None => path::looks_like_file(p),
    }
}

#[derive(Default)]
struct WarmState {
    queue: VecDeque<WarmingTask>,
    queued: HashSet<String>,
    in_flight: HashSet<String>,
    started: bool,
    warmed: u64,
    failed: u64,
}

struct WarmCore {
    remote: Arc<dyn RemoteClient>,
    cache: Arc<EntryCache>,
    cfg: WarmingConfig,
    state: Mutex<WarmState>,
    notify: Notify,
}

impl WarmCore {
    fn important_file(&self, p: &str) -> bool {
        let name = path::file_name(p);
        let stem = name.split('.').next().unwrap_or(name);
        if self
            .cfg
            .important_files
            .iter()
            .any(|f| f == name || f == stem)
        {
            return true;
        }
        path::extension(p).is_some_and(|ext| self.cfg.important_extensions.contains(&ext))
    }

    fn important_dir(&self, p: &str) -> bool {
        let name = path::file_name(p);
        self.cfg.important_dirs.iter().any(|d| d == name)
    }

    /// Tier for a root-level entry during strategy construction.
    fn classify(&self, entry: &Entry) -> Tier {
        if entry.is_file() && self.important_file(&entry.path) {
            Tier::Immediate
        } else if entry.is_directory() && self.important_dir(&entry.path) {
            Tier::Background
        } else {
            Tier::OnDemand
        }
    }

    /// Queue a path unless it is already queued, in flight, or cached.
    fn enqueue(&self, p: String, tier: Tier, kind: Option<EntryKind>) {
        {
            let mut state = self.state.lock();
            if state.queued.contains(&p) || state.in_flight.contains(&p) {
                return;
            }
            let cached = if is_file(&p, kind) {
                self.cache.contains_file(&p)
            } else {
                self.cache.contains_directory(&p)
            };
            if cached {
                return;
            }
            state.queued.insert(p.clone());
            state.queue.push_back(WarmingTask { path: p, tier, kind });
        }
        self.notify.notify_one();
    }

    async fn warm_one(&self, p: &str, kind: Option<EntryKind>) {
        if is_file(p, kind) {
            self.warm_file(p).await;
        } else {
            self.warm_directory(p).await;
        }
    }

    async fn warm_file(&self, p: &str) {
        if self.cache.contains_file(p) {
            return;
        }
        match self.remote.read_file(p).await {
            Ok(file) => {
                let meta = FileMeta {
                    modified: file.modified,
                    etag: file.etag,
                    content_type: file.content_type,
                };
                self.cache.set_file(p, file.bytes, meta);
                self.state.lock().warmed += 1;
            }
            Err(err) => {
                warn!(path = %p, error = %err, "warm read failed, dropping path");
                self.state.lock().failed += 1;
            }
        }
    }

    /// Listing a directory both caches it and discovers further important
    /// paths, making warming self-expanding.
    async fn warm_directory(&self, p: &str) {
        if self.cache.contains_directory(p) {
            return;
        }
        match self.remote.list_directory(p).await {
            Ok(raw) => {
                let entries: Vec<Entry> = raw
                    .iter()
                    .filter_map(|r| Entry::from_remote(p, r))
                    .collect();
                for entry in &entries {
                    let important = if entry.is_directory() {
                        self.important_dir(&entry.path)
                    } else {
                        self.important_file(&entry.path)
                    };
                    if important {
                        self.enqueue(entry.path.clone(), Tier::Background, Some(entry.kind));
                    }
                }
                self.cache.set_directory(p, entries, None);
                self.state.lock().warmed += 1;
            }
            Err(err) => {
                warn!(path = %p, error = %err, "warm listing failed, dropping path");
                self.state.lock().failed += 1;
            }
        }
    }
}

/// Steady-state policy: launch up to `min(free_slots, batch_size)` warm
/// operations, then continue immediately as completions free slots. The loop
/// parks when the queue is empty and nothing is in flight; `enqueue` wakes it.
async fn run_loop(core: Arc<WarmCore>, cancel: CancellationToken) {
    let mut join: JoinSet<()> = JoinSet::new();
    loop {
        let tasks: Vec<WarmingTask> = {
            let mut state = core.state.lock();
            let free = core.cfg.concurrency.saturating_sub(join.len());
            let slots = free.min(core.cfg.batch_size);
            let mut tasks = Vec::new();
            while tasks.len() < slots {
                let Some(task) = state.queue.pop_front() else {
                    break;
                };
                state.queued.remove(&task.path);
                if state.in_flight.contains(&task.path) {
                    continue;
                }
                state.in_flight.insert(task.path.clone());
                tasks.push(task);
            }
            tasks
        };
        for task in tasks {
            let core = Arc::clone(&core);
            join.spawn(async move {
                core.warm_one(&task.path, task.kind).await;
                core.state.lock().in_flight.remove(&task.path);
            });
        }
        if join.is_empty() {
            debug!("warming queue drained, parking until new work arrives");
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = core.notify.notified() => {}
            }
            continue;
        }
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = join.join_next() => {}
            _ = core.notify.notified() => {}
        }
    }
    // Dropping the join set aborts in-flight warm operations at their next
    // suspension point; no further work is drained.
}

/// Proactively populates the cache using tiered priority.
pub struct WarmingScheduler {
    core: Arc<WarmCore>,
    cancel: Mutex<Option<CancellationToken>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl WarmingScheduler {
    pub fn new(remote: Arc<dyn RemoteClient>, cache: Arc<EntryCache>, cfg: WarmingConfig) -> Self {
        Self {
            core: Arc::new(WarmCore {
                remote,
                cache,
                cfg,
                state: Mutex::new(WarmState::default()),
                notify: Notify::new(),
            }),
            cancel: Mutex::new(None),
            worker: Mutex::new(None),
        }
    }

    /// Build the warming strategy from a root listing, warm the Immediate
    /// tier synchronously, then hand the Background tier to the loop.
    pub async fn start(&self) {
        {
            let mut state = self.core.state.lock();
            if state.started {
                return;
            }
            state.started = true;
        }

        let root = path::normalize(&self.core.cfg.root);
        match self.core.remote.list_directory(&root).await {
            Ok(raw) => {
                let entries: Vec<Entry> = raw
                    .iter()
                    .filter_map(|r| Entry::from_remote(&root, r))
                    .collect();
                let mut immediate = Vec::new();
                for entry in &entries {
                    match self.core.classify(entry) {
                        Tier::Immediate => immediate.push(entry.path.clone()),
                        Tier::Background => {
                            self.core
                                .enqueue(entry.path.clone(), Tier::Background, Some(entry.kind));
                        }
                        Tier::OnDemand => {}
                    }
                }
                // The root path itself is the first Immediate-tier warm.
                self.core.cache.set_directory(&root, entries, None);
                self.core.state.lock().warmed += 1;
                for p in immediate {
                    self.core.warm_file(&p).await;
                }
            }
            Err(err) => {
                warn!(error = %err, "root listing failed, warming starts with an empty strategy");
            }
        }

        let cancel = CancellationToken::new();
        *self.cancel.lock() = Some(cancel.clone());
        let core = Arc::clone(&self.core);
        *self.worker.lock() = Some(tokio::spawn(run_loop(core, cancel)));
    }

    /// Queue a path of unknown kind for background warming.
    pub fn enqueue(&self, p: &str) {
        self.core.enqueue(path::normalize(p), Tier::Background, None);
    }

    pub fn status(&self) -> WarmingStatus {
        let state = self.core.state.lock();
        WarmingStatus {
            active: state.started && (!state.queue.is_empty() || !state.in_flight.is_empty()),
            queue_size: state.queue.len(),
            in_flight: state.in_flight.len(),
            warmed: state.warmed,
            failed: state.failed,
        }
    }

    /// Stop the loop and abandon in-flight work. A stopped scheduler can be
    /// started again.
    pub async fn stop(&self) {
        let cancel = self.cancel.lock().take();
        if let Some(cancel) = cancel {
            cancel.cancel();
        }
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            let _ = worker.await;
        }
        let mut state = self.core.state.lock();
        state.started = false;
        state.in_flight.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::config::CacheConfig;
    use crate::remote::fake::FakeRemote;

    fn scheduler(remote: Arc<FakeRemote>) -> (WarmingScheduler, Arc<EntryCache>) {
        let cache = Arc::new(EntryCache::new(CacheConfig::default()));
        let scheduler = WarmingScheduler::new(remote, Arc::clone(&cache), WarmingConfig::default());
        (scheduler, cache)
    }

    async fn wait_idle(scheduler: &WarmingScheduler) {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let status = scheduler.status();
                if status.queue_size == 0 && status.in_flight == 0 {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("warming did not drain in time");
    }

    #[tokio::test]
    async fn test_start_warms_immediate_tier_synchronously() {
        let remote = Arc::new(FakeRemote::new());
        remote.dir("/", &["readme.md", "data.bin", "src/", "junk/"]);
        remote.file("/readme.md", b"docs");
        let (scheduler, cache) = scheduler(remote.clone());

        scheduler.start().await;

        // Root listing and important root files are cached before start returns.
        assert!(cache.get_directory("/").is_some());
        assert_eq!(cache.get_file("/readme.md"), Some(b"docs".to_vec()));
        // OnDemand entries are never proactively fetched.
        assert_eq!(remote.read_calls("/data.bin"), 0);
        // The root listing counts as the first warm.
        assert_eq!(scheduler.status().warmed, 2);

        scheduler.stop().await;
    }

    #[tokio::test]
    async fn test_listed_kind_overrides_extension_heuristic() {
        // An extensionless important file inside a warmed directory must be
        // read as a file, not listed as a directory.
        let remote = Arc::new(FakeRemote::new());
        remote.dir("/", &["src/"]);
        remote.dir("/src", &["README", "config/"]);
        remote.dir("/src/config", &[]);
        remote.file("/src/README", b"readme");
        let (scheduler, cache) = scheduler(remote.clone());

        scheduler.start().await;
        wait_idle(&scheduler).await;

        assert_eq!(remote.read_calls("/src/README"), 1);
        assert_eq!(remote.list_calls("/src/README"), 0);
        assert_eq!(cache.get_file("/src/README"), Some(b"readme".to_vec()));
        assert_eq!(scheduler.status().failed, 0);

        scheduler.stop().await;
    }

    #[tokio::test]
    async fn test_background_tier_drains_and_self_expands() {
        let remote = Arc::new(FakeRemote::new());
        remote.dir("/", &["src/", "junk/"]);
        remote.dir("/src", &["config/", "notes.txt", "blob.bin"]);
        remote.dir("/src/config", &[]);
        remote.file("/src/notes.txt", b"n");
        let (scheduler, cache) = scheduler(remote.clone());

        scheduler.start().await;
        wait_idle(&scheduler).await;

        assert!(cache.get_directory("/src").is_some());
        // Discovered important paths were warmed in turn.
        assert!(cache.get_directory("/src/config").is_some());
        assert_eq!(cache.get_file("/src/notes.txt"), Some(b"n".to_vec()));
        // Unimportant paths stay OnDemand.
        assert_eq!(remote.list_calls("/junk"), 0);
        assert_eq!(remote.read_calls("/src/blob.bin"), 0);

        scheduler.stop().await;
    }

    #[tokio::test]
    async fn test_warming_skips_cached_paths() {
        let remote = Arc::new(FakeRemote::new());
        remote.dir("/", &["readme.md"]);
        remote.file("/readme.md", b"fresh");
        let (scheduler, cache) = scheduler(remote.clone());
        cache.set_file("/readme.md", b"already here".to_vec(), FileMeta::default());

        scheduler.start().await;
        wait_idle(&scheduler).await;

        assert_eq!(remote.read_calls("/readme.md"), 0);
        assert_eq!(cache.get_file("/readme.md"), Some(b"already here".to_vec()));

        scheduler.stop().await;
    }

    #[tokio::test]
    async fn test_failures_do_not_stall_the_crawl() {
        let remote = Arc::new(FakeRemote::new());
        remote.dir("/", &["src/", "docs/"]);
        remote.fail("/src", "unreachable");
        remote.dir("/docs", &[]);
        let (scheduler, cache) = scheduler(remote.clone());

        scheduler.start().await;
        wait_idle(&scheduler).await;

        assert!(cache.get_directory("/docs").is_some());
        assert_eq!(cache.get_directory("/src"), None);
        let status = scheduler.status();
        assert_eq!(status.failed, 1);
        assert!(status.warmed >= 1);

        scheduler.stop().await;
    }

    #[tokio::test]
    async fn test_enqueue_wakes_idle_loop() {
        let remote = Arc::new(FakeRemote::new());
        remote.dir("/", &[]);
        remote.dir("/extra", &[]);
        let (scheduler, cache) = scheduler(remote.clone());

        scheduler.start().await;
        wait_idle(&scheduler).await;

        scheduler.enqueue("/extra");
        wait_idle(&scheduler).await;
        assert!(cache.get_directory("/extra").is_some());

        scheduler.stop().await;
    }

    #[tokio::test]
    async fn test_duplicate_enqueue_collapses() {
        let remote = Arc::new(FakeRemote::new());
        remote.dir("/", &[]);
        remote.dir("/extra", &[]);
        remote.delay("/extra", Duration::from_millis(20));
        let (scheduler, _cache) = scheduler(remote.clone());

        scheduler.start().await;
        scheduler.enqueue("/extra");
        scheduler.enqueue("/extra");
        scheduler.enqueue("/extra");
        wait_idle(&scheduler).await;

        assert_eq!(remote.list_calls("/extra"), 1);
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn test_stop_is_clean_and_restartable() {
        let remote = Arc::new(FakeRemote::new());
        remote.dir("/", &["src/"]);
        remote.dir("/src", &[]);
        let (scheduler, _cache) = scheduler(remote);

        scheduler.start().await;
        scheduler.stop().await;
        assert!(!scheduler.status().active);

        scheduler.start().await;
        wait_idle(&scheduler).await;
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn test_root_listing_failure_is_not_fatal() {
        let remote = Arc::new(FakeRemote::new());
        remote.fail("/", "down");
        let (scheduler, cache) = scheduler(remote);

        scheduler.start().await;
        assert_eq!(cache.get_directory("/"), None);
        // The loop is still running and accepts later work.
        assert_eq!(scheduler.status().queue_size, 0);

        scheduler.stop().await;
    }
}

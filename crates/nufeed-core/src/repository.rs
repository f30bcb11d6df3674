//! The repository controller.
//!
//! Owns the expanded store, the metadata cache, the filesystem watcher, and
//! the background timers. Every write path (push, remove, rebuild, cache
//! clear, drop-folder scan) runs under a single gate that also suppresses
//! the watcher for its duration; readers only ever touch point-in-time cache
//! snapshots.
//!
//! Lifecycle: the first package query triggers a cold-start rebuild, binds
//! the watcher, and arms the timers. Filesystem events invalidate the cache;
//! the next query rebuilds. [`Repository::shutdown`] tears down in reverse
//! order: timers, watcher, final persist.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{Mutex, MutexGuard, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::archive::PackageArchive;
use crate::cache::MetadataCache;
use crate::compat::ClientCompatibility;
use crate::config::FeedConfig;
use crate::dependency::VersionRange;
use crate::fsutil::{is_package_file, purge_temp_files, remove_file_if_exists};
use crate::query::{self, SearchOptions};
use crate::record::PackageRecord;
use crate::snapshot::snapshot_file_name;
use crate::store::ExpandedStore;
use crate::{Error, PackageVersion, Result};

/// Interval between background persist checks.
const PERSIST_INTERVAL: Duration = Duration::from_secs(60);

/// Interval between background rebuilds, after the initial one.
const REBUILD_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// What the watcher decided to do about a filesystem event.
#[derive(Debug, PartialEq, Eq)]
enum WatchAction {
    /// A package file appeared in the drop folder; scan it.
    ScanDropFolder,
    /// Something else changed under the root; invalidate the cache.
    Invalidate,
}

/// Classify one watcher event path. Only package files matter; snapshot
/// writes, temp files, and marker files never invalidate the cache.
fn classify_event(root: &Path, kind: &EventKind, path: &Path) -> Option<WatchAction> {
    if !is_package_file(path) {
        return None;
    }
    let in_root = path.parent() == Some(root);
    match kind {
        EventKind::Create(_) | EventKind::Modify(_) if in_root => Some(WatchAction::ScanDropFolder),
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_) => {
            Some(WatchAction::Invalidate)
        },
        _ => None,
    }
}

struct BackgroundState {
    watcher: Option<RecommendedWatcher>,
    tasks: Vec<JoinHandle<()>>,
}

/// Serializes writers and keeps the watcher suppressed while held.
struct GateGuard<'a> {
    _lock: MutexGuard<'a, ()>,
    suppressed: &'a AtomicBool,
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        self.suppressed.store(false, Ordering::SeqCst);
    }
}

/// The package feed storage engine.
pub struct Repository {
    config: FeedConfig,
    store: ExpandedStore,
    cache: MetadataCache,
    gate: Mutex<()>,
    needs_rebuild: AtomicBool,
    watcher_suppressed: AtomicBool,
    background_started: AtomicBool,
    background: std::sync::Mutex<BackgroundState>,
    shutdown: CancellationToken,
}

impl Repository {
    /// Create a repository over the configured package root.
    ///
    /// Loads the snapshot if one exists; the store itself is not touched
    /// until the first query or write.
    pub fn new(config: FeedConfig) -> Result<Arc<Self>> {
        let store = ExpandedStore::new(config.package_root.clone(), config.enable_delisting)?;
        let snapshot_path = config.package_root.join(snapshot_file_name());
        let cache = MetadataCache::new(snapshot_path)?;

        Ok(Arc::new(Self {
            config,
            store,
            cache,
            gate: Mutex::new(()),
            needs_rebuild: AtomicBool::new(false),
            watcher_suppressed: AtomicBool::new(false),
            background_started: AtomicBool::new(false),
            background: std::sync::Mutex::new(BackgroundState {
                watcher: None,
                tasks: Vec::new(),
            }),
            shutdown: CancellationToken::new(),
        }))
    }

    /// The active configuration.
    #[must_use]
    pub const fn config(&self) -> &FeedConfig {
        &self.config
    }

    /// Acquire the writer gate, cancellably, suppressing the watcher until
    /// the guard drops.
    async fn acquire_gate(&self, cancel: &CancellationToken) -> Result<GateGuard<'_>> {
        if cancel.is_cancelled() || self.shutdown.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let lock = tokio::select! {
            lock = self.gate.lock() => lock,
            () = cancel.cancelled() => return Err(Error::Cancelled),
            () = self.shutdown.cancelled() => return Err(Error::Cancelled),
        };
        self.watcher_suppressed.store(true, Ordering::SeqCst);
        Ok(GateGuard {
            _lock: lock,
            suppressed: &self.watcher_suppressed,
        })
    }

    /// Push a package archive into the feed.
    ///
    /// Admissibility is checked in order: a symbols package is rejected when
    /// symbols packages are ignored, then a duplicate identity is rejected
    /// when overwriting on push is disabled. Pushing over an unlisted
    /// version (with overwriting allowed) re-lists it.
    pub async fn add_package(
        &self,
        archive_path: &Path,
        cancel: &CancellationToken,
    ) -> Result<PackageRecord> {
        let path = archive_path.to_path_buf();
        let archive = tokio::task::spawn_blocking(move || PackageArchive::open(&path))
            .await
            .map_err(|e| Error::Storage(format!("archive open task failed: {e}")))??;

        if self.config.ignore_symbols_packages && archive.is_symbols_package() {
            return Err(Error::InvalidPackage(format!(
                "symbols package {} {} is not accepted by this feed",
                archive.id(),
                archive.version()
            )));
        }

        let _gate = self.acquire_gate(cancel).await?;

        if !self.config.allow_override_existing_package_on_push
            && self.cache.exists(archive.id(), archive.version()).await
        {
            return Err(Error::DuplicatePackage {
                id: archive.id().to_string(),
                version: archive.version().normalized(),
            });
        }
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let store = self.store.clone();
        let record = tokio::task::spawn_blocking(move || store.add(&archive))
            .await
            .map_err(|e| Error::Storage(format!("store add task failed: {e}")))??;

        self.cache.add(record.clone()).await;
        info!(id = %record.id, version = %record.version, "Package added");
        Ok(record)
    }

    /// Remove a package: an unlist when delisting is enabled, a hard delete
    /// otherwise. Removing an identity not in the cache is a logged no-op.
    pub async fn remove_package(
        &self,
        id: &str,
        version: &PackageVersion,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if !self.cache.exists(id, version).await {
            info!(id, version = %version.normalized(), "Remove skipped: package not in cache");
            return Ok(());
        }

        let _gate = self.acquire_gate(cancel).await?;

        let store = self.store.clone();
        let soft = self.config.enable_delisting;
        let (owned_id, owned_version) = (id.to_string(), version.clone());
        tokio::task::spawn_blocking(move || {
            if soft {
                store.soft_delete(&owned_id, &owned_version)
            } else {
                store.hard_delete(&owned_id, &owned_version)
            }
        })
        .await
        .map_err(|e| Error::Storage(format!("store delete task failed: {e}")))??;

        self.cache.remove(id, version, soft).await;
        info!(id, version = %version.normalized(), soft, "Package removed");
        Ok(())
    }

    /// All packages visible to the client, rebuilding the cache first when
    /// it is empty or invalidated. The first call also binds the watcher
    /// and arms the background timers.
    pub async fn get_packages(
        self: &Arc<Self>,
        compat: &ClientCompatibility,
        cancel: &CancellationToken,
    ) -> Result<Vec<PackageRecord>> {
        let records = self.current_records(cancel).await?;
        Ok(query::restrict_to_compat(records, compat))
    }

    /// Case-insensitive id listing, compat-gated.
    pub async fn find_packages_by_id(
        self: &Arc<Self>,
        id: &str,
        compat: &ClientCompatibility,
        cancel: &CancellationToken,
    ) -> Result<Vec<PackageRecord>> {
        let records = self.get_packages(compat, cancel).await?;
        Ok(query::find_packages_by_id(&records, id))
    }

    /// Exact identity lookup. Absent identities are `None`, not an error.
    pub async fn find_package(
        self: &Arc<Self>,
        id: &str,
        version: &PackageVersion,
        cancel: &CancellationToken,
    ) -> Result<Option<PackageRecord>> {
        let records = self.current_records(cancel).await?;
        Ok(query::find_package(&records, id, version))
    }

    /// True when the identity is present in the feed.
    pub async fn exists(
        self: &Arc<Self>,
        id: &str,
        version: &PackageVersion,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        Ok(self.find_package(id, version, cancel).await?.is_some())
    }

    /// Canonical archive path and size for a download, when present.
    pub async fn open_package(
        self: &Arc<Self>,
        id: &str,
        version: &PackageVersion,
        cancel: &CancellationToken,
    ) -> Result<Option<(PathBuf, u64)>> {
        if self.find_package(id, version, cancel).await?.is_none() {
            return Ok(None);
        }
        Ok(self.store.open(id, version))
    }

    /// Tokenized search over the visible snapshot.
    pub async fn search(
        self: &Arc<Self>,
        term: &str,
        target_frameworks: &[String],
        allow_prerelease: bool,
        compat: &ClientCompatibility,
        cancel: &CancellationToken,
    ) -> Result<Vec<PackageRecord>> {
        let records = self.get_packages(compat, cancel).await?;
        let options = SearchOptions {
            allow_prerelease,
            drop_unlisted: self.config.enable_delisting,
            target_frameworks: target_frameworks.to_vec(),
            filter_frameworks: self.config.enable_framework_filtering,
        };
        Ok(query::search(&records, term, &options))
    }

    /// Update-check query over the visible snapshot.
    #[allow(clippy::too_many_arguments)]
    pub async fn get_updates(
        self: &Arc<Self>,
        names: &[(String, PackageVersion)],
        version_constraints: Option<&[Option<VersionRange>]>,
        include_prerelease: bool,
        include_all_versions: bool,
        target_frameworks: &[String],
        compat: &ClientCompatibility,
        cancel: &CancellationToken,
    ) -> Result<Vec<PackageRecord>> {
        let records = self.get_packages(compat, cancel).await?;
        query::get_updates(
            &records,
            names,
            version_constraints,
            include_prerelease,
            include_all_versions,
            target_frameworks,
        )
    }

    /// Purge the cache, persist the empty snapshot, and mark the repository
    /// for rebuild on the next query.
    pub async fn clear_cache(&self, cancel: &CancellationToken) -> Result<()> {
        let _gate = self.acquire_gate(cancel).await?;
        self.cache.clear().await;
        self.cache.persist().await?;
        self.needs_rebuild.store(true, Ordering::SeqCst);
        debug!("Cache cleared; rebuild scheduled");
        Ok(())
    }

    /// Rebuild the cache from the expanded store and ingest the drop
    /// folder, under the gate.
    pub async fn rebuild(&self, cancel: &CancellationToken) -> Result<()> {
        let _gate = self.acquire_gate(cancel).await?;
        self.rebuild_locked(cancel).await
    }

    /// Snapshot of the cache, hydrating it first when cold or invalidated.
    async fn current_records(
        self: &Arc<Self>,
        cancel: &CancellationToken,
    ) -> Result<Vec<PackageRecord>> {
        self.ensure_background_started();

        // Double-checked: the cheap test outside the gate, the authoritative
        // one inside.
        if self.needs_rebuild.load(Ordering::SeqCst) || self.cache.is_empty().await {
            let _gate = self.acquire_gate(cancel).await?;
            if self.needs_rebuild.load(Ordering::SeqCst) || self.cache.is_empty().await {
                self.rebuild_locked(cancel).await?;
            }
        }

        Ok(self.cache.get_all().await)
    }

    /// The rebuild body; callers must hold the gate.
    async fn rebuild_locked(&self, cancel: &CancellationToken) -> Result<()> {
        info!(root = %self.store.root().display(), "Rebuilding metadata cache");
        let records = self.store.enumerate_all(cancel).await?;
        self.cache.clear().await;
        self.cache.add_many(records).await;

        self.scan_drop_folder_locked(cancel).await?;

        self.cache.persist_if_dirty().await?;
        self.needs_rebuild.store(false, Ordering::SeqCst);
        info!("Metadata cache rebuilt");
        Ok(())
    }

    /// Ingest root-level package files; callers must hold the gate.
    ///
    /// Files that cannot be read yet (still being copied), fail to parse,
    /// or are inadmissible are logged and left in place for a later scan;
    /// successfully stored packages have their drop file deleted.
    async fn scan_drop_folder_locked(&self, cancel: &CancellationToken) -> Result<()> {
        let root = self.store.root().to_path_buf();
        let drops = tokio::task::spawn_blocking(move || -> Result<Vec<PathBuf>> {
            let mut drops = Vec::new();
            for entry in std::fs::read_dir(&root)? {
                let path = entry?.path();
                if path.is_file() && is_package_file(&path) {
                    drops.push(path);
                }
            }
            Ok(drops)
        })
        .await
        .map_err(|e| Error::Storage(format!("drop scan task failed: {e}")))??;

        for drop in drops {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            if let Err(e) = self.ingest_drop_file(&drop).await {
                warn!(path = %drop.display(), error = %e, "Skipping drop-folder package");
            }
        }

        // Scratch left behind by interrupted copies into the root.
        let root = self.store.root().to_path_buf();
        tokio::task::spawn_blocking(move || purge_temp_files(&root))
            .await
            .map_err(|e| Error::Storage(format!("temp purge task failed: {e}")))??;
        Ok(())
    }

    async fn ingest_drop_file(&self, path: &Path) -> Result<()> {
        let owned = path.to_path_buf();
        let archive = tokio::task::spawn_blocking(move || PackageArchive::open(&owned))
            .await
            .map_err(|e| Error::Storage(format!("archive open task failed: {e}")))??;

        if self.config.ignore_symbols_packages && archive.is_symbols_package() {
            return Err(Error::InvalidPackage(format!(
                "symbols package {} {}",
                archive.id(),
                archive.version()
            )));
        }
        if !self.config.allow_override_existing_package_on_push
            && self.cache.exists(archive.id(), archive.version()).await
        {
            return Err(Error::DuplicatePackage {
                id: archive.id().to_string(),
                version: archive.version().normalized(),
            });
        }

        let store = self.store.clone();
        let record = tokio::task::spawn_blocking(move || store.add(&archive))
            .await
            .map_err(|e| Error::Storage(format!("store add task failed: {e}")))??;
        self.cache.add(record.clone()).await;

        remove_file_if_exists(path)?;
        info!(id = %record.id, version = %record.version, "Ingested drop-folder package");
        Ok(())
    }

    /// Bind the watcher and arm the timers, once, if enabled.
    fn ensure_background_started(self: &Arc<Self>) {
        if self
            .background_started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        let Ok(mut background) = self.background.lock() else {
            return;
        };

        if self.config.enable_file_system_monitoring {
            match self.bind_watcher() {
                Ok(watcher) => background.watcher = Some(watcher),
                Err(e) => error!(error = %e, "Failed to bind filesystem watcher"),
            }
        }

        if self.config.enable_background_tasks {
            background.tasks.push(self.spawn_persist_timer());
            background.tasks.push(self.spawn_rebuild_timer());
        }
    }

    fn bind_watcher(self: &Arc<Self>) -> notify::Result<RecommendedWatcher> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |event: notify::Result<Event>| {
            let _ = tx.send(event);
        })?;
        watcher.watch(self.store.root(), RecursiveMode::Recursive)?;

        let weak = Arc::downgrade(self);
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            watch_loop(weak, rx, shutdown).await;
        });

        debug!(root = %self.store.root().display(), "Filesystem watcher bound");
        Ok(watcher)
    }

    fn spawn_persist_timer(self: &Arc<Self>) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + PERSIST_INTERVAL;
            let mut interval = tokio::time::interval_at(start, PERSIST_INTERVAL);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    _ = interval.tick() => {},
                }
                let Some(repo) = weak.upgrade() else { break };
                if let Err(e) = repo.cache.persist_if_dirty().await {
                    error!(error = %e, "Background persist failed");
                }
            }
        })
    }

    fn spawn_rebuild_timer(self: &Arc<Self>) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        let shutdown = self.shutdown.clone();
        let initial = Duration::from_secs(self.config.initial_cache_rebuild_after_seconds);
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + initial;
            let mut interval = tokio::time::interval_at(start, REBUILD_INTERVAL);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    _ = interval.tick() => {},
                }
                let Some(repo) = weak.upgrade() else { break };
                if let Err(e) = repo.rebuild(&shutdown).await {
                    error!(error = %e, "Background rebuild failed");
                }
            }
        })
    }

    /// Quiesce the repository: stop timers, unbind the watcher, flush the
    /// cache. The reverse of initialization.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();

        let (watcher, tasks) = match self.background.lock() {
            Ok(mut background) => (background.watcher.take(), std::mem::take(&mut background.tasks)),
            Err(_) => (None, Vec::new()),
        };
        for task in tasks {
            task.abort();
        }
        drop(watcher);

        if let Err(e) = self.cache.persist_if_dirty().await {
            error!(error = %e, "Final persist failed during shutdown");
        }
        debug!("Repository shut down");
    }
}

impl Drop for Repository {
    fn drop(&mut self) {
        // Best-effort: wake any task still holding a Weak reference.
        self.shutdown.cancel();
    }
}

/// Drain watcher events until shutdown. Events observed while a writer
/// holds the gate are discarded; the writer already accounts for its own
/// filesystem effects. Nothing here may panic or propagate.
async fn watch_loop(
    repo: Weak<Repository>,
    mut rx: mpsc::UnboundedReceiver<notify::Result<Event>>,
    shutdown: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            () = shutdown.cancelled() => break,
            event = rx.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        let Some(repo) = repo.upgrade() else { break };

        let event = match event {
            Ok(event) => event,
            Err(e) => {
                // Transient watcher errors (common during teardown) are not
                // worth more than a warning.
                warn!(error = %e, "Filesystem watcher error");
                continue;
            },
        };

        if repo.watcher_suppressed.load(Ordering::SeqCst) {
            debug!("Watcher suppressed; discarding event");
            continue;
        }

        let root = repo.store.root().to_path_buf();
        let mut invalidate = false;
        let mut scan = false;
        for path in &event.paths {
            match classify_event(&root, &event.kind, path) {
                Some(WatchAction::ScanDropFolder) => scan = true,
                Some(WatchAction::Invalidate) => invalidate = true,
                None => {},
            }
        }

        if invalidate {
            if let Err(e) = repo.clear_cache(&shutdown).await {
                error!(error = %e, "Cache invalidation from watcher failed");
            }
        } else if scan {
            if let Err(e) = run_drop_scan(&repo, &shutdown).await {
                error!(error = %e, "Drop-folder scan from watcher failed");
            }
        }
    }
    debug!("Watcher loop exited");
}

async fn run_drop_scan(repo: &Arc<Repository>, cancel: &CancellationToken) -> Result<()> {
    let _gate = repo.acquire_gate(cancel).await?;
    repo.scan_drop_folder_locked(cancel).await?;
    repo.cache.persist_if_dirty().await
}

//! Drives `Watcher` events into `CodeIndexer::reindex_path` (spec §4.3.5):
//! a bounded worker pool reading a debounced, path-keyed event stream, with
//! "at most one in-flight pipeline per path, parallelism <= W across paths,
//! cancellation at every await" (spec §5).

use std::path::PathBuf;
use std::sync::Arc;

use cortex_core::error::Result;
use cortex_ingestion::{FileEvent, Watcher, DEFAULT_DEBOUNCE};
use dashmap::DashMap;
use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::code_indexer::CodeIndexer;

const DEFAULT_WORKERS: usize = 4;

/// Owns the `notify`-backed `Watcher` and the worker pool that turns its
/// debounced events into `CodeIndexer::reindex_path` calls. One instance
/// serves every watched folder; `watch`/`unwatch` add and remove roots as
/// folders transition `active`/`paused`/removed (spec §4.3.7).
pub struct CodeWatchPipeline {
    indexer: Arc<CodeIndexer>,
    watcher: Mutex<Watcher>,
    path_locks: Arc<DashMap<PathBuf, Arc<Mutex<()>>>>,
    permits: Arc<Semaphore>,
    cancel: CancellationToken,
}

impl CodeWatchPipeline {
    pub fn new(indexer: Arc<CodeIndexer>) -> Result<(Arc<Self>, tokio::task::JoinHandle<()>)> {
        Self::with_worker_count(indexer, DEFAULT_WORKERS, DEFAULT_DEBOUNCE)
    }

    pub fn with_worker_count(
        indexer: Arc<CodeIndexer>,
        worker_count: usize,
        debounce: std::time::Duration,
    ) -> Result<(Arc<Self>, tokio::task::JoinHandle<()>)> {
        let (watcher, mut events) = Watcher::new(debounce)?;
        let pipeline = Arc::new(Self {
            indexer,
            watcher: Mutex::new(watcher),
            path_locks: Arc::new(DashMap::new()),
            permits: Arc::new(Semaphore::new(worker_count.max(1))),
            cancel: CancellationToken::new(),
        });

        let driver = pipeline.clone();
        let handle = tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = driver.cancel.cancelled() => break,
                    event = events.recv() => event,
                };
                let Some(event) = event else { break };
                driver.dispatch(event);
            }
        });

        Ok((pipeline, handle))
    }

    pub async fn watch(&self, path: &std::path::Path) -> Result<()> {
        self.watcher.lock().await.watch(path)
    }

    pub async fn unwatch(&self, path: &std::path::Path) -> Result<()> {
        self.watcher.lock().await.unwatch(path)
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Spawns a bounded task for one settled event: acquires a worker-pool
    /// permit, then the per-path lock, so a slow pipeline run on `path`
    /// can't race a second event for the same path while a cross-path
    /// worker slot is free for everything else.
    fn dispatch(&self, event: FileEvent) {
        let indexer = self.indexer.clone();
        let path_locks = self.path_locks.clone();
        let permits = self.permits.clone();
        let cancel = self.cancel.clone();
        let path = event.path.clone();

        tokio::spawn(async move {
            let permit = tokio::select! {
                _ = cancel.cancelled() => return,
                permit = permits.acquire_owned() => permit,
            };
            let Ok(_permit) = permit else { return };

            let path_lock = path_locks
                .entry(path.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone();
            let _guard = tokio::select! {
                _ = cancel.cancelled() => return,
                guard = path_lock.lock() => guard,
            };

            debug!(?event, "reindexing path from watcher event");
            if let Err(e) = indexer.reindex_path(&path).await {
                warn!(path = %path.display(), error = %e, "watcher-driven reindex failed");
            }
        });
    }
}

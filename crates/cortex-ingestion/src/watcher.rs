//! The `FilesystemWatcher` collaborator (spec §6.1), backed by the `notify`
//! crate. Debounces events per-path with a 500ms window (spec §4.3.5):
//! rapid successive writes to the same path coalesce into one emitted
//! event, and cancellation (dropping the watcher) is observed immediately.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use cortex_core::error::{CortexError, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcher};
use parking_lot::Mutex;
use tokio::sync::mpsc;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Modified,
    Removed,
    Renamed,
}

#[derive(Debug, Clone)]
pub struct FileEvent {
    pub kind: ChangeKind,
    pub path: PathBuf,
    pub timestamp: DateTime<Utc>,
}

fn classify(kind: &EventKind) -> Option<ChangeKind> {
    match kind {
        EventKind::Create(_) => Some(ChangeKind::Created),
        EventKind::Modify(notify::event::ModifyKind::Name(_)) => Some(ChangeKind::Renamed),
        EventKind::Modify(_) => Some(ChangeKind::Modified),
        EventKind::Remove(_) => Some(ChangeKind::Removed),
        _ => None,
    }
}

/// Debounces raw filesystem events per path and forwards at most one
/// coalesced event per path per debounce window.
struct Debouncer {
    window: Duration,
    /// Monotonically increasing per-path generation; a scheduled emit only
    /// fires if its generation is still the latest when its timer elapses.
    generations: Arc<Mutex<HashMap<PathBuf, u64>>>,
}

impl Debouncer {
    fn new(window: Duration) -> Self {
        Self {
            window,
            generations: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn notify(&self, event: FileEvent, out: mpsc::UnboundedSender<FileEvent>) {
        let generation = {
            let mut guard = self.generations.lock();
            let entry = guard.entry(event.path.clone()).or_insert(0);
            *entry += 1;
            *entry
        };
        let generations = self.generations.clone();
        let window = self.window;
        tokio::spawn(async move {
            tokio::time::sleep(window).await;
            let should_emit = {
                let guard = generations.lock();
                guard.get(&event.path).copied() == Some(generation)
            };
            if should_emit {
                let _ = out.send(event);
            }
        });
    }
}

/// Wraps a `notify::RecommendedWatcher`, translating raw events through a
/// `PathMapper` and debouncing them before they reach the pipeline queue.
pub struct Watcher {
    inner: RecommendedWatcher,
    debouncer: Arc<Debouncer>,
    sender: mpsc::UnboundedSender<FileEvent>,
}

impl Watcher {
    pub fn new(debounce: Duration) -> Result<(Self, mpsc::UnboundedReceiver<FileEvent>)> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let debouncer = Arc::new(Debouncer::new(debounce));
        let debouncer_for_cb = debouncer.clone();
        let sender_for_cb = sender.clone();

        let inner = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let Ok(event) = res else { return };
            let Some(kind) = classify(&event.kind) else {
                return;
            };
            for path in event.paths {
                debouncer_for_cb.notify(
                    FileEvent {
                        kind,
                        path,
                        timestamp: Utc::now(),
                    },
                    sender_for_cb.clone(),
                );
            }
        })
        .map_err(|e| CortexError::internal(format!("failed to start filesystem watcher: {e}")))?;

        Ok((
            Self {
                inner,
                debouncer,
                sender,
            },
            receiver,
        ))
    }

    pub fn watch(&mut self, path: &Path) -> Result<()> {
        self.inner
            .watch(path, RecursiveMode::Recursive)
            .map_err(|e| CortexError::internal(format!("failed to watch {}: {e}", path.display())))
    }

    pub fn unwatch(&mut self, path: &Path) -> Result<()> {
        self.inner
            .unwatch(path)
            .map_err(|e| CortexError::internal(format!("failed to unwatch {}: {e}", path.display())))
    }

    /// Test-only hook: inject a synthetic event as if it came from the OS,
    /// through the same debounce path real events take.
    #[cfg(any(test, feature = "test-util"))]
    pub fn inject(&self, event: FileEvent) {
        self.debouncer.notify(event, self.sender.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn rapid_events_on_one_path_coalesce_to_one() {
        let (watcher, mut rx) = Watcher::new(Duration::from_millis(500)).unwrap();
        let path = PathBuf::from("/src/main.rs");

        for _ in 0..10 {
            watcher.inject(FileEvent {
                kind: ChangeKind::Modified,
                path: path.clone(),
                timestamp: Utc::now(),
            });
            tokio::time::advance(Duration::from_millis(40)).await;
        }

        tokio::time::advance(Duration::from_millis(600)).await;
        let first = rx.recv().await.unwrap();
        assert_eq!(first.path, path);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn events_on_different_paths_both_emit() {
        let (watcher, mut rx) = Watcher::new(Duration::from_millis(500)).unwrap();
        watcher.inject(FileEvent {
            kind: ChangeKind::Created,
            path: PathBuf::from("/a.rs"),
            timestamp: Utc::now(),
        });
        watcher.inject(FileEvent {
            kind: ChangeKind::Created,
            path: PathBuf::from("/b.rs"),
            timestamp: Utc::now(),
        });
        tokio::time::advance(Duration::from_millis(600)).await;

        let mut seen = vec![rx.recv().await.unwrap().path, rx.recv().await.unwrap().path];
        seen.sort();
        assert_eq!(seen, vec![PathBuf::from("/a.rs"), PathBuf::from("/b.rs")]);
    }
}

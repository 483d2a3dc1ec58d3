//! Debounced directory watching.
//!
//! Wraps the platform filesystem watcher and turns its raw event stream
//! into coalesced per-path change records. The OS delivers duplicated and
//! unordered events (several "modified" per write, no created/changed
//! ordering guarantee), so events for the same path within the debounce
//! window collapse into one record carrying the latest observed kind.
//!
//! The watcher never invokes callbacks: raw events cross from the notify
//! thread over a channel and are drained by [`DirectoryWatcher::poll`] on
//! the caller's thread, so consumers stay single-threaded.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver};
use std::time::{Duration, Instant};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, warn};

use super::error::PluginResult;

/// Default debounce interval for filesystem change events.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Kind of a coalesced filesystem change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsChangeKind {
    Created,
    Changed,
    Removed,
}

/// A coalesced filesystem change for one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsChange {
    pub path: PathBuf,
    pub kind: FsChangeKind,
}

struct Pending {
    kind: FsChangeKind,
    deadline: Instant,
}

/// Watches directories (non-recursively) and hands out debounced changes.
pub struct DirectoryWatcher {
    watcher: RecommendedWatcher,
    raw_rx: Receiver<notify::Result<Event>>,
    watched: Vec<PathBuf>,
    debounce: Duration,
    pending: HashMap<PathBuf, Pending>,
}

impl DirectoryWatcher {
    /// Create a watcher with the default debounce interval.
    pub fn new() -> PluginResult<Self> {
        Self::with_debounce(DEFAULT_DEBOUNCE)
    }

    /// Create a watcher with a custom debounce interval.
    pub fn with_debounce(debounce: Duration) -> PluginResult<Self> {
        let (raw_tx, raw_rx) = mpsc::channel();

        let watcher = RecommendedWatcher::new(
            move |res| {
                let _ = raw_tx.send(res);
            },
            notify::Config::default(),
        )?;

        Ok(Self {
            watcher,
            raw_rx,
            watched: Vec::new(),
            debounce,
            pending: HashMap::new(),
        })
    }

    /// Subscribe a directory to change notifications.
    pub fn watch(&mut self, dir: &Path) -> PluginResult<()> {
        self.watcher.watch(dir, RecursiveMode::NonRecursive)?;
        self.watched.push(dir.to_path_buf());
        Ok(())
    }

    /// Cancel all directory subscriptions and discard pending changes.
    ///
    /// Cancellation is synchronous: after this returns no change for the
    /// old directories will be handed out by [`poll`](Self::poll).
    pub fn unwatch_all(&mut self) {
        for dir in self.watched.drain(..) {
            if let Err(e) = self.watcher.unwatch(&dir) {
                debug!("Could not unwatch {}: {}", dir.display(), e);
            }
        }
        // Discard raw events already queued for the old directories, so a
        // stale create cannot resurface as a fresh change after rewatching.
        for _ in self.raw_rx.try_iter() {}
        self.pending.clear();
    }

    /// Directories currently subscribed.
    pub fn watched(&self) -> &[PathBuf] {
        &self.watched
    }

    /// Drain raw events and return the changes whose debounce window has
    /// expired, sorted by path.
    pub fn poll(&mut self) -> Vec<FsChange> {
        for res in self.raw_rx.try_iter() {
            match res {
                Ok(event) => {
                    let kind = match event.kind {
                        EventKind::Create(_) => FsChangeKind::Created,
                        EventKind::Modify(_) => FsChangeKind::Changed,
                        EventKind::Remove(_) => FsChangeKind::Removed,
                        _ => continue,
                    };
                    let deadline = Instant::now() + self.debounce;
                    for path in event.paths {
                        // Latest kind wins; the deadline is pushed back so a
                        // burst of events yields exactly one change record.
                        self.pending.insert(path, Pending { kind, deadline });
                    }
                }
                Err(e) => warn!("Filesystem watcher error: {}", e),
            }
        }

        let now = Instant::now();
        let mut changes = Vec::new();
        self.pending.retain(|path, pending| {
            if pending.deadline <= now {
                changes.push(FsChange {
                    path: path.clone(),
                    kind: pending.kind,
                });
                false
            } else {
                true
            }
        });

        changes.sort_by(|a, b| a.path.cmp(&b.path));
        changes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::thread::sleep;
    use tempfile::TempDir;

    #[test]
    fn test_watch_and_unwatch() {
        let dir = TempDir::new().unwrap();
        let mut watcher = DirectoryWatcher::with_debounce(Duration::ZERO).unwrap();

        watcher.watch(dir.path()).unwrap();
        assert_eq!(watcher.watched().len(), 1);

        watcher.unwatch_all();
        assert!(watcher.watched().is_empty());
    }

    #[test]
    fn test_watch_missing_directory_fails() {
        let mut watcher = DirectoryWatcher::with_debounce(Duration::ZERO).unwrap();
        assert!(watcher.watch(Path::new("/nonexistent/alcove-test")).is_err());
    }

    #[test]
    fn test_poll_on_idle_watcher_is_empty() {
        let dir = TempDir::new().unwrap();
        let mut watcher = DirectoryWatcher::with_debounce(Duration::ZERO).unwrap();
        watcher.watch(dir.path()).unwrap();
        assert!(watcher.poll().is_empty());
    }

    /// Relies on real inotify/FSEvents latency; run manually with `--ignored`.
    #[test]
    #[ignore = "flaky on CI due to filesystem timing"]
    fn test_create_is_reported_once_despite_event_bursts() {
        let dir = TempDir::new().unwrap();
        let mut watcher = DirectoryWatcher::with_debounce(Duration::from_millis(50)).unwrap();
        watcher.watch(dir.path()).unwrap();

        let file = dir.path().join("x.desktop");
        fs::write(&file, "[Desktop Entry]\n").unwrap();
        fs::write(&file, "[Desktop Entry]\nName=X\n").unwrap();

        let mut changes = Vec::new();
        for _ in 0..40 {
            sleep(Duration::from_millis(50));
            changes.extend(watcher.poll());
            if !changes.is_empty() {
                break;
            }
        }

        let for_file: Vec<_> = changes.iter().filter(|c| c.path == file).collect();
        assert_eq!(for_file.len(), 1, "burst should coalesce to one change");
    }
}

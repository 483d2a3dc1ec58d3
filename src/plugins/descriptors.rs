//! Descriptor discovery and availability tracking.
//!
//! Plugin descriptors are `.desktop` files living in the configured plugin
//! directories. The store keeps the authoritative mapping from descriptor
//! path to discovery state, rescans directories on (re)configuration and
//! classifies filesystem changes into added/updated/removed events.
//!
//! Classification is deliberately idempotent: the platform monitor delivers
//! coalesced and duplicated events, so replaying a change for a path in the
//! same state never corrupts the mapping. Whether a change is "added" or
//! "updated" is decided purely by presence in the mapping.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, warn};

use super::error::PluginResult;
use super::watcher::{DirectoryWatcher, FsChangeKind};

/// File suffix that identifies a plugin descriptor.
pub const DESCRIPTOR_SUFFIX: &str = ".desktop";

/// Discovery state of a known descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorState {
    /// Seen on disk, not yet instantiated.
    Available,
    /// A caller has requested instantiation of this descriptor.
    Loaded,
}

/// Classification of a filesystem change against the availability mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorChange {
    /// A descriptor appeared that was not in the mapping.
    Added,
    /// A known descriptor's file changed.
    Updated,
    /// A known descriptor's file disappeared.
    Removed,
    /// Not a descriptor, or a removal of an unknown path.
    Ignored,
}

/// A classified change for one descriptor path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorEvent {
    pub path: PathBuf,
    pub change: DescriptorChange,
}

/// Tracks which descriptors exist in the watched plugin directories.
pub struct DescriptorStore {
    available: BTreeMap<PathBuf, DescriptorState>,
    watcher: DirectoryWatcher,
}

impl DescriptorStore {
    /// Create an empty store with the default debounce interval.
    pub fn new() -> PluginResult<Self> {
        Ok(Self {
            available: BTreeMap::new(),
            watcher: DirectoryWatcher::new()?,
        })
    }

    /// Create an empty store with a custom debounce interval.
    pub fn with_debounce(debounce: Duration) -> PluginResult<Self> {
        Ok(Self {
            available: BTreeMap::new(),
            watcher: DirectoryWatcher::with_debounce(debounce)?,
        })
    }

    /// Point the store at a new set of plugin directories.
    ///
    /// Cancels all previous directory subscriptions, clears the mapping and
    /// rescans each directory for descriptor files. Directories are
    /// subscribed only after every scan has completed, so no change event
    /// for the new directories can be observed before configuration is
    /// done. A directory that cannot be read is logged and skipped; it does
    /// not abort the others.
    pub fn configure(&mut self, dirs: &[PathBuf]) {
        self.watcher.unwatch_all();
        self.available.clear();

        for dir in dirs {
            self.scan_directory(dir);
        }

        for dir in dirs {
            if let Err(e) = self.watcher.watch(dir) {
                warn!("Could not watch plugin directory {}: {}", dir.display(), e);
            }
        }
    }

    fn scan_directory(&mut self, dir: &Path) {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Could not read plugin directory {}: {}", dir.display(), e);
                return;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if is_descriptor(&path) {
                self.available.insert(path, DescriptorState::Available);
            }
        }
    }

    /// Classify a single filesystem change and update the mapping.
    ///
    /// Non-descriptor paths (e.g. temporary package-manager files) are
    /// ignored. A created or changed descriptor already in the mapping is
    /// `Updated`; one not yet known is inserted and `Added`. A removal of
    /// an unknown path is a no-op, not an error.
    pub fn on_change(&mut self, path: &Path, kind: FsChangeKind) -> DescriptorChange {
        if !is_descriptor(path) {
            return DescriptorChange::Ignored;
        }

        match kind {
            FsChangeKind::Created | FsChangeKind::Changed => {
                if self.available.contains_key(path) {
                    debug!("Descriptor updated: {}", path.display());
                    DescriptorChange::Updated
                } else {
                    debug!("Descriptor added: {}", path.display());
                    self.available
                        .insert(path.to_path_buf(), DescriptorState::Available);
                    DescriptorChange::Added
                }
            }
            FsChangeKind::Removed => {
                if self.available.remove(path).is_some() {
                    debug!("Descriptor removed: {}", path.display());
                    DescriptorChange::Removed
                } else {
                    DescriptorChange::Ignored
                }
            }
        }
    }

    /// Drain pending filesystem changes and return the classified events.
    ///
    /// `Ignored` changes are filtered out.
    pub fn poll(&mut self) -> Vec<DescriptorEvent> {
        let changes = self.watcher.poll();
        let mut events = Vec::new();

        for change in changes {
            let classified = self.on_change(&change.path, change.kind);
            if classified != DescriptorChange::Ignored {
                events.push(DescriptorEvent {
                    path: change.path,
                    change: classified,
                });
            }
        }

        events
    }

    /// Mark a descriptor as loaded. Returns false for unknown paths.
    pub fn mark_loaded(&mut self, path: &Path) -> bool {
        match self.available.get_mut(path) {
            Some(state) => {
                *state = DescriptorState::Loaded;
                true
            }
            None => false,
        }
    }

    /// Discovery state of a descriptor, or `None` if unknown.
    pub fn state(&self, path: &Path) -> Option<DescriptorState> {
        self.available.get(path).copied()
    }

    /// Snapshot of all known descriptor paths, sorted.
    ///
    /// The snapshot is not stable across the next event.
    pub fn list_available(&self) -> Vec<PathBuf> {
        self.available.keys().cloned().collect()
    }

    /// Number of known descriptors.
    pub fn len(&self) -> usize {
        self.available.len()
    }

    /// True when no descriptors are known.
    pub fn is_empty(&self) -> bool {
        self.available.is_empty()
    }
}

fn is_descriptor(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.ends_with(DESCRIPTOR_SUFFIX))
}

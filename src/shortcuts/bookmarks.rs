//! Bookmark shortcut bookkeeping.
//!
//! Bookmark shortcuts are a special kind of shortcut whose metadata
//! (label, url, thumbnail) lives in the settings store next to the id
//! list. Adding a bookmark generates a unique id from its URL, copies the
//! thumbnail into an on-disk cache and appends the id to the stored list;
//! the shortcut set picks the new id up through its change notification.

use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tracing::{debug, warn};

use super::store::SettingsStore;

/// Store key holding the ordered list of bookmark shortcut ids.
pub const BOOKMARK_SHORTCUTS_KEY: &str = "/apps/alcove/bookmark-shortcuts";

/// Store prefix for per-bookmark metadata keys.
const BOOKMARKS_PREFIX: &str = "/apps/alcove/bookmarks";

/// Substitute for characters outside the id alphabet.
const ID_SUBSTITUTE: char = '_';

/// URLs are truncated to this length before id generation.
const MAX_URL_LENGTH: usize = 150;

/// Manages bookmark shortcut metadata and the thumbnail cache.
pub struct BookmarkShortcuts {
    store: Rc<dyn SettingsStore>,
    thumbnails_dir: PathBuf,
}

impl BookmarkShortcuts {
    /// Create a manager using the default thumbnail cache directory
    /// (`~/.bookmarks/shell-thumbnails`).
    pub fn new(store: Rc<dyn SettingsStore>) -> Self {
        Self {
            store,
            thumbnails_dir: default_thumbnails_dir(),
        }
    }

    /// Create a manager with an explicit thumbnail cache directory.
    pub fn with_thumbnails_dir(store: Rc<dyn SettingsStore>, dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            thumbnails_dir: dir.into(),
        }
    }

    /// Create a new bookmark shortcut.
    ///
    /// `icon` optionally names an image file that is copied into the
    /// thumbnail cache under the generated id. Store failures are logged;
    /// the worst outcome is a bookmark with partial metadata.
    pub fn add(&self, url: &str, label: &str, icon: Option<&Path>) -> String {
        let mut list = match self.store.get_list(BOOKMARK_SHORTCUTS_KEY) {
            Ok(list) => list,
            Err(e) => {
                debug!("Could not read bookmark shortcut list: {}", e);
                Vec::new()
            }
        };

        let id = unique_bookmark_id(url, &list);

        self.store_bookmark_string(&id, "label", label);

        if let Some(icon) = icon {
            if self.copy_thumbnail(icon, &id) {
                let thumbnail = self.thumbnail_path(&id);
                self.store_bookmark_string(&id, "icon", &thumbnail.to_string_lossy());
            }
        }

        self.store_bookmark_string(&id, "url", url);

        list.push(id.clone());
        if let Err(e) = self.store.set_list(BOOKMARK_SHORTCUTS_KEY, &list) {
            warn!("Could not store bookmark shortcut list: {}", e);
        }

        id
    }

    /// Delete a bookmark's metadata and thumbnail.
    ///
    /// The id list itself is not touched here; the live shortcut removes
    /// its own entry through the shortcut set.
    pub fn remove(&self, id: &str) {
        for suffix in ["label", "icon", "url"] {
            if let Err(e) = self.store.unset(&bookmark_key(id, suffix)) {
                warn!("Could not unset {} for bookmark {}: {}", suffix, id, e);
            }
        }

        let thumbnail = self.thumbnail_path(id);
        if let Err(e) = fs::remove_file(&thumbnail) {
            debug!("Could not remove {}: {}", thumbnail.display(), e);
        }
    }

    /// Stored label of a bookmark.
    pub fn label(&self, id: &str) -> Option<String> {
        self.store.get_string(&bookmark_key(id, "label")).ok()?
    }

    /// Stored URL of a bookmark.
    pub fn url(&self, id: &str) -> Option<String> {
        self.store.get_string(&bookmark_key(id, "url")).ok()?
    }

    fn store_bookmark_string(&self, id: &str, suffix: &str, value: &str) {
        if let Err(e) = self.store.set_string(&bookmark_key(id, suffix), value) {
            warn!("Could not store {} for bookmark {}: {}", suffix, id, e);
        }
    }

    fn thumbnail_path(&self, id: &str) -> PathBuf {
        self.thumbnails_dir.join(format!("{id}.png"))
    }

    fn copy_thumbnail(&self, source: &Path, id: &str) -> bool {
        if let Err(e) = fs::create_dir_all(&self.thumbnails_dir) {
            warn!(
                "Could not create thumbnail directory {}: {}",
                self.thumbnails_dir.display(),
                e
            );
            return false;
        }

        let target = self.thumbnail_path(id);
        match fs::copy(source, &target) {
            Ok(_) => true,
            Err(e) => {
                warn!(
                    "Could not copy thumbnail {} to {}: {}",
                    source.display(),
                    target.display(),
                    e
                );
                false
            }
        }
    }
}

fn bookmark_key(id: &str, suffix: &str) -> String {
    format!("{BOOKMARKS_PREFIX}/{id}/{suffix}")
}

fn default_thumbnails_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".bookmarks")
        .join("shell-thumbnails")
}

/// Generate a bookmark id that is unique within `existing`.
///
/// The URL is truncated, canonicalized to `[A-Za-z0-9_-]` and suffixed
/// with the first free counter value, starting at 0. Uniqueness needs no
/// coordination: the candidate is checked against the stored list itself.
fn unique_bookmark_id(url: &str, existing: &[String]) -> String {
    let canon: String = url
        .chars()
        .take(MAX_URL_LENGTH)
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                ID_SUBSTITUTE
            }
        })
        .collect();

    let mut count = 0u32;
    loop {
        let id = format!("{canon}-{count}");
        if !existing.iter().any(|entry| *entry == id) {
            return id;
        }
        count += 1;
    }
}

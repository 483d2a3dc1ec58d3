//! Shortcut synchronization.
//!
//! A shortcut set mirrors an ordered id list held in the settings store:
//! every id in the list gets one live item, items whose id disappears from
//! the list are destroyed. Synchronization runs through the generic
//! [`reconcile`](crate::plugins::reconcile) diff, so applying the same list
//! twice is a no-op.
//!
//! # Example
//!
//! ```ignore
//! use std::rc::Rc;
//! use alcove::shortcuts::{InMemoryStore, SettingsStore, Shortcuts};
//!
//! let store: Rc<dyn SettingsStore> = Rc::new(InMemoryStore::new());
//! let shortcuts = Shortcuts::new(store.clone(), "shortcuts", |id| MyShortcut::new(id));
//!
//! store.set_list("shortcuts", &["clock-0".to_string()]).unwrap();
//! store.dispatch(); // shortcut "clock-0" is created
//! ```

mod bookmarks;
mod store;

pub use bookmarks::{BookmarkShortcuts, BOOKMARK_SHORTCUTS_KEY};
pub use store::{InMemoryStore, SettingsStore, StoreError, StoreResult};

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use tracing::warn;

use crate::plugins::reconcile;

/// A live, id-keyed shortcut instance.
///
/// Implemented by the embedding shell's visual objects; dropping the value
/// destroys the instance.
pub trait ShortcutItem {
    /// Show or hide the item.
    fn set_visible(&mut self, visible: bool);
}

/// Keeps a set of live shortcut items synchronized with a store-held id
/// list.
pub struct Shortcuts<I: ShortcutItem> {
    store: Rc<dyn SettingsStore>,
    key: String,
    factory: Box<dyn Fn(&str) -> I>,
    applets: HashMap<String, I>,
    current_list: Vec<String>,
    throttled: bool,
}

impl<I: ShortcutItem + 'static> Shortcuts<I> {
    /// Create a shortcut set bound to a store key.
    ///
    /// Subscribes to the key and performs an initial synchronization, so
    /// items for ids already in the list exist when this returns.
    pub fn new(
        store: Rc<dyn SettingsStore>,
        key: impl Into<String>,
        factory: impl Fn(&str) -> I + 'static,
    ) -> Rc<RefCell<Self>> {
        let key = key.into();
        let shortcuts = Rc::new(RefCell::new(Self {
            store: store.clone(),
            key: key.clone(),
            factory: Box::new(factory),
            applets: HashMap::new(),
            current_list: Vec::new(),
            throttled: false,
        }));

        let weak = Rc::downgrade(&shortcuts);
        store.notify_on_change(
            &key,
            Box::new(move || {
                if let Some(shortcuts) = weak.upgrade() {
                    shortcuts.borrow_mut().sync();
                }
            }),
        );

        shortcuts.borrow_mut().sync();
        shortcuts
    }

    /// Synchronize the active set against the stored id list.
    ///
    /// A store read failure leaves the active set unchanged.
    pub fn sync(&mut self) {
        let desired = match self.store.get_list(&self.key) {
            Ok(list) => list,
            Err(e) => {
                warn!("Could not read shortcut list '{}': {}", self.key, e);
                return;
            }
        };

        self.current_list = desired.clone();
        let active: Vec<String> = self.applets.keys().cloned().collect();
        let plan = reconcile(desired, active);

        for id in plan.to_remove {
            // Dropping the item destroys it.
            self.applets.remove(&id);
        }

        for id in plan.to_add {
            let mut item = (self.factory)(&id);
            item.set_visible(!self.throttled);
            self.applets.insert(id, item);
        }
    }

    /// While throttled, newly created items stay hidden. Clearing the flag
    /// shows every active item.
    pub fn set_throttled(&mut self, throttled: bool) {
        self.throttled = throttled;
        if !throttled {
            for item in self.applets.values_mut() {
                item.set_visible(true);
            }
        }
    }

    pub fn throttled(&self) -> bool {
        self.throttled
    }

    /// Remove one shortcut at the item's own request (e.g. its close
    /// button): the id is dropped from the stored list and the item is
    /// hidden. Destruction happens when the resulting change notification
    /// synchronizes the set.
    pub fn remove_shortcut(&mut self, id: &str) {
        if let Some(position) = self.current_list.iter().position(|entry| entry == id) {
            self.current_list.remove(position);
        }

        if let Err(e) = self.store.set_list(&self.key, &self.current_list) {
            warn!("Could not store shortcut list '{}': {}", self.key, e);
        }

        if let Some(item) = self.applets.get_mut(id) {
            item.set_visible(false);
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.applets.contains_key(id)
    }

    /// Active shortcut ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.applets.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.applets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.applets.is_empty()
    }

    /// Run a closure against a live item.
    pub fn with_item<R>(&mut self, id: &str, f: impl FnOnce(&mut I) -> R) -> Option<R> {
        self.applets.get_mut(id).map(f)
    }
}

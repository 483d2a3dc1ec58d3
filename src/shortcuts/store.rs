//! Settings store abstraction.
//!
//! Shortcut id lists and per-bookmark metadata live in an external
//! key-value store with change notification. The store is injected behind
//! this trait so reconciliation can be exercised without a real settings
//! daemon; [`InMemoryStore`] is the reference implementation used by tests
//! and standalone embeddings.
//!
//! Change notifications are queued and delivered from [`SettingsStore::
//! dispatch`], mirroring how a real store's notifications arrive through
//! the host event loop: an observer never runs inside the write that
//! triggered it.

use std::cell::RefCell;
use std::collections::HashMap;

use thiserror::Error;
use tracing::debug;

/// Errors reported by a settings store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The value under a key does not have the requested type.
    /// Heterogeneous values are rejected, not coerced.
    #[error("Value under '{0}' is not a list of strings")]
    WrongType(String),

    /// The store backend failed.
    #[error("Settings store failure: {0}")]
    Backend(String),
}

/// Result type alias for settings store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// An external key-value settings store with change notification.
///
/// Methods take `&self`: a store is a client handle, implementations use
/// interior mutability. Absent keys read as empty (`get_list`) or `None`
/// (`get_string`).
pub trait SettingsStore {
    /// Read an ordered list of strings.
    fn get_list(&self, key: &str) -> StoreResult<Vec<String>>;

    /// Replace an ordered list of strings.
    fn set_list(&self, key: &str, values: &[String]) -> StoreResult<()>;

    /// Read a single string value.
    fn get_string(&self, key: &str) -> StoreResult<Option<String>>;

    /// Write a single string value.
    fn set_string(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Remove a key. Removing an absent key is not an error.
    fn unset(&self, key: &str) -> StoreResult<()>;

    /// Subscribe to changes of one key.
    fn notify_on_change(&self, key: &str, observer: Box<dyn Fn()>);

    /// Deliver queued change notifications.
    ///
    /// Called by the host event loop; observers registered for a changed
    /// key run synchronously, in registration order.
    fn dispatch(&self);
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Value {
    Str(String),
    List(Vec<String>),
}

/// In-memory [`SettingsStore`] implementation.
#[derive(Default)]
pub struct InMemoryStore {
    values: RefCell<HashMap<String, Value>>,
    observers: RefCell<Vec<(String, Box<dyn Fn()>)>>,
    queued: RefCell<Vec<String>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn queue_change(&self, key: &str) {
        let mut queued = self.queued.borrow_mut();
        if !queued.iter().any(|queued_key| queued_key == key) {
            queued.push(key.to_string());
        }
    }
}

impl SettingsStore for InMemoryStore {
    fn get_list(&self, key: &str) -> StoreResult<Vec<String>> {
        match self.values.borrow().get(key) {
            None => Ok(Vec::new()),
            Some(Value::List(values)) => Ok(values.clone()),
            Some(Value::Str(_)) => Err(StoreError::WrongType(key.to_string())),
        }
    }

    fn set_list(&self, key: &str, values: &[String]) -> StoreResult<()> {
        self.values
            .borrow_mut()
            .insert(key.to_string(), Value::List(values.to_vec()));
        self.queue_change(key);
        Ok(())
    }

    fn get_string(&self, key: &str) -> StoreResult<Option<String>> {
        match self.values.borrow().get(key) {
            None => Ok(None),
            Some(Value::Str(value)) => Ok(Some(value.clone())),
            Some(Value::List(_)) => Err(StoreError::WrongType(key.to_string())),
        }
    }

    fn set_string(&self, key: &str, value: &str) -> StoreResult<()> {
        self.values
            .borrow_mut()
            .insert(key.to_string(), Value::Str(value.to_string()));
        self.queue_change(key);
        Ok(())
    }

    fn unset(&self, key: &str) -> StoreResult<()> {
        if self.values.borrow_mut().remove(key).is_some() {
            self.queue_change(key);
        }
        Ok(())
    }

    fn notify_on_change(&self, key: &str, observer: Box<dyn Fn()>) {
        self.observers
            .borrow_mut()
            .push((key.to_string(), observer));
    }

    fn dispatch(&self) {
        // Observers may write the store again; keep draining until the
        // queue settles. Writes converge because observers only react to
        // actual state changes.
        loop {
            let changed = std::mem::take(&mut *self.queued.borrow_mut());
            if changed.is_empty() {
                return;
            }
            debug!("Dispatching {} store change(s)", changed.len());

            for key in changed {
                let observers = self.observers.borrow();
                for (observed_key, observer) in observers.iter() {
                    if *observed_key == key {
                        observer();
                    }
                }
            }
        }
    }
}

//! Plugin lifecycle and reconciliation engine.
//!
//! This module tracks plugin descriptors on disk and turns them into live
//! items:
//!
//! - [`DescriptorStore`] scans the configured plugin directories and keeps
//!   the availability mapping in sync with filesystem changes.
//! - [`PluginConfiguration`] loads the top-level configuration, re-triggers
//!   directory setup on change and owns the per-item settings blob.
//! - [`PluginLoader`]/[`PluginModule`] load the native library a descriptor
//!   points to, with exactly-once load/unload semantics and a single
//!   registered item type per module.
//! - [`reconcile`] is the generic desired-vs-active diff used for both
//!   plugin bookkeeping and shortcut-list synchronization.
//!
//! All state lives on one logical thread; filesystem changes are drained
//! cooperatively through the `poll()` methods, never delivered from a
//! background thread.

mod config;
mod descriptors;
mod error;
mod manager;
mod module;
mod reconcile;
mod watcher;

pub use config::{LoadState, PluginConfiguration, PluginEvent, CONFIG_SECTION};
pub use descriptors::{
    DescriptorChange, DescriptorEvent, DescriptorState, DescriptorStore, DESCRIPTOR_SUFFIX,
};
pub use error::{PluginError, PluginResult};
pub use manager::PluginManager;
pub use module::{
    module_path_from_descriptor, PluginFactory, PluginItem, PluginLoadFn, PluginLoader,
    PluginModule, PluginRegistrar, PluginUnloadFn, DESCRIPTOR_MODULE_KEY, PLUGIN_LOAD_SYMBOL,
    PLUGIN_UNLOAD_SYMBOL,
};
pub use reconcile::{reconcile, reconcile_by, Reconciliation};
pub use watcher::{DirectoryWatcher, FsChange, FsChangeKind, DEFAULT_DEBOUNCE};

//! Alcove - desktop-shell applet and shortcut framework.
//!
//! Alcove keeps a desktop shell's extension surface in sync with the
//! outside world: plugin descriptors appearing and disappearing on disk,
//! a reloadable plugin-manager configuration, native modules providing
//! the actual applet implementations, and shortcut id lists edited in an
//! external settings store.
//!
//! # Architecture
//!
//! The library is organized into two main modules:
//!
//! - [`plugins`] - Descriptor discovery, configuration loading, native
//!   module loading and the generic reconciliation diff
//! - [`shortcuts`] - Store-synchronized shortcut sets and bookmark
//!   shortcut bookkeeping
//!
//! Everything runs on one logical thread: filesystem changes and store
//! notifications are queued and drained cooperatively via `poll()` and
//! `dispatch()`, so no callback ever runs concurrently with caller code.
//!
//! # Example
//!
//! ```ignore
//! use alcove::PluginManager;
//!
//! let mut manager = PluginManager::new("/etc/alcove/home.conf")?;
//! manager.run();
//!
//! // Host event loop:
//! loop {
//!     for event in manager.poll() {
//!         println!("plugin change: {:?}", event);
//!     }
//!     // ... render, sleep, etc.
//! }
//! ```

pub mod plugins;
pub mod shortcuts;

// Re-export commonly used types for convenience
pub use plugins::{
    reconcile, DescriptorChange, DescriptorEvent, DescriptorStore, PluginConfiguration,
    PluginError, PluginEvent, PluginFactory, PluginItem, PluginLoader, PluginManager,
    PluginRegistrar, PluginResult, Reconciliation,
};
pub use shortcuts::{
    BookmarkShortcuts, InMemoryStore, SettingsStore, ShortcutItem, Shortcuts, StoreError,
    StoreResult,
};

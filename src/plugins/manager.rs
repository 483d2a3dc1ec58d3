//! Plugin manager - wires configuration, discovery and module loading.
//!
//! The manager keeps the set of live plugin items reconciled against the
//! available descriptors: with eager loading every available descriptor
//! gets an item, otherwise only explicitly instantiated plugins are kept
//! alive for as long as their descriptor exists. Both the event-driven
//! case (a descriptor file appears or disappears) and the bulk case (a
//! configuration reload swaps the watched directories) go through the
//! same [`reconcile`] diff, so the item set can never drift from the
//! availability mapping.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, warn};

use super::config::{PluginConfiguration, PluginEvent};
use super::error::PluginResult;
use super::module::{PluginItem, PluginLoader};
use super::reconcile::reconcile;

pub struct PluginManager {
    configuration: PluginConfiguration,
    loader: PluginLoader,
    items: HashMap<PathBuf, Box<dyn PluginItem>>,
}

impl PluginManager {
    pub fn new(conf_path: impl Into<PathBuf>) -> PluginResult<Self> {
        Ok(Self {
            configuration: PluginConfiguration::new(conf_path)?,
            loader: PluginLoader::new(),
            items: HashMap::new(),
        })
    }

    pub fn with_debounce(
        conf_path: impl Into<PathBuf>,
        debounce: Duration,
    ) -> PluginResult<Self> {
        Ok(Self {
            configuration: PluginConfiguration::with_debounce(conf_path, debounce)?,
            loader: PluginLoader::new(),
            items: HashMap::new(),
        })
    }

    pub fn configuration(&self) -> &PluginConfiguration {
        &self.configuration
    }

    pub fn configuration_mut(&mut self) -> &mut PluginConfiguration {
        &mut self.configuration
    }

    /// Perform the initial configuration load and bring the item set in
    /// line with it.
    pub fn run(&mut self) {
        self.configuration.run();
        self.sync();
    }

    /// Drain pending changes and apply them to the set of live items.
    pub fn poll(&mut self) -> Vec<PluginEvent> {
        let events = self.configuration.poll();

        // A reload may have replaced the whole availability mapping, so
        // any of these events can change what should be alive.
        let needs_sync = events.iter().any(|event| {
            matches!(
                event,
                PluginEvent::ConfigurationLoaded
                    | PluginEvent::ModuleAdded(_)
                    | PluginEvent::ModuleRemoved(_)
            )
        });
        if needs_sync {
            self.sync();
        }

        events
    }

    /// Instantiate the plugin behind a descriptor.
    ///
    /// The descriptor's file stem is used as the instance id.
    pub fn instantiate(&mut self, descriptor: &Path) -> PluginResult<()> {
        let plugin_id = descriptor
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();

        let item = self.loader.instantiate(descriptor, &plugin_id)?;
        self.configuration.mark_loaded(descriptor);
        self.items.insert(descriptor.to_path_buf(), item);
        Ok(())
    }

    /// Reconcile the live item set against the available descriptors.
    fn sync(&mut self) {
        let available = self.configuration.available_plugins();
        let desired: Vec<PathBuf> = if self.configuration.load_all_plugins() {
            available
        } else {
            // Keep only items whose descriptor still exists.
            let available: BTreeSet<PathBuf> = available.into_iter().collect();
            self.items
                .keys()
                .filter(|path| available.contains(*path))
                .cloned()
                .collect()
        };
        let current: Vec<PathBuf> = self.items.keys().cloned().collect();

        let plan = reconcile(desired, current);
        for path in plan.to_remove {
            self.unload_plugin(&path);
        }
        for path in plan.to_add {
            self.load_plugin(&path);
        }
    }

    fn load_plugin(&mut self, descriptor: &Path) {
        // One broken plugin must not block the others.
        if let Err(e) = self.instantiate(descriptor) {
            warn!("Could not load plugin {}: {}", descriptor.display(), e);
        }
    }

    fn unload_plugin(&mut self, descriptor: &Path) {
        if self.items.remove(descriptor).is_some() {
            debug!("Destroyed item for removed plugin {}", descriptor.display());
        }
        if self.loader.is_loaded(descriptor) {
            self.loader.release(descriptor);
        }
    }

    pub fn is_loaded(&self, descriptor: &Path) -> bool {
        self.items.contains_key(descriptor)
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_run_without_eager_loading_keeps_items_empty() {
        let dir = TempDir::new().unwrap();
        let plugins = dir.path().join("plugins");
        fs::create_dir(&plugins).unwrap();
        fs::write(plugins.join("clock.desktop"), "[Desktop Entry]\n").unwrap();

        let conf = dir.path().join("alcove.conf");
        fs::write(
            &conf,
            format!(
                "[plugin-manager]\nplugin-dirs = [\"{}\"]\n",
                plugins.display()
            ),
        )
        .unwrap();

        let mut manager = PluginManager::with_debounce(&conf, Duration::ZERO).unwrap();
        manager.run();

        assert_eq!(manager.configuration().available_plugins().len(), 1);
        assert_eq!(manager.item_count(), 0);
    }

    #[test]
    fn test_eager_loading_survives_broken_plugins() {
        let dir = TempDir::new().unwrap();
        let plugins = dir.path().join("plugins");
        fs::create_dir(&plugins).unwrap();
        fs::write(
            plugins.join("broken.desktop"),
            "[Desktop Entry]\nType=default\nName=Broken\nX-Path=libdoesnotexist.so\n",
        )
        .unwrap();

        let conf = dir.path().join("alcove.conf");
        fs::write(
            &conf,
            format!(
                "[plugin-manager]\nplugin-dirs = [\"{}\"]\nload-all-plugins = true\n",
                plugins.display()
            ),
        )
        .unwrap();

        let mut manager = PluginManager::with_debounce(&conf, Duration::ZERO).unwrap();
        manager.run();

        // The broken module is skipped, nothing crashes, no handle leaks.
        assert_eq!(manager.item_count(), 0);
        assert!(!manager.is_loaded(&plugins.join("broken.desktop")));
    }

    #[test]
    fn test_reload_reconciles_away_vanished_descriptors() {
        let dir = TempDir::new().unwrap();
        let first = dir.path().join("first");
        let second = dir.path().join("second");
        fs::create_dir(&first).unwrap();
        fs::create_dir(&second).unwrap();
        fs::write(first.join("a.desktop"), "[Desktop Entry]\n").unwrap();

        let conf = dir.path().join("alcove.conf");
        fs::write(
            &conf,
            format!("[plugin-manager]\nplugin-dirs = [\"{}\"]\n", first.display()),
        )
        .unwrap();

        let mut manager = PluginManager::with_debounce(&conf, Duration::ZERO).unwrap();
        manager.run();
        assert_eq!(manager.configuration().available_plugins().len(), 1);

        // Switch to a directory without descriptors; the availability
        // mapping and the (empty) item set stay consistent.
        fs::write(
            &conf,
            format!(
                "[plugin-manager]\nplugin-dirs = [\"{}\"]\n",
                second.display()
            ),
        )
        .unwrap();
        assert!(manager.configuration_mut().reload());
        manager.sync();

        assert!(manager.configuration().available_plugins().is_empty());
        assert_eq!(manager.item_count(), 0);
    }
}

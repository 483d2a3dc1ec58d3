//! Top-level plugin configuration.
//!
//! The configuration file is TOML with a required `[plugin-manager]`
//! section:
//!
//! ```toml
//! [plugin-manager]
//! plugin-dirs = ["/usr/share/alcove/applets"]
//! debug-plugins = false
//! load-all-plugins = false
//! plugin-configuration = "items.conf"
//! ```
//!
//! `plugin-configuration` optionally names a secondary per-item settings
//! file (resolved relative to the configuration file's directory) whose
//! contents are kept in memory as a TOML table and written back on demand.
//!
//! Reloads fail closed: a file that cannot be parsed, or that lacks the
//! `[plugin-manager]` section, is reported and the previous state keeps
//! serving. Directories are never left half-configured.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use super::descriptors::{DescriptorChange, DescriptorStore};
use super::error::PluginResult;
use super::watcher::{DirectoryWatcher, FsChangeKind, DEFAULT_DEBOUNCE};

/// Name of the required configuration section.
pub const CONFIG_SECTION: &str = "plugin-manager";

#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(rename = "plugin-manager")]
    plugin_manager: Option<ManagerSection>,
}

#[derive(Debug, Deserialize)]
struct ManagerSection {
    #[serde(rename = "plugin-dirs")]
    plugin_dirs: Vec<String>,

    #[serde(rename = "debug-plugins", default)]
    debug_plugins: bool,

    #[serde(rename = "load-all-plugins", default)]
    load_all_plugins: bool,

    #[serde(rename = "plugin-configuration", default)]
    plugin_configuration: Option<String>,
}

/// Load state of the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Uninitialized,
    Loading,
    Ready,
}

/// Notifications emitted by [`PluginConfiguration`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginEvent {
    /// The top-level configuration was (re)loaded successfully.
    ConfigurationLoaded,
    /// The per-item settings blob was (re)loaded.
    ItemsConfigurationLoaded,
    /// A new plugin descriptor appeared.
    ModuleAdded(PathBuf),
    /// A known plugin descriptor's file changed.
    ModuleUpdated(PathBuf),
    /// A known plugin descriptor disappeared.
    ModuleRemoved(PathBuf),
}

/// Loads the plugin-manager configuration and owns everything derived from
/// it: the watched plugin directories, the descriptor availability store
/// and the per-item settings blob.
pub struct PluginConfiguration {
    conf_path: PathBuf,
    state: LoadState,
    startup: bool,

    descriptors: DescriptorStore,
    config_watcher: DirectoryWatcher,

    plugin_dirs: Vec<PathBuf>,
    debug_plugins: bool,
    load_all_plugins: bool,

    items_path: Option<PathBuf>,
    items: toml::Table,

    observers: Vec<Box<dyn Fn(&PluginEvent)>>,
}

impl PluginConfiguration {
    /// Create a configuration bound to the given file.
    ///
    /// Nothing is read yet; call [`run`](Self::run) after attaching
    /// observers.
    pub fn new(conf_path: impl Into<PathBuf>) -> PluginResult<Self> {
        Self::with_debounce(conf_path, DEFAULT_DEBOUNCE)
    }

    /// Like [`new`](Self::new) with a custom filesystem debounce interval.
    pub fn with_debounce(
        conf_path: impl Into<PathBuf>,
        debounce: Duration,
    ) -> PluginResult<Self> {
        let mut configuration = Self {
            conf_path: conf_path.into(),
            state: LoadState::Uninitialized,
            startup: true,
            descriptors: DescriptorStore::with_debounce(debounce)?,
            config_watcher: DirectoryWatcher::with_debounce(debounce)?,
            plugin_dirs: Vec::new(),
            debug_plugins: false,
            load_all_plugins: false,
            items_path: None,
            items: toml::Table::new(),
            observers: Vec::new(),
        };
        configuration.rewatch_config_files();
        Ok(configuration)
    }

    /// Attach an observer. Observers are invoked synchronously, in
    /// registration order.
    pub fn subscribe(&mut self, observer: impl Fn(&PluginEvent) + 'static) {
        self.observers.push(Box::new(observer));
    }

    fn emit(&self, event: &PluginEvent) {
        for observer in &self.observers {
            observer(event);
        }
    }

    /// Perform the initial configuration load.
    ///
    /// Must be called exactly once, after all observers are attached;
    /// observers attached later miss the initial event burst. During the
    /// events of the first successful load [`in_startup`](Self::in_startup)
    /// still reports `true`, so consumers can tell the initial inventory
    /// apart from live changes.
    pub fn run(&mut self) {
        if self.state != LoadState::Uninitialized {
            warn!("PluginConfiguration::run() called more than once");
            return;
        }

        self.state = LoadState::Loading;
        self.reload();
        self.state = LoadState::Ready;
    }

    /// Re-read the configuration file.
    ///
    /// Returns `true` when the new configuration was applied. On any
    /// failure the previous state is left untouched and `false` is
    /// returned.
    pub fn reload(&mut self) -> bool {
        let content = match fs::read_to_string(&self.conf_path) {
            Ok(content) => content,
            Err(e) => {
                warn!(
                    "Could not read configuration file {}: {}",
                    self.conf_path.display(),
                    e
                );
                return false;
            }
        };

        let parsed: ConfigFile = match toml::from_str(&content) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(
                    "Could not parse configuration file {}: {}",
                    self.conf_path.display(),
                    e
                );
                return false;
            }
        };

        let Some(section) = parsed.plugin_manager else {
            warn!(
                "Configuration file {} has no [{}] section",
                self.conf_path.display(),
                CONFIG_SECTION
            );
            return false;
        };

        // Validation done; from here on the old state is torn down.
        let dirs: Vec<PathBuf> = section
            .plugin_dirs
            .iter()
            .map(|dir| PathBuf::from(dir.trim()))
            .collect();

        self.descriptors.configure(&dirs);
        self.plugin_dirs = dirs;
        self.debug_plugins = section.debug_plugins;
        self.load_all_plugins = section.load_all_plugins;

        let conf_dir = self.conf_dir();
        self.items_path = section.plugin_configuration.as_deref().map(|name| {
            let name = name.trim();
            let path = Path::new(name);
            if path.is_absolute() {
                path.to_path_buf()
            } else {
                conf_dir.join(name)
            }
        });

        self.rewatch_config_files();

        self.emit(&PluginEvent::ConfigurationLoaded);
        self.reload_items();

        self.startup = false;
        true
    }

    /// Re-read the per-item settings file.
    ///
    /// A missing or unparsable file degrades to an empty settings table;
    /// callers must tolerate an empty blob at all times.
    pub fn reload_items(&mut self) {
        self.items = toml::Table::new();

        if let Some(path) = &self.items_path {
            match fs::read_to_string(path) {
                Ok(content) => match toml::from_str(&content) {
                    Ok(table) => self.items = table,
                    Err(e) => {
                        warn!(
                            "Could not parse item configuration {}: {}",
                            path.display(),
                            e
                        );
                    }
                },
                Err(e) => {
                    debug!("Could not read item configuration {}: {}", path.display(), e);
                }
            }
        }

        self.emit(&PluginEvent::ItemsConfigurationLoaded);
    }

    /// Persist the in-memory item settings back to disk.
    ///
    /// Returns `false` when no item configuration file was configured or
    /// the write failed.
    pub fn store_items_settings(&self) -> bool {
        let Some(path) = &self.items_path else {
            return false;
        };

        if let Some(parent) = path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                warn!(
                    "Could not create item configuration directory {}: {}",
                    parent.display(),
                    e
                );
                return false;
            }
        }

        let content = match toml::to_string_pretty(&self.items) {
            Ok(content) => content,
            Err(e) => {
                warn!("Could not serialize item configuration: {}", e);
                return false;
            }
        };

        match fs::write(path, content) {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    "Could not write item configuration {}: {}",
                    path.display(),
                    e
                );
                false
            }
        }
    }

    /// Drain pending filesystem changes.
    ///
    /// A change to the configuration file triggers a full [`reload`]
    /// (Self::reload); a change to the item settings file triggers
    /// [`reload_items`](Self::reload_items). Descriptor changes in the
    /// watched plugin directories are classified and announced to
    /// observers. The returned events mirror what observers saw during
    /// this call, in delivery order.
    pub fn poll(&mut self) -> Vec<PluginEvent> {
        let mut reload_config = false;
        let mut reload_items = false;

        for change in self.config_watcher.poll() {
            if change.kind == FsChangeKind::Removed {
                continue;
            }
            if change.path == self.conf_path {
                reload_config = true;
            } else if Some(&change.path) == self.items_path.as_ref() {
                reload_items = true;
            }
        }

        let mut events = Vec::new();

        // reload()/reload_items() announce to observers themselves; only
        // the returned list is built up here.
        if reload_config {
            if self.reload() {
                events.push(PluginEvent::ConfigurationLoaded);
                events.push(PluginEvent::ItemsConfigurationLoaded);
            }
        } else if reload_items {
            self.reload_items();
            events.push(PluginEvent::ItemsConfigurationLoaded);
        }

        for event in self.descriptors.poll() {
            let notification = match event.change {
                DescriptorChange::Added => PluginEvent::ModuleAdded(event.path),
                DescriptorChange::Updated => PluginEvent::ModuleUpdated(event.path),
                DescriptorChange::Removed => PluginEvent::ModuleRemoved(event.path),
                DescriptorChange::Ignored => continue,
            };
            self.emit(&notification);
            events.push(notification);
        }

        events
    }

    /// True while the very first successful configuration load has not yet
    /// completed.
    pub fn in_startup(&self) -> bool {
        self.startup
    }

    /// Current load state.
    pub fn state(&self) -> LoadState {
        self.state
    }

    /// Snapshot of the available descriptor paths, sorted.
    pub fn available_plugins(&self) -> Vec<PathBuf> {
        self.descriptors.list_available()
    }

    /// All known descriptor paths as strings.
    pub fn all_plugin_paths(&self) -> Vec<String> {
        self.descriptors
            .list_available()
            .iter()
            .map(|path| path.to_string_lossy().into_owned())
            .collect()
    }

    /// Mark a descriptor as loaded. Returns false for unknown paths.
    pub fn mark_loaded(&mut self, path: &Path) -> bool {
        self.descriptors.mark_loaded(path)
    }

    /// The configured plugin directories.
    pub fn plugin_dirs(&self) -> &[PathBuf] {
        &self.plugin_dirs
    }

    pub fn debug_plugins(&self) -> bool {
        self.debug_plugins
    }

    pub fn load_all_plugins(&self) -> bool {
        self.load_all_plugins
    }

    /// The per-item settings table.
    pub fn items_settings(&self) -> &toml::Table {
        &self.items
    }

    /// Mutable access to the per-item settings table; persist changes with
    /// [`store_items_settings`](Self::store_items_settings).
    pub fn items_settings_mut(&mut self) -> &mut toml::Table {
        &mut self.items
    }

    fn conf_dir(&self) -> PathBuf {
        match self.conf_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    fn rewatch_config_files(&mut self) {
        self.config_watcher.unwatch_all();

        let conf_dir = self.conf_dir();
        if let Err(e) = self.config_watcher.watch(&conf_dir) {
            debug!(
                "Could not watch configuration directory {}: {}",
                conf_dir.display(),
                e
            );
        }

        if let Some(items_dir) = self
            .items_path
            .as_ref()
            .and_then(|path| path.parent())
            .map(Path::to_path_buf)
        {
            if items_dir != conf_dir {
                if let Err(e) = self.config_watcher.watch(&items_dir) {
                    debug!(
                        "Could not watch item configuration directory {}: {}",
                        items_dir.display(),
                        e
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("alcove.conf");
        fs::write(&path, body).unwrap();
        path
    }

    fn configuration(path: &Path) -> PluginConfiguration {
        PluginConfiguration::with_debounce(path, Duration::ZERO).unwrap()
    }

    #[test]
    fn test_run_loads_directories_and_clears_startup() {
        let dir = TempDir::new().unwrap();
        let plugins = dir.path().join("plugins");
        fs::create_dir(&plugins).unwrap();
        fs::write(plugins.join("clock.desktop"), "[Desktop Entry]\n").unwrap();

        let conf = write_config(
            &dir,
            &format!(
                "[plugin-manager]\nplugin-dirs = [\"{}\"]\n",
                plugins.display()
            ),
        );

        let mut configuration = configuration(&conf);
        assert!(configuration.in_startup());

        configuration.run();

        assert!(!configuration.in_startup());
        assert_eq!(configuration.state(), LoadState::Ready);
        assert_eq!(
            configuration.available_plugins(),
            vec![plugins.join("clock.desktop")]
        );
    }

    #[test]
    fn test_startup_is_visible_during_initial_events() {
        let dir = TempDir::new().unwrap();
        let conf = write_config(&dir, "[plugin-manager]\nplugin-dirs = []\n");

        let mut configuration = configuration(&conf);

        let seen = Rc::new(RefCell::new(Vec::new()));
        // Record events by name; startup visibility is checked separately
        // below because observers cannot re-borrow the configuration.
        let sink = seen.clone();
        configuration.subscribe(move |event| sink.borrow_mut().push(event.clone()));

        configuration.run();

        assert_eq!(
            *seen.borrow(),
            vec![
                PluginEvent::ConfigurationLoaded,
                PluginEvent::ItemsConfigurationLoaded
            ]
        );
        assert!(!configuration.in_startup());
    }

    #[test]
    fn test_missing_section_fails_closed() {
        let dir = TempDir::new().unwrap();
        let plugins = dir.path().join("plugins");
        fs::create_dir(&plugins).unwrap();
        fs::write(plugins.join("clock.desktop"), "[Desktop Entry]\n").unwrap();

        let conf = write_config(
            &dir,
            &format!(
                "[plugin-manager]\nplugin-dirs = [\"{}\"]\n",
                plugins.display()
            ),
        );

        let mut configuration = configuration(&conf);
        configuration.run();
        assert_eq!(configuration.available_plugins().len(), 1);

        // Rewrite the file without the plugin-manager section: the reload
        // is aborted and the previous directories keep serving.
        fs::write(&conf, "[other]\nkey = 1\n").unwrap();
        assert!(!configuration.reload());
        assert_eq!(configuration.available_plugins().len(), 1);
        assert_eq!(configuration.plugin_dirs().len(), 1);
    }

    #[test]
    fn test_malformed_file_fails_closed() {
        let dir = TempDir::new().unwrap();
        let conf = write_config(&dir, "[plugin-manager]\nplugin-dirs = []\n");

        let mut configuration = configuration(&conf);
        configuration.run();
        assert!(!configuration.in_startup());

        fs::write(&conf, "not toml at all [[[").unwrap();
        assert!(!configuration.reload());
    }

    #[test]
    fn test_startup_survives_failed_first_load() {
        let dir = TempDir::new().unwrap();
        let conf = dir.path().join("missing.conf");

        let mut configuration = configuration(&conf);
        configuration.run();
        assert!(configuration.in_startup());

        // The first load to actually succeed clears the flag.
        fs::write(&conf, "[plugin-manager]\nplugin-dirs = []\n").unwrap();
        assert!(configuration.reload());
        assert!(!configuration.in_startup());
    }

    #[test]
    fn test_run_twice_is_rejected() {
        let dir = TempDir::new().unwrap();
        let conf = write_config(&dir, "[plugin-manager]\nplugin-dirs = []\n");

        let mut configuration = configuration(&conf);
        configuration.run();
        configuration.run();
        assert_eq!(configuration.state(), LoadState::Ready);
    }

    #[test]
    fn test_missing_items_file_yields_empty_settings() {
        let dir = TempDir::new().unwrap();
        let conf = write_config(
            &dir,
            "[plugin-manager]\nplugin-dirs = []\nplugin-configuration = \"items.conf\"\n",
        );

        let mut configuration = configuration(&conf);
        configuration.run();

        assert!(configuration.items_settings().is_empty());
    }

    #[test]
    fn test_items_roundtrip() {
        let dir = TempDir::new().unwrap();
        let conf = write_config(
            &dir,
            "[plugin-manager]\nplugin-dirs = []\nplugin-configuration = \"items.conf\"\n",
        );

        let mut configuration = configuration(&conf);
        configuration.run();

        let mut item = toml::Table::new();
        item.insert("desktop".into(), toml::Value::Integer(2));
        configuration
            .items_settings_mut()
            .insert("clock-1".into(), toml::Value::Table(item));

        assert!(configuration.store_items_settings());

        configuration.reload_items();
        let stored = configuration.items_settings();
        assert_eq!(
            stored["clock-1"]["desktop"],
            toml::Value::Integer(2)
        );
    }

    #[test]
    fn test_store_items_without_configured_file_fails() {
        let dir = TempDir::new().unwrap();
        let conf = write_config(&dir, "[plugin-manager]\nplugin-dirs = []\n");

        let mut configuration = configuration(&conf);
        configuration.run();

        assert!(!configuration.store_items_settings());
    }

    #[test]
    fn test_unparsable_items_file_yields_empty_settings() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("items.conf"), "{{{ not toml").unwrap();
        let conf = write_config(
            &dir,
            "[plugin-manager]\nplugin-dirs = []\nplugin-configuration = \"items.conf\"\n",
        );

        let mut configuration = configuration(&conf);
        configuration.run();

        assert!(configuration.items_settings().is_empty());
    }

    #[test]
    fn test_reload_switches_directories() {
        let dir = TempDir::new().unwrap();
        let first = dir.path().join("first");
        let second = dir.path().join("second");
        fs::create_dir(&first).unwrap();
        fs::create_dir(&second).unwrap();
        fs::write(first.join("a.desktop"), "[Desktop Entry]\n").unwrap();
        fs::write(second.join("b.desktop"), "[Desktop Entry]\n").unwrap();

        let conf = write_config(
            &dir,
            &format!("[plugin-manager]\nplugin-dirs = [\"{}\"]\n", first.display()),
        );

        let mut configuration = configuration(&conf);
        configuration.run();
        assert_eq!(configuration.available_plugins(), vec![first.join("a.desktop")]);

        fs::write(
            &conf,
            format!("[plugin-manager]\nplugin-dirs = [\"{}\"]\n", second.display()),
        )
        .unwrap();
        assert!(configuration.reload());
        assert_eq!(
            configuration.available_plugins(),
            vec![second.join("b.desktop")]
        );
    }
}

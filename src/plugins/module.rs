//! Native plugin modules.
//!
//! A plugin module is a dynamic library referenced by a descriptor's
//! `X-Path` key. On load the library's `alcove_plugin_load` entry point is
//! resolved together with `alcove_plugin_unload`; `load` runs exactly once
//! and is expected to register a single item factory through the
//! [`PluginRegistrar`] handed to it. `unload` runs exactly once right
//! before the library handle is released.
//!
//! A module is never reloaded once released; reuse requires opening a
//! fresh module. Tying a library's liveness to a single factory keeps the
//! descriptor-to-object mapping total: "is this library still needed"
//! reduces to "does any live object still reference this factory".

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use freedesktop_desktop_entry::DesktopEntry;
use libloading::{Library, Symbol};
use tracing::{debug, warn};

use super::error::{PluginError, PluginResult};

/// Symbol name of the module's one-time load entry point.
pub const PLUGIN_LOAD_SYMBOL: &[u8] = b"alcove_plugin_load";
/// Symbol name of the module's one-time unload entry point.
pub const PLUGIN_UNLOAD_SYMBOL: &[u8] = b"alcove_plugin_unload";

/// Descriptor key naming the module library.
pub const DESCRIPTOR_MODULE_KEY: &str = "X-Path";

/// Type of the `alcove_plugin_load` entry point.
pub type PluginLoadFn = unsafe extern "C" fn(*mut PluginRegistrar);
/// Type of the `alcove_plugin_unload` entry point.
pub type PluginUnloadFn = unsafe extern "C" fn();

/// An item instantiated from a plugin module.
///
/// The embedding shell downcasts or wraps these into its own visual
/// objects; the framework only tracks identity.
pub trait PluginItem {
    /// Stable instance id for identified items, `None` for plain items.
    fn plugin_id(&self) -> Option<&str> {
        None
    }
}

/// Factory for the single item type a module registers.
///
/// `Identified` types take their instance id at construction; `Plain`
/// types are constructed without arguments.
pub enum PluginFactory {
    Plain(fn() -> Box<dyn PluginItem>),
    Identified(fn(&str) -> Box<dyn PluginItem>),
}

/// Registration handle passed to a module's load entry point.
///
/// A module registers at most one item factory. A second registration
/// attempt is logged and dropped.
pub struct PluginRegistrar {
    factory: Option<PluginFactory>,
}

impl PluginRegistrar {
    fn new() -> Self {
        Self { factory: None }
    }

    /// Register the module's item factory.
    pub fn register(&mut self, factory: PluginFactory) {
        if self.factory.is_some() {
            warn!("Only one plugin type per module is supported");
            return;
        }
        self.factory = Some(factory);
    }
}

/// One loaded dynamic library and its registered factory.
pub struct PluginModule {
    path: PathBuf,
    library: Option<Library>,
    unload_fn: Option<PluginUnloadFn>,
    factory: Option<PluginFactory>,
}

impl PluginModule {
    /// Open a library and run its load entry point.
    ///
    /// Fails if the path is empty, the library cannot be opened, or either
    /// entry symbol is missing. In the missing-symbol case the partially
    /// opened library is closed before returning; no handle leaks.
    pub fn open(path: &Path) -> PluginResult<Self> {
        if path.as_os_str().is_empty() {
            return Err(load_error(path, "module path is empty"));
        }

        let library = unsafe { Library::new(path) }
            .map_err(|e| load_error(path, &e.to_string()))?;

        let load_fn: PluginLoadFn = match unsafe { library.get::<PluginLoadFn>(PLUGIN_LOAD_SYMBOL) }
        {
            Ok(symbol) => *symbol,
            Err(e) => {
                drop(library);
                return Err(load_error(path, &format!("missing load entry point: {e}")));
            }
        };

        let unload_fn: PluginUnloadFn =
            match unsafe { library.get::<PluginUnloadFn>(PLUGIN_UNLOAD_SYMBOL) } {
                Ok(symbol) => *symbol,
                Err(e) => {
                    drop(library);
                    return Err(load_error(
                        path,
                        &format!("missing unload entry point: {e}"),
                    ));
                }
            };

        // Initialize the module; it registers its item type here.
        let mut registrar = PluginRegistrar::new();
        unsafe { load_fn(&mut registrar) };

        if registrar.factory.is_none() {
            debug!("Module {} registered no plugin type", path.display());
        }

        Ok(Self {
            path: path.to_path_buf(),
            library: Some(library),
            unload_fn: Some(unload_fn),
            factory: registrar.factory,
        })
    }

    /// Construct one item from the registered factory.
    ///
    /// `plugin_id` is passed only to factories of identified types.
    ///
    /// # Panics
    ///
    /// Panics when called on a released module; that is a programming
    /// error, not a recoverable condition.
    pub fn instantiate(&self, plugin_id: &str) -> PluginResult<Box<dyn PluginItem>> {
        assert!(
            self.library.is_some(),
            "plugin module {} used after release",
            self.path.display()
        );

        match &self.factory {
            Some(PluginFactory::Plain(construct)) => Ok(construct()),
            Some(PluginFactory::Identified(construct)) => Ok(construct(plugin_id)),
            None => Err(load_error(&self.path, "module registered no plugin type")),
        }
    }

    /// Run the unload entry point and close the library handle.
    ///
    /// # Panics
    ///
    /// Panics when the module was already released.
    pub fn release(&mut self) {
        let Some(library) = self.library.take() else {
            panic!("plugin module {} released twice", self.path.display());
        };

        if let Some(unload) = self.unload_fn.take() {
            unsafe { unload() };
        }
        self.factory = None;
        drop(library);
    }

    /// Library path this module was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True until [`release`](Self::release) has run.
    pub fn is_loaded(&self) -> bool {
        self.library.is_some()
    }
}

impl Drop for PluginModule {
    fn drop(&mut self) {
        // The unload entry point runs exactly once; release() already took
        // it for modules released explicitly.
        if self.library.is_some() {
            if let Some(unload) = self.unload_fn.take() {
                unsafe { unload() };
            }
        }
    }
}

/// Loads modules for descriptors and tracks the open handles.
pub struct PluginLoader {
    modules: HashMap<PathBuf, PluginModule>,
}

impl PluginLoader {
    pub fn new() -> Self {
        Self {
            modules: HashMap::new(),
        }
    }

    /// Instantiate an item for a descriptor.
    ///
    /// Reads the descriptor's `X-Path` key, opens the module on first use
    /// and constructs one item from its registered factory.
    pub fn instantiate(
        &mut self,
        descriptor: &Path,
        plugin_id: &str,
    ) -> PluginResult<Box<dyn PluginItem>> {
        if descriptor.as_os_str().is_empty() {
            return Err(load_error(descriptor, "descriptor path is empty"));
        }

        let freshly_opened = !self.modules.contains_key(descriptor);
        if freshly_opened {
            let module_path = module_path_from_descriptor(descriptor)?;
            let module = PluginModule::open(&module_path)?;
            self.modules.insert(descriptor.to_path_buf(), module);
        }

        match self.modules[descriptor].instantiate(plugin_id) {
            Ok(item) => Ok(item),
            Err(e) => {
                // A module that never produced an object has no reason to
                // stay open.
                if freshly_opened {
                    if let Some(mut module) = self.modules.remove(descriptor) {
                        module.release();
                    }
                }
                Err(e)
            }
        }
    }

    /// Release the module loaded for a descriptor.
    ///
    /// # Panics
    ///
    /// Panics when no module is loaded for the descriptor (double release).
    pub fn release(&mut self, descriptor: &Path) {
        match self.modules.remove(descriptor) {
            Some(mut module) => module.release(),
            None => panic!("no loaded module for {}", descriptor.display()),
        }
    }

    /// True when a module is loaded for the descriptor.
    pub fn is_loaded(&self, descriptor: &Path) -> bool {
        self.modules.contains_key(descriptor)
    }

    /// Number of open library handles.
    pub fn loaded_count(&self) -> usize {
        self.modules.len()
    }
}

impl Default for PluginLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve the module library path from a descriptor file.
///
/// A bare file name is left as-is so the dynamic loader's search path
/// applies; a relative path with directory components is resolved against
/// the descriptor's directory.
pub fn module_path_from_descriptor(descriptor: &Path) -> PluginResult<PathBuf> {
    let content = fs::read_to_string(descriptor).map_err(|e| PluginError::Descriptor {
        path: descriptor.to_path_buf(),
        message: e.to_string(),
    })?;

    let entry = DesktopEntry::from_str(descriptor, &content, Some(&["en"])).map_err(|e| {
        PluginError::Descriptor {
            path: descriptor.to_path_buf(),
            message: e.to_string(),
        }
    })?;

    let value = entry
        .desktop_entry(DESCRIPTOR_MODULE_KEY)
        .ok_or_else(|| PluginError::Descriptor {
            path: descriptor.to_path_buf(),
            message: format!("missing {DESCRIPTOR_MODULE_KEY} key"),
        })?
        .trim()
        .to_string();

    if value.is_empty() {
        return Err(PluginError::Descriptor {
            path: descriptor.to_path_buf(),
            message: format!("empty {DESCRIPTOR_MODULE_KEY} key"),
        });
    }

    let module = Path::new(&value);
    if module.is_absolute() || module.components().count() == 1 {
        Ok(module.to_path_buf())
    } else {
        let base = descriptor.parent().unwrap_or_else(|| Path::new("."));
        Ok(base.join(module))
    }
}

fn load_error(path: &Path, message: &str) -> PluginError {
    PluginError::Load {
        path: path.to_path_buf(),
        message: message.to_string(),
    }
}

/// Export the plugin entry points from a plugin crate.
///
/// ```ignore
/// use alcove::plugins::{PluginFactory, PluginItem};
///
/// struct ClockApplet;
///
/// impl PluginItem for ClockApplet {}
///
/// fn construct() -> Box<dyn PluginItem> {
///     Box::new(ClockApplet)
/// }
///
/// alcove::register_plugin!(PluginFactory::Plain(construct));
/// ```
#[macro_export]
macro_rules! register_plugin {
    ($factory:expr) => {
        #[no_mangle]
        pub unsafe extern "C" fn alcove_plugin_load(
            registrar: *mut $crate::plugins::PluginRegistrar,
        ) {
            (&mut *registrar).register($factory);
        }

        #[no_mangle]
        pub unsafe extern "C" fn alcove_plugin_unload() {}
    };
}

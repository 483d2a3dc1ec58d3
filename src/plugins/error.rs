//! Error types for the plugin framework.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur in the plugin framework.
#[derive(Debug, Error)]
pub enum PluginError {
    /// Top-level configuration is malformed or incomplete. Reloads fail
    /// closed on this error and keep serving the previous state.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A descriptor file could not be read or is missing required keys.
    #[error("Invalid descriptor {path}: {message}")]
    Descriptor { path: PathBuf, message: String },

    /// A native module could not be loaded or instantiated.
    #[error("Failed to load module {path}: {message}")]
    Load { path: PathBuf, message: String },

    /// Filesystem watcher errors.
    #[error("Watcher error: {0}")]
    Watch(#[from] notify::Error),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing errors.
    #[error("Config parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

/// Result type alias for plugin framework operations.
pub type PluginResult<T> = Result<T, PluginError>;

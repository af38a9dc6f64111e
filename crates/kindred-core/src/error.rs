//! Error types for the Kindred core.
//!
//! Administrative mistakes are returned to the caller as [`PluginError`].
//! Runtime plugin misbehaviour (a failing handler or hook) is never returned
//! through the dispatcher or the lifecycle controller; it is logged at the
//! point of invocation and isolated there.

use thiserror::Error;

/// Boxed error returned by command handlers and lifecycle hooks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors detected while building a plugin definition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DefinitionError {
    /// A plugin or command name is empty or contains whitespace after
    /// normalization.
    #[error("invalid name '{0}': must be non-empty and contain no whitespace")]
    InvalidName(String),

    /// The same command name is declared twice inside one plugin unit.
    #[error("plugin '{plugin}' declares command '{command}' more than once")]
    DuplicateCommand {
        /// Normalized plugin name.
        plugin: String,
        /// Normalized command name.
        command: String,
    },

    /// A descriptor produced a unit whose name differs from its own.
    #[error("descriptor '{descriptor}' produced a unit named '{unit}'")]
    NameMismatch {
        /// Name the descriptor was registered under.
        descriptor: String,
        /// Name carried by the produced unit.
        unit: String,
    },

    /// The unit's state factory panicked while the plugin was being loaded.
    #[error("state factory of plugin '{plugin}' panicked: {message}")]
    StatePanicked {
        /// Normalized plugin name.
        plugin: String,
        /// Panic payload text.
        message: String,
    },
}

/// Errors surfaced to the administrative caller of the lifecycle controller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PluginError {
    /// A command name is already owned by another loaded plugin.
    #[error("command '{command}' is already registered by plugin '{owner}'")]
    NameConflict {
        /// The colliding command name.
        command: String,
        /// The plugin that currently owns it.
        owner: String,
    },

    /// A plugin with the same normalized name is already loaded.
    #[error("plugin '{plugin}' is already loaded")]
    AlreadyLoaded {
        /// Normalized plugin name.
        plugin: String,
    },

    /// The operation targets a plugin that is not loaded.
    #[error("plugin '{plugin}' is not loaded")]
    NotLoaded {
        /// Normalized plugin name.
        plugin: String,
    },

    /// The refreshed definition of a plugin could not be resolved. The
    /// plugin has already been unloaded when this is returned.
    #[error("failed to reload plugin '{plugin}': {reason}")]
    ReloadFailed {
        /// Normalized plugin name.
        plugin: String,
        /// Why the definition could not be resolved.
        reason: String,
    },

    /// The plugin definition itself is malformed.
    #[error(transparent)]
    Definition(#[from] DefinitionError),
}

/// Result type for lifecycle operations.
pub type PluginResult<T> = Result<T, PluginError>;

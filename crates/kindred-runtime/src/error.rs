//! Runtime error types.

use kindred_core::PluginError;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors that can occur while building or running the runtime.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Configuration could not be loaded or is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A startup plugin failed to load.
    #[error("Startup plugin failed: {0}")]
    Plugin(#[from] PluginError),

    /// An ingress feature is configured but was not compiled in.
    #[error("Ingress '{0}' is enabled in configuration but not compiled in")]
    IngressUnavailable(&'static str),

    /// The runtime was asked to run twice.
    #[error("Runtime is already running")]
    AlreadyRunning,
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

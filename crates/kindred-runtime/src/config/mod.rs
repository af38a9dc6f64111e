//! Configuration module for the Kindred runtime.
//!
//! This module provides layered configuration loading (defaults, TOML file,
//! environment) and validation for the dispatcher, ingress and logging
//! settings.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile};
pub use schema::{
    DispatchSection, IrcConfig, KindredConfig, LogFormat, LogLevel, LogOutput, LoggingConfig,
    RetryConfig, WebhookConfig,
};
pub use validation::validate_config;

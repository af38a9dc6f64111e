//! Kindred Runtime - orchestration layer for the Kindred chat bot framework.
//!
//! This crate provides:
//! - Layered configuration ([`config`]): defaults, `kindred.toml`, `KINDRED_*`
//!   environment variables
//! - Logging setup ([`logging`])
//! - [`KindredRuntime`]: startup plugin load, ready broadcast, ingress wiring,
//!   the sequential dispatch loop, and teardown on shutdown
//!
//! # Features
//!
//! - `toml-config` (default): read `kindred.toml` files
//! - `irc` (default): connect to IRC when `[irc] enabled = true`
//! - `webhook` (default): serve the webhook when `[webhook] enabled = true`
//!
//! ```ignore
//! use kindred_runtime::KindredRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = KindredRuntime::builder()
//!         .plugin(my_plugin::descriptor())
//!         .build()?;
//!
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;

pub use config::{ConfigError, ConfigLoader, ConfigResult, KindredConfig, Profile};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::LoggingBuilder;
pub use runtime::{KindredRuntime, RuntimeBuilder};

// Re-export tracing for use by plugin crates
pub use tracing;
pub use tracing_subscriber;

/// Logging macros.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}

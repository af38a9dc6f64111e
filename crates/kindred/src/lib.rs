//! # Kindred
//!
//! A plugin-driven chat bot framework.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐  ChatEvent  ┌────────────┐  !command  ┌─────────────────────────┐
//! │   Ingress   │────────────▶│ Dispatcher │───────────▶│ handler of owning plugin │
//! │ IRC/webhook │             └─────┬──────┘            └────────────┬────────────┘
//! └─────────────┘                   │ snapshot                       │ reply
//!                             ┌─────▼──────┐                   ┌─────▼──────┐
//!                             │  Registry  │◀── publish ───────│ Lifecycle  │
//!                             └────────────┘                   │ Controller │
//!                                                              └────────────┘
//! ```
//!
//! - **Plugins** bundle named commands and `on_load` / `on_unload` /
//!   `on_ready` hooks. A command name belongs to at most one loaded plugin.
//! - **LifecycleController** loads, unloads and reloads plugins while the bot
//!   runs. A failed load leaves the registry untouched.
//! - **Dispatcher** routes a message whose first token is `!name` to exactly
//!   one handler. Handler failures are logged and never stop the bot.
//! - **Runtime** reads `kindred.toml`, connects the ingress sources and
//!   drains their events one at a time.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use kindred::prelude::*;
//!
//! fn ping() -> PluginDescriptor {
//!     PluginDescriptor::new("ping", || {
//!         PluginUnit::builder("ping")
//!             .command("ping", |ctx: CommandContext| async move { ctx.reply("pong").await })
//!             .build()
//!     })
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = KindredRuntime::builder().plugin(ping()).build()?;
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config` (default): read `kindred.toml`
//! - `irc` (default): IRC ingress and outbound sink
//! - `webhook` (default): webhook ingress

pub use kindred_core as core;
pub use kindred_runtime as runtime;
pub use kindred_transport as transport;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use kindred::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use kindred_runtime::{KindredConfig, KindredRuntime};

    // Plugin definition
    pub use kindred_core::prelude::*;
    pub use kindred_core::{LoadOutcome, PluginError};

    // Administrative surface
    pub use kindred_core::{DispatchOutcome, Dispatcher, LifecycleController};
}

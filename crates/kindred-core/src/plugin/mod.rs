//! Plugin definitions.
//!
//! # Architecture
//!
//! - [`CommandDeclaration`] binds a normalized command name to a handler.
//! - [`PluginUnit`] is a named bundle of declarations plus the optional
//!   `on_load` / `on_unload` / `on_ready` hooks and a state factory. Units
//!   are built explicitly with [`PluginUnit::builder`]; nothing is
//!   discovered at runtime.
//! - [`PluginDescriptor`] wraps a factory producing a unit. It is the
//!   definition source used by reload.
//! - [`PluginInstance`] is the live activation created on load and owned by
//!   the [`Registry`](crate::Registry).
//!
//! # Quick start
//!
//! ```rust,ignore
//! use kindred_core::prelude::*;
//!
//! async fn runes(ctx: CommandContext) -> Result<(), BoxError> {
//!     ctx.reply("Conqueror / Triumph / Legend: Alacrity / Cut Down").await
//! }
//!
//! pub fn riot() -> PluginDescriptor {
//!     PluginDescriptor::new("riot", || {
//!         PluginUnit::builder("riot").command("runes", runes).build()
//!     })
//! }
//! ```

pub mod builtin;
pub mod descriptor;
pub mod instance;
pub mod unit;

pub use descriptor::PluginDescriptor;
pub use instance::PluginInstance;
pub use unit::{CommandDeclaration, HookKind, Hooks, PluginUnit, PluginUnitBuilder, StateFactory};

//! # Kindred Core
//!
//! Plugin registration and command dispatch for chat bots.
//!
//! This layer provides:
//! - [`PluginUnit`] builders: named bundles of commands and lifecycle hooks
//! - [`Registry`] with global command-name uniqueness, published as
//!   immutable snapshots through [`SharedRegistry`]
//! - [`LifecycleController`] for transactional load / unload / reload
//! - [`Dispatcher`] mapping one [`ChatEvent`] to at most one handler
//!
//! The core is transport-agnostic: events come from whatever ingress the
//! runtime wires up, and replies leave through a [`MessageSink`].

pub mod capability;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod handler;
pub mod lifecycle;
pub mod name;
pub mod plugin;
pub mod registry;

pub use capability::{BoxedSink, Capabilities, CapabilitiesBuilder, MessageSink, NullSink};
pub use context::{CommandContext, HookContext, StateArc};
pub use dispatcher::{DispatchConfig, DispatchOutcome, Dispatcher};
pub use error::{BoxError, DefinitionError, PluginError, PluginResult};
pub use event::ChatEvent;
pub use handler::{BoxedHandler, CommandHandler, HandlerResult, IntoHandlerResult};
pub use lifecycle::{LifecycleController, LoadOutcome, PluginState};
pub use name::{Name, normalize};
pub use plugin::{CommandDeclaration, HookKind, PluginDescriptor, PluginInstance, PluginUnit};
pub use registry::{CommandEntry, Registry, SharedRegistry};

/// Everything a plugin author usually needs.
pub mod prelude {
    pub use crate::capability::{Capabilities, MessageSink};
    pub use crate::context::{CommandContext, HookContext};
    pub use crate::error::{BoxError, DefinitionError};
    pub use crate::event::ChatEvent;
    pub use crate::plugin::{PluginDescriptor, PluginUnit};
}

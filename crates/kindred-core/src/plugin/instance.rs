//! Live plugin activations.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};

use super::unit::{CommandDeclaration, HookKind, Hooks, PluginUnit};
use crate::capability::Capabilities;
use crate::context::{HookContext, StateArc};
use crate::error::DefinitionError;
use crate::handler::{HandlerResult, contain, panic_message};
use crate::name::Name;

/// A live activation of a [`PluginUnit`].
///
/// Created by the lifecycle controller on load and owned by the registry
/// entry for its plugin name. Dropped when the plugin is unloaded and no
/// in-flight handler still holds its state.
pub struct PluginInstance {
    name: Name,
    declarations: Vec<CommandDeclaration>,
    hooks: Hooks,
    state: Option<StateArc>,
    load_seq: u64,
    degraded: AtomicBool,
}

impl PluginInstance {
    /// Instantiates `unit`, building its state. Hooks are not run here.
    ///
    /// A panicking state factory yields [`DefinitionError::StatePanicked`].
    pub(crate) fn instantiate(
        unit: PluginUnit,
        caps: &Capabilities,
        load_seq: u64,
    ) -> Result<Self, DefinitionError> {
        let (name, declarations, hooks, state) = unit.into_parts();
        let state = match state {
            Some(factory) => Some(catch_unwind(AssertUnwindSafe(|| factory(caps))).map_err(
                |panic| DefinitionError::StatePanicked {
                    plugin: name.to_string(),
                    message: panic_message(panic.as_ref()),
                },
            )?),
            None => None,
        };
        Ok(Self {
            name,
            declarations,
            hooks,
            state,
            load_seq,
            degraded: AtomicBool::new(false),
        })
    }

    /// Normalized plugin name.
    pub fn name(&self) -> &Name {
        &self.name
    }

    /// Commands declared by the unit, in declaration order.
    pub fn declarations(&self) -> &[CommandDeclaration] {
        &self.declarations
    }

    /// Position of this instance in the global load order.
    pub fn load_seq(&self) -> u64 {
        self.load_seq
    }

    /// `true` when the plugin's `on_load` hook failed. The plugin stays
    /// loaded and its commands stay dispatchable.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }

    pub(crate) fn mark_degraded(&self) {
        self.degraded.store(true, Ordering::SeqCst);
    }

    pub(crate) fn state(&self) -> Option<StateArc> {
        self.state.clone()
    }

    /// Runs one hook, with panics turned into errors. A missing hook is a
    /// successful no-op.
    pub(crate) async fn run_hook(&self, kind: HookKind, caps: &Capabilities) -> HandlerResult {
        let Some(hook) = self.hooks.get(kind) else {
            return Ok(());
        };
        let ctx = HookContext::new(self.name.clone(), self.state(), caps.clone());
        contain(hook(ctx)).await
    }
}

impl std::fmt::Debug for PluginInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginInstance")
            .field("name", &self.name)
            .field("commands", &self.declarations.len())
            .field("load_seq", &self.load_seq)
            .field("degraded", &self.is_degraded())
            .finish_non_exhaustive()
    }
}

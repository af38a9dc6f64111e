//! Command declarations and plugin units.

use std::any::Any;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use crate::capability::Capabilities;
use crate::context::{CommandContext, HookContext, StateArc};
use crate::error::DefinitionError;
use crate::handler::{BoxedHandler, CommandHandler, HookFn, IntoHandlerResult, into_hook};
use crate::name::Name;

/// Builds the per-instance state value from the shared capabilities.
pub type StateFactory = Arc<dyn Fn(&Capabilities) -> StateArc + Send + Sync>;

// =============================================================================
// CommandDeclaration
// =============================================================================

/// A command name bound to its handler.
///
/// Created once at unit-definition time and immutable afterwards.
#[derive(Clone)]
pub struct CommandDeclaration {
    name: Name,
    handler: BoxedHandler,
}

impl CommandDeclaration {
    /// Declares `handler` under the normalized form of `name`.
    pub fn new(name: &str, handler: impl CommandHandler) -> Result<Self, DefinitionError> {
        Ok(Self {
            name: Name::new(name)?,
            handler: Arc::new(handler),
        })
    }

    /// The normalized command name.
    pub fn name(&self) -> &Name {
        &self.name
    }

    /// The bound handler.
    pub fn handler(&self) -> &BoxedHandler {
        &self.handler
    }
}

impl std::fmt::Debug for CommandDeclaration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandDeclaration")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Hooks
// =============================================================================

/// The three optional lifecycle hooks of a plugin unit.
#[derive(Clone, Default)]
pub struct Hooks {
    pub(crate) on_load: Option<HookFn>,
    pub(crate) on_unload: Option<HookFn>,
    pub(crate) on_ready: Option<HookFn>,
}

/// Identifies one of the lifecycle hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    /// Runs after the plugin's commands became visible.
    Load,
    /// Runs before the plugin's commands are removed.
    Unload,
    /// Runs once after the startup batch has been loaded.
    Ready,
}

impl HookKind {
    /// Hook name as used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Load => "on_load",
            Self::Unload => "on_unload",
            Self::Ready => "on_ready",
        }
    }
}

impl Hooks {
    pub(crate) fn get(&self, kind: HookKind) -> Option<&HookFn> {
        match kind {
            HookKind::Load => self.on_load.as_ref(),
            HookKind::Unload => self.on_unload.as_ref(),
            HookKind::Ready => self.on_ready.as_ref(),
        }
    }
}

// =============================================================================
// PluginUnit
// =============================================================================

/// A named bundle of command declarations and lifecycle hooks.
///
/// A unit is a *definition*; it becomes live when the
/// [`LifecycleController`](crate::LifecycleController) instantiates it.
///
/// # Example
///
/// ```rust,ignore
/// let unit = PluginUnit::builder("Greeter")
///     .state(|_caps| Greeter::default())
///     .command("hello", |ctx: CommandContext| async move {
///         ctx.reply("hi!").await
///     })
///     .on_load(|ctx: HookContext| async move {
///         tracing::info!(plugin = %ctx.plugin_name(), "ready to greet");
///     })
///     .build()?;
/// ```
#[derive(Clone)]
pub struct PluginUnit {
    name: Name,
    declarations: Vec<CommandDeclaration>,
    hooks: Hooks,
    state: Option<StateFactory>,
}

impl PluginUnit {
    /// Starts defining a unit named `name`.
    pub fn builder(name: &str) -> PluginUnitBuilder {
        PluginUnitBuilder {
            name: name.to_string(),
            declarations: Vec::new(),
            hooks: Hooks::default(),
            state: None,
        }
    }

    /// The normalized plugin name.
    pub fn name(&self) -> &Name {
        &self.name
    }

    /// The unit's command declarations, in declaration order.
    pub fn declarations(&self) -> &[CommandDeclaration] {
        &self.declarations
    }

    /// Names of every declared command.
    pub fn command_names(&self) -> Vec<&str> {
        self.declarations.iter().map(|d| d.name.as_str()).collect()
    }

    pub(crate) fn into_parts(self) -> (Name, Vec<CommandDeclaration>, Hooks, Option<StateFactory>) {
        (self.name, self.declarations, self.hooks, self.state)
    }
}

impl std::fmt::Debug for PluginUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginUnit")
            .field("name", &self.name)
            .field("commands", &self.command_names())
            .finish_non_exhaustive()
    }
}

/// Builder for [`PluginUnit`].
///
/// Names are validated in [`build`](Self::build), so the builder itself never
/// fails part-way.
pub struct PluginUnitBuilder {
    name: String,
    declarations: Vec<(String, BoxedHandler)>,
    hooks: Hooks,
    state: Option<StateFactory>,
}

impl PluginUnitBuilder {
    /// Declares a command.
    pub fn command<F, Fut, R>(mut self, name: &str, handler: F) -> Self
    where
        F: Fn(CommandContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoHandlerResult,
    {
        let handler: BoxedHandler = Arc::new(handler);
        self.declarations.push((name.to_string(), handler));
        self
    }

    /// Sets the `on_load` hook.
    pub fn on_load<F, Fut, R>(mut self, hook: F) -> Self
    where
        F: Fn(HookContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoHandlerResult,
    {
        self.hooks.on_load = Some(into_hook(hook));
        self
    }

    /// Sets the `on_unload` hook.
    pub fn on_unload<F, Fut, R>(mut self, hook: F) -> Self
    where
        F: Fn(HookContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoHandlerResult,
    {
        self.hooks.on_unload = Some(into_hook(hook));
        self
    }

    /// Sets the `on_ready` hook.
    pub fn on_ready<F, Fut, R>(mut self, hook: F) -> Self
    where
        F: Fn(HookContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoHandlerResult,
    {
        self.hooks.on_ready = Some(into_hook(hook));
        self
    }

    /// Sets the factory for the per-instance state value. Called once per
    /// load; reloading a plugin starts from fresh state.
    pub fn state<T, F>(mut self, factory: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&Capabilities) -> T + Send + Sync + 'static,
    {
        let factory: StateFactory =
            Arc::new(move |caps: &Capabilities| Arc::new(factory(caps)) as StateArc);
        self.state = Some(factory);
        self
    }

    /// Validates names and finishes the unit.
    ///
    /// Fails with [`DefinitionError::DuplicateCommand`] when two declarations
    /// normalize to the same name.
    pub fn build(self) -> Result<PluginUnit, DefinitionError> {
        let name = Name::new(&self.name)?;
        let mut seen = HashSet::new();
        let mut declarations = Vec::with_capacity(self.declarations.len());

        for (raw, handler) in self.declarations {
            let command = Name::new(&raw)?;
            if !seen.insert(command.clone()) {
                return Err(DefinitionError::DuplicateCommand {
                    plugin: name.to_string(),
                    command: command.to_string(),
                });
            }
            declarations.push(CommandDeclaration {
                name: command,
                handler,
            });
        }

        Ok(PluginUnit {
            name,
            declarations,
            hooks: self.hooks,
            state: self.state,
        })
    }
}

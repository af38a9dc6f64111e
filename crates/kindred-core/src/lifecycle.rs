//! Plugin lifecycle management.
//!
//! [`LifecycleController`] is the only component that mutates the registry.
//! Each mutating operation:
//!
//! 1. takes the admin lock, so load/unload/reload never interleave;
//! 2. copies the current registry snapshot;
//! 3. applies the whole transaction to the copy;
//! 4. publishes the copy in a single swap, or drops it on failure.
//!
//! A dispatch running concurrently therefore sees the registry either before
//! or after a transaction, and a failed load leaves nothing behind.
//!
//! Hooks run while the admin lock is held. A hook must not call back into
//! the controller; handlers may, since dispatch holds no lock.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::{Instrument, error, info, info_span, warn};

use crate::capability::Capabilities;
use crate::error::{PluginError, PluginResult};
use crate::name::{Name, normalize};
use crate::plugin::{HookKind, PluginDescriptor, PluginInstance, PluginUnit};
use crate::registry::SharedRegistry;

// =============================================================================
// States and outcomes
// =============================================================================

/// Lifecycle state of a plugin name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginState {
    /// Not present in the registry.
    Unloaded,
    /// A load transaction is in progress.
    Loading,
    /// Present in the registry; its commands are dispatchable.
    Loaded,
    /// An unload transaction is in progress.
    Unloading,
    /// A reload (unload followed by load) is in progress.
    Reloading,
}

/// Result of a successful load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Commands registered and `on_load` succeeded.
    Loaded,
    /// Commands registered but `on_load` failed. The plugin stays loaded.
    Degraded,
}

/// Records an in-progress transition and restores the previous entry when
/// dropped.
struct Transition<'a> {
    table: &'a Mutex<HashMap<Name, PluginState>>,
    plugin: Name,
    previous: Option<PluginState>,
}

impl<'a> Transition<'a> {
    fn enter(table: &'a Mutex<HashMap<Name, PluginState>>, plugin: &Name, state: PluginState) -> Self {
        let previous = table.lock().insert(plugin.clone(), state);
        Self {
            table,
            plugin: plugin.clone(),
            previous,
        }
    }
}

impl Drop for Transition<'_> {
    fn drop(&mut self) {
        let mut table = self.table.lock();
        match self.previous {
            Some(state) => {
                table.insert(self.plugin.clone(), state);
            }
            None => {
                table.remove(&self.plugin);
            }
        }
    }
}

// =============================================================================
// LifecycleController
// =============================================================================

/// Loads, unloads and reloads plugins against a [`SharedRegistry`].
///
/// # Example
///
/// ```rust,ignore
/// let registry = SharedRegistry::new();
/// let controller = LifecycleController::new(registry.clone(), Capabilities::default());
///
/// controller.load_plugins([riot(), lolpros()]).await?;
/// controller.broadcast_ready().await;
/// // …later…
/// controller.reload_plugin("riot").await?;
/// controller.teardown().await;
/// ```
pub struct LifecycleController {
    registry: SharedRegistry,
    capabilities: Capabilities,
    catalog: Mutex<HashMap<Name, PluginDescriptor>>,
    transitions: Mutex<HashMap<Name, PluginState>>,
    admin: tokio::sync::Mutex<()>,
    next_seq: AtomicU64,
}

impl LifecycleController {
    /// Creates a controller publishing into `registry`. `capabilities` are
    /// handed to every state factory and hook.
    pub fn new(registry: SharedRegistry, capabilities: Capabilities) -> Self {
        Self {
            registry,
            capabilities,
            catalog: Mutex::new(HashMap::new()),
            transitions: Mutex::new(HashMap::new()),
            admin: tokio::sync::Mutex::new(()),
            next_seq: AtomicU64::new(0),
        }
    }

    /// The registry this controller publishes into.
    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    /// The capabilities handed to plugins.
    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    // =========================================================================
    // Core transitions
    // =========================================================================

    /// Loads `unit`.
    ///
    /// Fails with [`PluginError::AlreadyLoaded`] if a plugin with the same
    /// name is loaded, and with [`PluginError::NameConflict`] if any of its
    /// commands is owned by another plugin. On failure none of the unit's
    /// commands become visible.
    pub async fn load(&self, unit: PluginUnit) -> PluginResult<LoadOutcome> {
        let _admin = self.admin.lock().await;
        self.load_locked(unit).await
    }

    /// Unloads `name`. Fails with [`PluginError::NotLoaded`] if absent.
    ///
    /// `on_unload` is best-effort: its failure is logged and the unload
    /// completes anyway.
    pub async fn unload(&self, name: &str) -> PluginResult<()> {
        let _admin = self.admin.lock().await;
        self.unload_locked(name).await
    }

    /// Unloads `name` and loads a freshly resolved unit from its descriptor.
    ///
    /// The unload always completes first. If the descriptor is missing or
    /// fails to resolve, [`PluginError::ReloadFailed`] is returned and the
    /// plugin stays unloaded. If the refreshed unit cannot be loaded (for
    /// example a new command collides with another plugin), that load error
    /// is returned unchanged and the plugin also stays unloaded.
    pub async fn reload(&self, name: &str) -> PluginResult<LoadOutcome> {
        let _admin = self.admin.lock().await;
        self.reload_locked(name).await
    }

    /// Loads a unit resolved from `descriptor`. On success the descriptor
    /// becomes the definition source of its plugin; a rejected load leaves
    /// the previous source in place.
    pub async fn load_descriptor(&self, descriptor: PluginDescriptor) -> PluginResult<LoadOutcome> {
        let _admin = self.admin.lock().await;
        self.load_descriptor_locked(descriptor).await
    }

    /// Loads a plugin previously recorded with [`define`](Self::define) or
    /// [`load_descriptor`](Self::load_descriptor).
    pub async fn load_defined(&self, name: &str) -> PluginResult<LoadOutcome> {
        let _admin = self.admin.lock().await;
        let plugin = normalize(name);
        let descriptor = self.catalog.lock().get(plugin.as_str()).cloned();
        let Some(descriptor) = descriptor else {
            return Err(PluginError::NotLoaded { plugin });
        };
        let unit = descriptor.resolve()?;
        self.load_locked(unit).await
    }

    /// Records or replaces the definition source of a plugin without loading
    /// it. The next reload picks it up.
    pub fn define(&self, descriptor: PluginDescriptor) -> PluginResult<()> {
        let name = Name::new(descriptor.name())?;
        self.catalog.lock().insert(name, descriptor);
        Ok(())
    }

    /// Names of every plugin with a recorded definition source, sorted.
    pub fn defined_names(&self) -> Vec<Name> {
        let mut names: Vec<Name> = self.catalog.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Current lifecycle state of `name`.
    pub fn state_of(&self, name: &str) -> PluginState {
        let plugin = normalize(name);
        if let Some(state) = self.transitions.lock().get(plugin.as_str()) {
            return *state;
        }
        if self.registry.snapshot().is_plugin_loaded(&plugin) {
            PluginState::Loaded
        } else {
            PluginState::Unloaded
        }
    }

    /// Calls `on_ready` on every loaded plugin, in load order. A failing
    /// hook is logged and does not stop the others.
    pub async fn broadcast_ready(&self) {
        let _admin = self.admin.lock().await;
        let plugins = self.registry.snapshot().plugins_in_load_order();
        for instance in plugins {
            let span = info_span!("plugin", plugin = %instance.name(), hook = HookKind::Ready.as_str());
            if let Err(error) = instance
                .run_hook(HookKind::Ready, &self.capabilities)
                .instrument(span)
                .await
            {
                error!(plugin = %instance.name(), hook = HookKind::Ready.as_str(), %error, "Plugin hook failed");
            }
        }
    }

    /// Unloads every plugin in reverse load order.
    pub async fn teardown(&self) {
        let _admin = self.admin.lock().await;
        let plugins = self.registry.snapshot().plugins_in_load_order();
        for instance in plugins.iter().rev() {
            if let Err(e) = self.unload_locked(instance.name().as_str()).await {
                warn!(plugin = %instance.name(), error = %e, "Plugin unload during teardown failed");
            }
        }
        info!(count = plugins.len(), "All plugins unloaded");
    }

    // =========================================================================
    // Administrative surface
    // =========================================================================

    /// Loads each descriptor in order, stopping at the first error. Plugins
    /// loaded before the failure stay loaded.
    pub async fn load_plugins<I>(&self, descriptors: I) -> PluginResult<Vec<(Name, LoadOutcome)>>
    where
        I: IntoIterator<Item = PluginDescriptor>,
    {
        let _admin = self.admin.lock().await;
        let mut loaded = Vec::new();
        for descriptor in descriptors {
            let name = Name::new(descriptor.name())?;
            let outcome = self.load_descriptor_locked(descriptor).await?;
            loaded.push((name, outcome));
        }
        Ok(loaded)
    }

    /// Administrative alias of [`unload`](Self::unload).
    pub async fn unload_plugin(&self, name: &str) -> PluginResult<()> {
        self.unload(name).await
    }

    /// Administrative alias of [`reload`](Self::reload).
    pub async fn reload_plugin(&self, name: &str) -> PluginResult<LoadOutcome> {
        self.reload(name).await
    }

    // =========================================================================
    // Transactions (admin lock held)
    // =========================================================================

    async fn load_descriptor_locked(&self, descriptor: PluginDescriptor) -> PluginResult<LoadOutcome> {
        let unit = descriptor.resolve()?;
        let plugin = unit.name().clone();
        let outcome = self.load_locked(unit).await?;
        // A rejected load must not replace the reload source.
        self.catalog.lock().insert(plugin, descriptor);
        Ok(outcome)
    }

    async fn load_locked(&self, unit: PluginUnit) -> PluginResult<LoadOutcome> {
        let plugin = unit.name().clone();
        let _transition = Transition::enter(&self.transitions, &plugin, PluginState::Loading);

        let current = self.registry.snapshot();
        if current.is_plugin_loaded(plugin.as_str()) {
            return Err(PluginError::AlreadyLoaded {
                plugin: plugin.to_string(),
            });
        }

        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let instance = match PluginInstance::instantiate(unit, &self.capabilities, seq) {
            Ok(instance) => Arc::new(instance),
            Err(e) => {
                error!(plugin = %plugin, error = %e, "Plugin state construction failed");
                return Err(e.into());
            }
        };

        let mut staged = (*current).clone();
        for declaration in instance.declarations() {
            if let Err(e) =
                staged.register_command(&plugin, declaration.name(), Arc::clone(declaration.handler()))
            {
                warn!(plugin = %plugin, error = %e, "Plugin load rolled back");
                return Err(e);
            }
        }
        staged.register_plugin(Arc::clone(&instance))?;
        self.registry.publish(staged);

        info!(
            plugin = %plugin,
            commands = instance.declarations().len(),
            "Plugin loaded"
        );

        let span = info_span!("plugin", plugin = %plugin, hook = HookKind::Load.as_str());
        match instance
            .run_hook(HookKind::Load, &self.capabilities)
            .instrument(span)
            .await
        {
            Ok(()) => Ok(LoadOutcome::Loaded),
            Err(error) => {
                instance.mark_degraded();
                error!(plugin = %plugin, hook = HookKind::Load.as_str(), %error, "Plugin hook failed, plugin degraded");
                Ok(LoadOutcome::Degraded)
            }
        }
    }

    async fn unload_locked(&self, name: &str) -> PluginResult<()> {
        let current = self.registry.snapshot();
        let Some(instance) = current.get_plugin(&normalize(name)).cloned() else {
            return Err(PluginError::NotLoaded {
                plugin: normalize(name),
            });
        };
        let plugin = instance.name().clone();
        let _transition = Transition::enter(&self.transitions, &plugin, PluginState::Unloading);

        let span = info_span!("plugin", plugin = %plugin, hook = HookKind::Unload.as_str());
        if let Err(error) = instance
            .run_hook(HookKind::Unload, &self.capabilities)
            .instrument(span)
            .await
        {
            error!(plugin = %plugin, hook = HookKind::Unload.as_str(), %error, "Plugin hook failed");
        }

        let mut staged = (*current).clone();
        let removed = staged.unregister_commands_of(plugin.as_str());
        staged.remove_plugin(plugin.as_str());
        self.registry.publish(staged);

        info!(plugin = %plugin, commands = removed.len(), "Plugin unloaded");
        Ok(())
    }

    async fn reload_locked(&self, name: &str) -> PluginResult<LoadOutcome> {
        let plugin = match self.registry.snapshot().get_plugin(&normalize(name)) {
            Some(instance) => instance.name().clone(),
            None => {
                return Err(PluginError::NotLoaded {
                    plugin: normalize(name),
                });
            }
        };
        let _transition = Transition::enter(&self.transitions, &plugin, PluginState::Reloading);

        self.unload_locked(plugin.as_str()).await?;

        let descriptor = self.catalog.lock().get(&plugin).cloned();
        let Some(descriptor) = descriptor else {
            warn!(plugin = %plugin, "Reload failed, plugin left unloaded");
            return Err(PluginError::ReloadFailed {
                plugin: plugin.to_string(),
                reason: "no definition source registered".to_string(),
            });
        };
        let unit = descriptor.resolve().map_err(|e| {
            warn!(plugin = %plugin, error = %e, "Reload failed, plugin left unloaded");
            PluginError::ReloadFailed {
                plugin: plugin.to_string(),
                reason: e.to_string(),
            }
        })?;

        let outcome = self.load_locked(unit).await?;
        info!(plugin = %plugin, "Plugin reloaded");
        Ok(outcome)
    }
}

impl std::fmt::Debug for LifecycleController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleController")
            .field("registry", &self.registry)
            .field("catalog", &self.catalog.lock().keys())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{CommandContext, HookContext};
    use crate::error::DefinitionError;
    use std::sync::atomic::{AtomicBool, AtomicUsize};

    fn controller() -> LifecycleController {
        LifecycleController::new(SharedRegistry::new(), Capabilities::default())
    }

    async fn noop(_ctx: CommandContext) {}

    async fn refuse(_ctx: HookContext) {
        panic!("refusing to leave");
    }

    fn unit(plugin: &str, commands: &[&str]) -> PluginUnit {
        commands
            .iter()
            .fold(PluginUnit::builder(plugin), |b, c| b.command(c, noop))
            .build()
            .unwrap()
    }

    fn owned(controller: &LifecycleController, plugin: &str) -> Vec<String> {
        controller
            .registry()
            .snapshot()
            .commands_of(plugin)
            .into_iter()
            .map(|n| n.to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_invariants_hold_across_load_unload_sequence() {
        let controller = controller();
        let steps: Vec<(&str, bool)> = vec![
            ("riot", true),
            ("lolpros", true),
            ("riot", false),
            ("stats", true),
            ("riot", true),
            ("lolpros", false),
            ("stats", false),
        ];
        for (plugin, load) in steps {
            if load {
                let commands = [format!("{plugin}_a"), format!("{plugin}_b")];
                let refs: Vec<&str> = commands.iter().map(String::as_str).collect();
                controller.load(unit(plugin, &refs)).await.unwrap();
            } else {
                controller.unload(plugin).await.unwrap();
            }
            controller.registry().snapshot().check_invariants().unwrap();
        }
        assert_eq!(
            controller.registry().snapshot().plugin_names(),
            vec![Name::new("riot").unwrap()]
        );
    }

    #[tokio::test]
    async fn test_conflicting_load_rolls_back() {
        let controller = controller();
        controller.load(unit("first", &["foo", "one"])).await.unwrap();

        let err = controller
            .load(unit("second", &["alpha", "FOO", "omega"]))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            PluginError::NameConflict {
                command: "foo".into(),
                owner: "first".into(),
            }
        );
        let snapshot = controller.registry().snapshot();
        assert!(snapshot.commands_of("second").is_empty());
        assert!(!snapshot.is_plugin_loaded("second"));
        assert_eq!(owned(&controller, "first"), vec!["foo", "one"]);
        assert_eq!(controller.state_of("second"), PluginState::Unloaded);
        snapshot.check_invariants().unwrap();
    }

    #[tokio::test]
    async fn test_conflicting_load_never_runs_on_load() {
        let controller = controller();
        let ran = Arc::new(AtomicBool::new(false));
        controller.load(unit("first", &["foo"])).await.unwrap();

        let flag = Arc::clone(&ran);
        let second = PluginUnit::builder("second")
            .command("foo", noop)
            .on_load(move |_ctx: HookContext| {
                let flag = Arc::clone(&flag);
                async move { flag.store(true, Ordering::SeqCst) }
            })
            .build()
            .unwrap();

        assert!(controller.load(second).await.is_err());
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_load_twice_is_already_loaded() {
        let controller = controller();
        controller.load(unit("riot", &["runes"])).await.unwrap();
        assert_eq!(
            controller.load(unit(" RIOT", &["rank"])).await.unwrap_err(),
            PluginError::AlreadyLoaded {
                plugin: "riot".into()
            }
        );
        assert_eq!(owned(&controller, "riot"), vec!["runes"]);
    }

    #[tokio::test]
    async fn test_rejected_descriptor_keeps_previous_reload_source() {
        let controller = controller();
        controller
            .load_descriptor(PluginDescriptor::new("riot", || {
                PluginUnit::builder("riot").command("runes", noop).build()
            }))
            .await
            .unwrap();

        let err = controller
            .load_descriptor(PluginDescriptor::new("riot", || {
                PluginUnit::builder("riot").command("hijack", noop).build()
            }))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            PluginError::AlreadyLoaded {
                plugin: "riot".into()
            }
        );

        controller.reload("riot").await.unwrap();
        assert_eq!(owned(&controller, "riot"), vec!["runes"]);
    }

    #[tokio::test]
    async fn test_conflicting_descriptor_is_not_recorded() {
        let controller = controller();
        controller.load(unit("first", &["foo"])).await.unwrap();

        let result = controller
            .load_descriptor(PluginDescriptor::new("second", || {
                PluginUnit::builder("second").command("foo", noop).build()
            }))
            .await;

        assert!(matches!(result, Err(PluginError::NameConflict { .. })));
        assert!(controller.defined_names().is_empty());
    }

    #[tokio::test]
    async fn test_unload_removes_exactly_owned_commands() {
        let controller = controller();
        controller.load(unit("riot", &["runes", "rank"])).await.unwrap();
        controller.load(unit("lolpros", &["pros"])).await.unwrap();

        controller.unload("Riot").await.unwrap();

        let snapshot = controller.registry().snapshot();
        assert!(snapshot.command("runes").is_none());
        assert!(snapshot.command("rank").is_none());
        assert_eq!(snapshot.owner_of("pros").unwrap(), "lolpros");
        assert_eq!(controller.state_of("riot"), PluginState::Unloaded);
    }

    #[tokio::test]
    async fn test_unload_unknown_is_not_loaded_and_changes_nothing() {
        let controller = controller();
        controller.load(unit("riot", &["runes"])).await.unwrap();
        let before = controller.registry().snapshot();

        assert_eq!(
            controller.unload("ghost").await.unwrap_err(),
            PluginError::NotLoaded {
                plugin: "ghost".into()
            }
        );
        assert!(Arc::ptr_eq(&before, &controller.registry().snapshot()));
    }

    #[tokio::test]
    async fn test_failing_on_load_degrades_but_keeps_commands() {
        let controller = controller();
        let unit = PluginUnit::builder("flaky")
            .command("flake", noop)
            .on_load(|_ctx: HookContext| async { Err::<(), _>("database unreachable") })
            .build()
            .unwrap();

        assert_eq!(controller.load(unit).await.unwrap(), LoadOutcome::Degraded);
        let snapshot = controller.registry().snapshot();
        assert!(snapshot.get_plugin("flaky").unwrap().is_degraded());
        assert!(snapshot.command("flake").is_some());
        assert_eq!(controller.state_of("flaky"), PluginState::Loaded);
    }

    #[tokio::test]
    async fn test_panicking_on_unload_still_unloads() {
        let controller = controller();
        let unit = PluginUnit::builder("grumpy")
            .command("grump", noop)
            .on_unload(refuse)
            .build()
            .unwrap();
        controller.load(unit).await.unwrap();

        controller.unload("grumpy").await.unwrap();
        assert!(!controller.registry().snapshot().is_plugin_loaded("grumpy"));
    }

    #[tokio::test]
    async fn test_panicking_state_factory_fails_load() {
        let controller = controller();
        let unit = PluginUnit::builder("fragile")
            .command("shatter", noop)
            .state(|_caps: &Capabilities| -> AtomicUsize { panic!("no state for you") })
            .build()
            .unwrap();

        let err = controller.load(unit).await.unwrap_err();

        assert_eq!(
            err,
            PluginError::Definition(DefinitionError::StatePanicked {
                plugin: "fragile".into(),
                message: "no state for you".into(),
            })
        );
        assert!(controller.registry().snapshot().is_empty());
        assert_eq!(controller.state_of("fragile"), PluginState::Unloaded);
    }

    static WITH_BAR: AtomicBool = AtomicBool::new(false);

    fn evolving() -> PluginDescriptor {
        PluginDescriptor::new("Evolving", || {
            let mut builder = PluginUnit::builder("evolving").command("foo", noop);
            if WITH_BAR.load(Ordering::SeqCst) {
                builder = builder.command("bar", noop);
            }
            builder.build()
        })
    }

    #[tokio::test]
    async fn test_reload_picks_up_refreshed_definition() {
        let controller = controller();
        controller.load(unit("bystander", &["stand"])).await.unwrap();
        controller.load_descriptor(evolving()).await.unwrap();
        assert_eq!(owned(&controller, "evolving"), vec!["foo"]);

        WITH_BAR.store(true, Ordering::SeqCst);
        controller.reload("evolving").await.unwrap();

        assert_eq!(owned(&controller, "evolving"), vec!["bar", "foo"]);
        assert_eq!(owned(&controller, "bystander"), vec!["stand"]);
        controller.registry().snapshot().check_invariants().unwrap();
    }

    #[tokio::test]
    async fn test_reload_with_redefined_source() {
        let controller = controller();
        controller
            .load_descriptor(PluginDescriptor::new("stats", || {
                PluginUnit::builder("stats").command("rank", noop).build()
            }))
            .await
            .unwrap();

        controller
            .define(PluginDescriptor::new("stats", || {
                PluginUnit::builder("stats")
                    .command("winrate", noop)
                    .build()
            }))
            .unwrap();
        controller.reload_plugin("stats").await.unwrap();

        assert_eq!(owned(&controller, "stats"), vec!["winrate"]);
    }

    #[tokio::test]
    async fn test_reload_without_source_leaves_plugin_unloaded() {
        let controller = controller();
        controller.load(unit("adhoc", &["once"])).await.unwrap();

        let err = controller.reload("adhoc").await.unwrap_err();

        assert!(matches!(err, PluginError::ReloadFailed { ref plugin, .. } if plugin == "adhoc"));
        assert_eq!(controller.state_of("adhoc"), PluginState::Unloaded);
        assert!(controller.registry().snapshot().command("once").is_none());
    }

    #[tokio::test]
    async fn test_reload_with_broken_definition_is_reload_failed() {
        let controller = controller();
        controller
            .load_descriptor(PluginDescriptor::new("broken", || {
                PluginUnit::builder("broken").command("x", noop).build()
            }))
            .await
            .unwrap();
        controller
            .define(PluginDescriptor::new("broken", || {
                PluginUnit::builder("broken")
                    .command("x", noop)
                    .command("X", noop)
                    .build()
            }))
            .unwrap();

        let err = controller.reload("broken").await.unwrap_err();
        assert!(matches!(err, PluginError::ReloadFailed { .. }));
        assert!(!controller.registry().snapshot().is_plugin_loaded("broken"));
    }

    #[tokio::test]
    async fn test_reload_unknown_is_not_loaded() {
        let controller = controller();
        assert!(matches!(
            controller.reload("ghost").await,
            Err(PluginError::NotLoaded { .. })
        ));
    }

    #[tokio::test]
    async fn test_load_plugins_stops_at_first_error() {
        let controller = controller();
        let result = controller
            .load_plugins([
                PluginDescriptor::new("a", || PluginUnit::builder("a").command("x", noop).build()),
                PluginDescriptor::new("b", || PluginUnit::builder("b").command("x", noop).build()),
                PluginDescriptor::new("c", || PluginUnit::builder("c").command("y", noop).build()),
            ])
            .await;

        assert!(matches!(result, Err(PluginError::NameConflict { .. })));
        let snapshot = controller.registry().snapshot();
        assert!(snapshot.is_plugin_loaded("a"));
        assert!(!snapshot.is_plugin_loaded("b"));
        assert!(!snapshot.is_plugin_loaded("c"));
    }

    #[tokio::test]
    async fn test_load_defined_uses_catalog() {
        let controller = controller();
        controller
            .define(PluginDescriptor::new("later", || {
                PluginUnit::builder("later").command("soon", noop).build()
            }))
            .unwrap();
        assert_eq!(controller.state_of("later"), PluginState::Unloaded);

        controller.load_defined("later").await.unwrap();
        assert_eq!(controller.state_of("later"), PluginState::Loaded);
        assert!(matches!(
            controller.load_defined("never").await,
            Err(PluginError::NotLoaded { .. })
        ));
    }

    #[tokio::test]
    async fn test_broadcast_ready_isolates_failures_in_load_order() {
        let controller = controller();
        let order = Arc::new(Mutex::new(Vec::new()));

        for name in ["one", "two", "three"] {
            let order = Arc::clone(&order);
            let unit = PluginUnit::builder(name)
                .on_ready(move |ctx: HookContext| {
                    let order = Arc::clone(&order);
                    async move {
                        order.lock().push(ctx.plugin_name().to_string());
                        if ctx.plugin_name() == "two" {
                            return Err::<(), _>("ready failed");
                        }
                        Ok(())
                    }
                })
                .build()
                .unwrap();
            controller.load(unit).await.unwrap();
        }

        controller.broadcast_ready().await;
        assert_eq!(*order.lock(), vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn test_broadcast_ready_waits_for_running_transaction() {
        let controller = Arc::new(controller());
        let entered = Arc::new(tokio::sync::Notify::new());
        let release = Arc::new(tokio::sync::Notify::new());
        let ready_calls = Arc::new(AtomicUsize::new(0));

        let unit = {
            let entered = Arc::clone(&entered);
            let release = Arc::clone(&release);
            let ready_calls = Arc::clone(&ready_calls);
            PluginUnit::builder("slow")
                .on_unload(move |_ctx: HookContext| {
                    let entered = Arc::clone(&entered);
                    let release = Arc::clone(&release);
                    async move {
                        entered.notify_one();
                        release.notified().await;
                    }
                })
                .on_ready(move |_ctx: HookContext| {
                    let ready_calls = Arc::clone(&ready_calls);
                    async move {
                        ready_calls.fetch_add(1, Ordering::SeqCst);
                    }
                })
                .build()
                .unwrap()
        };
        controller.load(unit).await.unwrap();

        let unloading = tokio::spawn({
            let controller = Arc::clone(&controller);
            async move { controller.unload("slow").await }
        });
        entered.notified().await;

        let during = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            controller.broadcast_ready(),
        )
        .await;
        assert!(during.is_err());

        release.notify_one();
        unloading.await.unwrap().unwrap();
        controller.broadcast_ready().await;
        assert_eq!(ready_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_teardown_unloads_in_reverse_order() {
        let controller = controller();
        let order = Arc::new(Mutex::new(Vec::new()));

        for name in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            let unit = PluginUnit::builder(name)
                .on_unload(move |ctx: HookContext| {
                    let order = Arc::clone(&order);
                    async move { order.lock().push(ctx.plugin_name().to_string()) }
                })
                .build()
                .unwrap();
            controller.load(unit).await.unwrap();
        }

        controller.teardown().await;
        assert_eq!(*order.lock(), vec!["third", "second", "first"]);
        assert_eq!(controller.registry().snapshot().plugin_count(), 0);
    }

    #[tokio::test]
    async fn test_state_is_built_once_per_load() {
        let controller = controller();
        let builds = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&builds);
        controller
            .load_descriptor(PluginDescriptor::new("counter", move || {
                let counter = Arc::clone(&counter);
                PluginUnit::builder("counter")
                    .state(move |_caps: &Capabilities| {
                        counter.fetch_add(1, Ordering::SeqCst);
                        AtomicUsize::new(0)
                    })
                    .build()
            }))
            .await
            .unwrap();
        controller.reload("counter").await.unwrap();

        assert_eq!(builds.load(Ordering::SeqCst), 2);
    }
}

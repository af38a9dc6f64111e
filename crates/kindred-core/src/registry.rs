//! The command / plugin registry.
//!
//! [`Registry`] is a plain value owning three mappings:
//!
//! - command name → handler
//! - command name → owning plugin name
//! - plugin name → live [`PluginInstance`]
//!
//! It performs pure map mutations and enforces global command-name
//! uniqueness. It is never mutated in place while shared: the
//! [`SharedRegistry`] cell publishes immutable `Arc<Registry>` snapshots, and
//! the lifecycle controller edits a private copy which it swaps in once the
//! whole transaction succeeded. A dispatch therefore always sees either the
//! state before or the state after a load/unload, never a mix.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{PluginError, PluginResult};
use crate::handler::BoxedHandler;
use crate::name::Name;
use crate::plugin::PluginInstance;

// =============================================================================
// Registry
// =============================================================================

/// A registered command as seen through a snapshot.
#[derive(Clone, Copy)]
pub struct CommandEntry<'a> {
    /// Normalized command name.
    pub name: &'a Name,
    /// Bound handler.
    pub handler: &'a BoxedHandler,
    /// Owning plugin.
    pub owner: &'a Name,
}

/// Registry state.
///
/// Outside a registration transaction the following always hold:
///
/// - the command and owner maps have exactly the same keys;
/// - every owner is a loaded plugin;
/// - a command name has at most one owner.
#[derive(Clone, Default)]
pub struct Registry {
    commands: HashMap<Name, BoxedHandler>,
    owners: HashMap<Name, Name>,
    plugins: HashMap<Name, Arc<PluginInstance>>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Mutation
    // =========================================================================

    /// Binds `command` to `handler` on behalf of `plugin`.
    ///
    /// Fails with [`PluginError::NameConflict`] when the command is already
    /// owned by a different plugin. Re-registering under the same owner
    /// replaces the handler.
    pub fn register_command(
        &mut self,
        plugin: &Name,
        command: &Name,
        handler: BoxedHandler,
    ) -> PluginResult<()> {
        match self.owners.get(command) {
            Some(owner) if owner != plugin => {
                return Err(PluginError::NameConflict {
                    command: command.to_string(),
                    owner: owner.to_string(),
                });
            }
            _ => {}
        }
        self.commands.insert(command.clone(), handler);
        self.owners.insert(command.clone(), plugin.clone());
        Ok(())
    }

    /// Removes every command owned by `plugin` and returns their names.
    /// Idempotent.
    pub fn unregister_commands_of(&mut self, plugin: &str) -> Vec<Name> {
        let owned: Vec<Name> = self
            .owners
            .iter()
            .filter(|(_, owner)| owner.as_str() == plugin)
            .map(|(command, _)| command.clone())
            .collect();

        for command in &owned {
            self.commands.remove(command);
            self.owners.remove(command);
        }
        owned
    }

    /// Records a live plugin instance.
    pub fn register_plugin(&mut self, instance: Arc<PluginInstance>) -> PluginResult<()> {
        let name = instance.name().clone();
        if self.plugins.contains_key(&name) {
            return Err(PluginError::AlreadyLoaded {
                plugin: name.to_string(),
            });
        }
        self.plugins.insert(name, instance);
        Ok(())
    }

    /// Removes a plugin instance, returning it if it was present.
    pub fn remove_plugin(&mut self, plugin: &str) -> Option<Arc<PluginInstance>> {
        self.plugins.remove(plugin)
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    /// Returns `true` if `plugin` is loaded.
    pub fn is_plugin_loaded(&self, plugin: &str) -> bool {
        self.plugins.contains_key(plugin)
    }

    /// Returns the live instance of `plugin`.
    pub fn get_plugin(&self, plugin: &str) -> Option<&Arc<PluginInstance>> {
        self.plugins.get(plugin)
    }

    /// Returns the registration of `command`.
    pub fn command(&self, command: &str) -> Option<CommandEntry<'_>> {
        let (name, handler) = self.commands.get_key_value(command)?;
        let owner = self.owners.get(command)?;
        Some(CommandEntry {
            name,
            handler,
            owner,
        })
    }

    /// Returns the plugin owning `command`.
    pub fn owner_of(&self, command: &str) -> Option<&Name> {
        self.owners.get(command)
    }

    /// Commands owned by `plugin`, sorted by name.
    pub fn commands_of(&self, plugin: &str) -> Vec<&Name> {
        let mut owned: Vec<&Name> = self
            .owners
            .iter()
            .filter(|(_, owner)| owner.as_str() == plugin)
            .map(|(command, _)| command)
            .collect();
        owned.sort();
        owned
    }

    /// Loaded plugins, in the order they were loaded.
    pub fn plugins_in_load_order(&self) -> Vec<Arc<PluginInstance>> {
        let mut plugins: Vec<Arc<PluginInstance>> = self.plugins.values().cloned().collect();
        plugins.sort_by_key(|p| p.load_seq());
        plugins
    }

    /// Names of loaded plugins, in load order.
    pub fn plugin_names(&self) -> Vec<Name> {
        self.plugins_in_load_order()
            .iter()
            .map(|p| p.name().clone())
            .collect()
    }

    /// Number of registered commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// `true` when no command is registered.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Number of loaded plugins.
    pub fn plugin_count(&self) -> usize {
        self.plugins.len()
    }

    /// Verifies the registry invariants, describing the first violation.
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.commands.len() != self.owners.len() {
            return Err(format!(
                "{} commands but {} owner entries",
                self.commands.len(),
                self.owners.len()
            ));
        }
        for (command, owner) in &self.owners {
            if !self.commands.contains_key(command) {
                return Err(format!("owner entry for unknown command '{command}'"));
            }
            if !self.plugins.contains_key(owner) {
                return Err(format!(
                    "command '{command}' owned by plugin '{owner}' which is not loaded"
                ));
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("owners", &self.owners)
            .field("plugins", &self.plugins.keys())
            .finish()
    }
}

// =============================================================================
// SharedRegistry
// =============================================================================

/// Shared, snapshot-publishing handle to the [`Registry`].
///
/// Readers take a cheap `Arc` snapshot. Only the lifecycle controller
/// publishes new state.
#[derive(Clone, Default)]
pub struct SharedRegistry {
    current: Arc<RwLock<Arc<Registry>>>,
}

impl SharedRegistry {
    /// Creates a handle to an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current immutable snapshot.
    pub fn snapshot(&self) -> Arc<Registry> {
        Arc::clone(&self.current.read())
    }

    /// Atomically replaces the published registry.
    pub(crate) fn publish(&self, next: Registry) {
        *self.current.write() = Arc::new(next);
    }
}

impl std::fmt::Debug for SharedRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SharedRegistry")
            .field(&self.snapshot())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::Capabilities;
    use crate::context::CommandContext;
    use crate::plugin::PluginUnit;

    fn name(s: &str) -> Name {
        Name::new(s).unwrap()
    }

    fn handler() -> BoxedHandler {
        Arc::new(|_ctx: CommandContext| async {})
    }

    fn instance(plugin: &str, seq: u64) -> Arc<PluginInstance> {
        let unit = PluginUnit::builder(plugin).build().unwrap();
        Arc::new(PluginInstance::instantiate(unit, &Capabilities::default(), seq).unwrap())
    }

    #[test]
    fn test_register_command_conflict_names_owner() {
        let mut registry = Registry::new();
        registry
            .register_command(&name("riot"), &name("runes"), handler())
            .unwrap();

        let err = registry
            .register_command(&name("lolpros"), &name("runes"), handler())
            .unwrap_err();

        assert_eq!(
            err,
            PluginError::NameConflict {
                command: "runes".into(),
                owner: "riot".into(),
            }
        );
        assert_eq!(registry.owner_of("runes").unwrap(), "riot");
    }

    #[test]
    fn test_same_owner_may_rebind() {
        let mut registry = Registry::new();
        registry
            .register_command(&name("riot"), &name("rank"), handler())
            .unwrap();
        registry
            .register_command(&name("riot"), &name("rank"), handler())
            .unwrap();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unregister_commands_of_is_precise_and_idempotent() {
        let mut registry = Registry::new();
        registry.register_plugin(instance("riot", 0)).unwrap();
        registry.register_plugin(instance("lolpros", 1)).unwrap();
        registry
            .register_command(&name("riot"), &name("runes"), handler())
            .unwrap();
        registry
            .register_command(&name("riot"), &name("rank"), handler())
            .unwrap();
        registry
            .register_command(&name("lolpros"), &name("pros"), handler())
            .unwrap();

        let mut removed = registry.unregister_commands_of("riot");
        removed.sort();
        assert_eq!(removed, vec![name("rank"), name("runes")]);
        assert_eq!(registry.commands_of("lolpros"), vec![&name("pros")]);
        assert!(registry.unregister_commands_of("riot").is_empty());
        registry.check_invariants().unwrap();
    }

    #[test]
    fn test_register_plugin_twice_is_already_loaded() {
        let mut registry = Registry::new();
        registry.register_plugin(instance("riot", 0)).unwrap();
        assert_eq!(
            registry.register_plugin(instance("Riot", 1)).unwrap_err(),
            PluginError::AlreadyLoaded {
                plugin: "riot".into()
            }
        );
    }

    #[test]
    fn test_absent_plugin_is_not_found() {
        let registry = Registry::new();
        assert!(!registry.is_plugin_loaded("riot"));
        assert!(registry.get_plugin("riot").is_none());
    }

    #[test]
    fn test_invariant_check_flags_orphaned_command() {
        let mut registry = Registry::new();
        registry
            .register_command(&name("ghost"), &name("boo"), handler())
            .unwrap();
        assert!(registry.check_invariants().is_err());
    }

    #[test]
    fn test_load_order_follows_sequence() {
        let mut registry = Registry::new();
        registry.register_plugin(instance("second", 5)).unwrap();
        registry.register_plugin(instance("first", 2)).unwrap();

        assert_eq!(registry.plugin_names(), vec![name("first"), name("second")]);
    }

    #[test]
    fn test_snapshot_unaffected_by_later_publish() {
        let shared = SharedRegistry::new();
        let before = shared.snapshot();

        let mut next = (*before).clone();
        next.register_plugin(instance("riot", 0)).unwrap();
        shared.publish(next);

        assert_eq!(before.plugin_count(), 0);
        assert_eq!(shared.snapshot().plugin_count(), 1);
    }
}

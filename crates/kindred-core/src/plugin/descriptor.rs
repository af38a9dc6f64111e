//! Plugin descriptors: the re-invocable definition source of a unit.

use std::borrow::Cow;
use std::sync::Arc;

use super::PluginUnit;
use crate::error::DefinitionError;
use crate::name::normalize;

type UnitFactory = Arc<dyn Fn() -> Result<PluginUnit, DefinitionError> + Send + Sync>;

/// Identifies a plugin and knows how to construct its [`PluginUnit`].
///
/// The [`LifecycleController`](crate::LifecycleController) keeps the
/// descriptor of every plugin loaded through it. Reloading a plugin calls the
/// factory again and swaps the freshly built unit into the registry, so a
/// factory that reads external data picks up changes on reload.
///
/// # Example
///
/// ```rust,ignore
/// pub fn ping() -> PluginDescriptor {
///     PluginDescriptor::new("ping", || {
///         PluginUnit::builder("ping")
///             .command("ping", |ctx: CommandContext| async move { ctx.reply("pong").await })
///             .build()
///     })
/// }
/// ```
#[derive(Clone)]
pub struct PluginDescriptor {
    name: Cow<'static, str>,
    factory: UnitFactory,
}

impl PluginDescriptor {
    /// Creates a descriptor for the plugin called `name`.
    pub fn new<F>(name: impl Into<Cow<'static, str>>, factory: F) -> Self
    where
        F: Fn() -> Result<PluginUnit, DefinitionError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            factory: Arc::new(factory),
        }
    }

    /// The name the descriptor was created with, as given.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Builds a fresh unit from the current definition.
    ///
    /// Fails when the factory fails, or when the unit it produces carries a
    /// different normalized name than the descriptor.
    pub fn resolve(&self) -> Result<PluginUnit, DefinitionError> {
        let unit = (self.factory)()?;
        let expected = normalize(&self.name);
        if unit.name().as_str() != expected {
            return Err(DefinitionError::NameMismatch {
                descriptor: expected,
                unit: unit.name().to_string(),
            });
        }
        Ok(unit)
    }
}

impl std::fmt::Debug for PluginDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginDescriptor")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_builds_fresh_unit() {
        let desc = PluginDescriptor::new("Ping", || PluginUnit::builder("ping").build());
        assert_eq!(desc.resolve().unwrap().name(), "ping");
    }

    #[test]
    fn test_resolve_rejects_renamed_unit() {
        let desc = PluginDescriptor::new("ping", || PluginUnit::builder("pong").build());
        assert!(matches!(
            desc.resolve(),
            Err(DefinitionError::NameMismatch { .. })
        ));
    }
}

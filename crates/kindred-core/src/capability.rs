//! Collaborators handed to plugins.
//!
//! The core knows nothing about game-data services, persistence or the
//! transport. Those are passed in as *capabilities* when the
//! [`LifecycleController`](crate::LifecycleController) and
//! [`Dispatcher`](crate::Dispatcher) are constructed:
//!
//! - an outbound [`MessageSink`] implementing `send(channel, text)`;
//! - any number of typed services, looked up by type with
//!   [`Capabilities::get`];
//! - the raw config section of every plugin, keyed by plugin name.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::BoxError;
use crate::name::normalize;

/// Type alias for the type-erased values stored in the service map.
pub type ServiceArc = Arc<dyn Any + Send + Sync>;

// =============================================================================
// MessageSink
// =============================================================================

/// The outbound message primitive.
#[async_trait]
pub trait MessageSink: Send + Sync {
    /// Sends `text` to `channel`.
    async fn send(&self, channel: &str, text: &str) -> Result<(), BoxError>;
}

/// Shared handle to a [`MessageSink`].
pub type BoxedSink = Arc<dyn MessageSink>;

/// A sink that drops every message. Used when no transport is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

#[async_trait]
impl MessageSink for NullSink {
    async fn send(&self, channel: &str, text: &str) -> Result<(), BoxError> {
        debug!(channel = %channel, len = text.len(), "No outbound transport, message dropped");
        Ok(())
    }
}

// =============================================================================
// Capabilities
// =============================================================================

/// The set of collaborators available to plugins.
///
/// Cheap to clone; all contents are behind `Arc`.
#[derive(Clone)]
pub struct Capabilities {
    sink: BoxedSink,
    services: Arc<HashMap<TypeId, ServiceArc>>,
    plugin_configs: Arc<HashMap<String, Value>>,
}

impl Capabilities {
    /// Starts building a capability set.
    pub fn builder() -> CapabilitiesBuilder {
        CapabilitiesBuilder::default()
    }

    /// Returns the outbound sink.
    pub fn sink(&self) -> &BoxedSink {
        &self.sink
    }

    /// Looks up a service by type.
    pub fn get<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.services
            .get(&TypeId::of::<T>())
            .and_then(|arc| Arc::clone(arc).downcast::<T>().ok())
    }

    /// Returns the raw config section for `plugin`, or an empty object.
    pub fn plugin_config(&self, plugin: &str) -> Value {
        self.plugin_configs
            .get(&normalize(plugin))
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::default()))
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl std::fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capabilities")
            .field("services", &self.services.len())
            .field("plugin_configs", &self.plugin_configs.keys())
            .finish_non_exhaustive()
    }
}

/// Builder for [`Capabilities`].
#[derive(Default)]
pub struct CapabilitiesBuilder {
    sink: Option<BoxedSink>,
    services: HashMap<TypeId, ServiceArc>,
    plugin_configs: HashMap<String, Value>,
}

impl CapabilitiesBuilder {
    /// Sets the outbound sink. Defaults to [`NullSink`].
    pub fn sink(mut self, sink: BoxedSink) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Registers a typed service. A later registration of the same type
    /// replaces the earlier one.
    pub fn provide<T: Send + Sync + 'static>(mut self, service: Arc<T>) -> Self {
        self.services.insert(TypeId::of::<T>(), service);
        self
    }

    /// Sets the config section for one plugin.
    pub fn plugin_config(mut self, plugin: &str, config: Value) -> Self {
        self.plugin_configs.insert(normalize(plugin), config);
        self
    }

    /// Sets every plugin config section at once.
    pub fn plugin_configs(mut self, configs: HashMap<String, Value>) -> Self {
        for (name, config) in configs {
            self.plugin_configs.insert(normalize(&name), config);
        }
        self
    }

    /// Finishes the capability set.
    pub fn build(self) -> Capabilities {
        Capabilities {
            sink: self.sink.unwrap_or_else(|| Arc::new(NullSink)),
            services: Arc::new(self.services),
            plugin_configs: Arc::new(self.plugin_configs),
        }
    }
}

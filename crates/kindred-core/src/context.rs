//! Contexts handed to handlers and hooks.
//!
//! - [`CommandContext`]: built by the dispatcher for one command
//!   invocation. Carries the event, the matched command, the owning plugin's
//!   state and the shared [`Capabilities`].
//! - [`HookContext`]: built by the lifecycle controller for `on_load`,
//!   `on_unload` and `on_ready`.
//!
//! Both give access to the plugin's own state value (created once per
//! [`PluginInstance`](crate::plugin::PluginInstance)) by type, and to the
//! plugin's config section.

use std::any::Any;
use std::sync::Arc;

use crate::capability::Capabilities;
use crate::error::BoxError;
use crate::event::ChatEvent;
use crate::name::Name;

/// Type-erased per-instance plugin state.
pub type StateArc = Arc<dyn Any + Send + Sync>;

fn downcast_state<T: Send + Sync + 'static>(state: Option<&StateArc>) -> Option<Arc<T>> {
    state.and_then(|s| Arc::clone(s).downcast::<T>().ok())
}

// =============================================================================
// CommandContext
// =============================================================================

/// The context object passed to command handlers.
///
/// # Example
///
/// ```rust,ignore
/// async fn echo(ctx: CommandContext) -> Result<(), BoxError> {
///     let rest: Vec<&str> = ctx.args().collect();
///     ctx.reply(&rest.join(" ")).await
/// }
/// ```
#[derive(Clone)]
pub struct CommandContext {
    event: Arc<ChatEvent>,
    command: Name,
    plugin: Name,
    state: Option<StateArc>,
    capabilities: Capabilities,
}

impl CommandContext {
    pub(crate) fn new(
        event: Arc<ChatEvent>,
        command: Name,
        plugin: Name,
        state: Option<StateArc>,
        capabilities: Capabilities,
    ) -> Self {
        Self {
            event,
            command,
            plugin,
            state,
            capabilities,
        }
    }

    /// Returns the event that triggered this invocation.
    pub fn event(&self) -> &ChatEvent {
        &self.event
    }

    /// Login of the message author.
    pub fn sender(&self) -> &str {
        &self.event.sender
    }

    /// Channel the message was posted to.
    pub fn channel(&self) -> &str {
        &self.event.channel
    }

    /// Full message text, sigil and command token included.
    pub fn text(&self) -> &str {
        &self.event.text
    }

    /// The normalized command name that was matched.
    pub fn command(&self) -> &str {
        self.command.as_str()
    }

    /// Whitespace-separated tokens following the command token.
    pub fn args(&self) -> impl Iterator<Item = &str> {
        self.event.text.split_whitespace().skip(1)
    }

    /// Text following the command token, with surrounding whitespace removed.
    pub fn rest(&self) -> &str {
        let text = self.event.text.trim_start();
        match text.find(char::is_whitespace) {
            Some(idx) => text[idx..].trim(),
            None => "",
        }
    }

    /// Name of the plugin that owns the command.
    pub fn plugin_name(&self) -> &str {
        self.plugin.as_str()
    }

    /// Returns the owning plugin's state if it is of type `T`.
    pub fn state<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        downcast_state(self.state.as_ref())
    }

    /// Returns the shared capabilities.
    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Looks up a service by type.
    pub fn service<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.capabilities.get::<T>()
    }

    /// Deserializes the owning plugin's config section into `T`.
    pub fn config<T: serde::de::DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_value(self.capabilities.plugin_config(self.plugin.as_str()))
    }

    /// Sends `text` to `channel` through the outbound sink.
    pub async fn send(&self, channel: &str, text: &str) -> Result<(), BoxError> {
        self.capabilities.sink().send(channel, text).await
    }

    /// Replies in the originating channel, mentioning the sender.
    pub async fn reply(&self, text: &str) -> Result<(), BoxError> {
        let message = format!("@{}, {}", self.event.sender, text);
        self.send(&self.event.channel, &message).await
    }
}

impl std::fmt::Debug for CommandContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandContext")
            .field("event", &self.event)
            .field("command", &self.command)
            .field("plugin", &self.plugin)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// HookContext
// =============================================================================

/// The context passed to lifecycle hooks.
#[derive(Clone)]
pub struct HookContext {
    plugin: Name,
    state: Option<StateArc>,
    capabilities: Capabilities,
}

impl HookContext {
    pub(crate) fn new(plugin: Name, state: Option<StateArc>, capabilities: Capabilities) -> Self {
        Self {
            plugin,
            state,
            capabilities,
        }
    }

    /// Name of the plugin the hook belongs to.
    pub fn plugin_name(&self) -> &str {
        self.plugin.as_str()
    }

    /// Returns the plugin's state if it is of type `T`.
    pub fn state<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        downcast_state(self.state.as_ref())
    }

    /// Returns the shared capabilities.
    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Looks up a service by type.
    pub fn service<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.capabilities.get::<T>()
    }

    /// Deserializes the plugin's config section into `T`.
    ///
    /// Use `#[serde(default)]` on `T` to tolerate a missing section.
    pub fn config<T: serde::de::DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_value(self.capabilities.plugin_config(self.plugin.as_str()))
    }

    /// Sends `text` to `channel` through the outbound sink.
    pub async fn send(&self, channel: &str, text: &str) -> Result<(), BoxError> {
        self.capabilities.sink().send(channel, text).await
    }
}

impl std::fmt::Debug for HookContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookContext")
            .field("plugin", &self.plugin)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(text: &str) -> CommandContext {
        CommandContext::new(
            Arc::new(ChatEvent::new("viewer", "#stream", text)),
            Name::new("echo").unwrap(),
            Name::new("echo").unwrap(),
            Some(Arc::new(7_u32)),
            Capabilities::default(),
        )
    }

    #[test]
    fn test_args_skip_command_token() {
        let ctx = ctx("!echo  hello   world");
        assert_eq!(ctx.args().collect::<Vec<_>>(), vec!["hello", "world"]);
        assert_eq!(ctx.rest(), "hello   world");
    }

    #[test]
    fn test_rest_empty_without_arguments() {
        assert_eq!(ctx("!echo").rest(), "");
    }

    #[test]
    fn test_state_downcast() {
        let ctx = ctx("!echo");
        assert_eq!(*ctx.state::<u32>().unwrap(), 7);
        assert!(ctx.state::<String>().is_none());
    }

    #[test]
    fn test_reply_without_transport_succeeds() {
        let ctx = ctx("!echo hi");
        tokio_test::block_on(async {
            ctx.reply("hi").await.unwrap();
        });
    }

    #[test]
    fn test_config_defaults_when_section_missing() {
        #[derive(serde::Deserialize, Default)]
        #[serde(default)]
        struct EchoConfig {
            prefix: String,
        }

        let config: EchoConfig = ctx("!echo").config().unwrap();
        assert!(config.prefix.is_empty());
    }
}

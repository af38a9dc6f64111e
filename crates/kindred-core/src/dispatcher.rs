//! Command dispatch.
//!
//! [`Dispatcher::dispatch`] maps one [`ChatEvent`] to at most one handler
//! invocation:
//!
//! 1. drop events from ignored senders;
//! 2. take the first whitespace token and require the sigil prefix;
//! 3. strip the sigil and normalize to get the command name;
//! 4. look the name up in the current registry snapshot;
//! 5. run the bound handler to completion, containing any failure.
//!
//! No lock is held while the handler runs, so a handler may drive the
//! lifecycle controller (e.g. an admin `!reload`).

use std::sync::Arc;

use tracing::{Instrument, debug, error, info_span};

use crate::capability::Capabilities;
use crate::context::CommandContext;
use crate::event::ChatEvent;
use crate::handler::contain;
use crate::name::{Name, normalize};
use crate::registry::SharedRegistry;

/// Dispatcher settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Prefix marking a message as a command invocation.
    pub sigil: String,
    /// Senders whose messages are never dispatched (other bots, typically).
    pub ignored_senders: Vec<String>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            sigil: "!".to_string(),
            ignored_senders: Vec::new(),
        }
    }
}

/// What happened to one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The text does not start with the sigil, or is empty.
    NotCommand,
    /// The sender is on the ignore list.
    Ignored,
    /// The command token names no registered command.
    UnknownCommand,
    /// The handler ran to completion.
    Handled {
        /// Normalized command name.
        command: Name,
        /// Owning plugin.
        plugin: Name,
    },
    /// The handler returned an error or panicked. Already logged.
    Failed {
        /// Normalized command name.
        command: Name,
        /// Owning plugin.
        plugin: Name,
    },
}

/// Routes chat events to command handlers.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: SharedRegistry,
    capabilities: Capabilities,
    sigil: String,
    ignored: Vec<String>,
}

impl Dispatcher {
    /// Creates a dispatcher reading from `registry`.
    pub fn new(registry: SharedRegistry, capabilities: Capabilities, config: DispatchConfig) -> Self {
        Self {
            registry,
            capabilities,
            sigil: config.sigil,
            ignored: config.ignored_senders.iter().map(|s| normalize(s)).collect(),
        }
    }

    /// The command sigil.
    pub fn sigil(&self) -> &str {
        &self.sigil
    }

    /// Extracts the normalized command name from `text`, if it is a command.
    pub fn command_name(&self, text: &str) -> Option<String> {
        let token = text.split_whitespace().next()?;
        let name = normalize(token.strip_prefix(self.sigil.as_str())?);
        (!name.is_empty()).then_some(name)
    }

    /// Dispatches one event. Never fails; handler errors are logged and
    /// reported as [`DispatchOutcome::Failed`].
    pub async fn dispatch(&self, event: &ChatEvent) -> DispatchOutcome {
        if self.ignored.contains(&normalize(&event.sender)) {
            debug!(sender = %event.sender, "Ignoring message from ignored sender");
            return DispatchOutcome::Ignored;
        }

        let Some(candidate) = self.command_name(&event.text) else {
            return DispatchOutcome::NotCommand;
        };

        let (handler, command, plugin, state) = {
            let snapshot = self.registry.snapshot();
            let Some(entry) = snapshot.command(&candidate) else {
                debug!(command = %candidate, sender = %event.sender, "Unknown command");
                return DispatchOutcome::UnknownCommand;
            };
            let state = snapshot.get_plugin(entry.owner.as_str()).and_then(|p| p.state());
            (
                Arc::clone(entry.handler),
                entry.name.clone(),
                entry.owner.clone(),
                state,
            )
        };

        let ctx = CommandContext::new(
            Arc::new(event.clone()),
            command.clone(),
            plugin.clone(),
            state,
            self.capabilities.clone(),
        );

        let span = info_span!(
            "dispatch",
            command = %command,
            plugin = %plugin,
            sender = %event.sender,
            channel = %event.channel,
        );
        debug!(parent: &span, "Invoking command handler");

        match contain(handler.call(ctx)).instrument(span).await {
            Ok(()) => DispatchOutcome::Handled { command, plugin },
            Err(error) => {
                error!(
                    plugin = %plugin,
                    command = %command,
                    %error,
                    "Command handler failed"
                );
                DispatchOutcome::Failed { command, plugin }
            }
        }
    }
}

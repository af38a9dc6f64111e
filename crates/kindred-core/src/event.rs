//! The normalized event shape every ingress produces.

use serde::{Deserialize, Serialize};

/// One logical chat message, as delivered by an ingress.
///
/// IRC lines and webhook bodies are both reduced to this shape before they
/// reach the [`Dispatcher`](crate::Dispatcher).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatEvent {
    /// Login of the user who sent the message.
    pub sender: String,
    /// Channel the message was posted to (e.g. `#somechannel`).
    pub channel: String,
    /// Full message text.
    pub text: String,
}

impl ChatEvent {
    /// Creates a new chat event.
    pub fn new(
        sender: impl Into<String>,
        channel: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            sender: sender.into(),
            channel: channel.into(),
            text: text.into(),
        }
    }
}

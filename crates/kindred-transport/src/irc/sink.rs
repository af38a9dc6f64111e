//! Outbound IRC message sink.

use async_trait::async_trait;
use kindred_core::{BoxError, MessageSink};
use tokio::sync::mpsc;

use super::line::format_privmsg;
use crate::error::TransportError;

/// Outbound sink that queues `PRIVMSG` lines for the IRC session.
///
/// The queue outlives individual connections, so messages sent while the
/// session is reconnecting are written once it is back.
#[derive(Debug, Clone)]
pub struct IrcSink {
    tx: mpsc::Sender<String>,
}

impl IrcSink {
    /// Creates a sink and the receiving end to hand to [`run_irc`](super::run_irc).
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl MessageSink for IrcSink {
    async fn send(&self, channel: &str, text: &str) -> Result<(), BoxError> {
        self.tx
            .send(format_privmsg(channel, text))
            .await
            .map_err(|_| TransportError::SendFailed("IRC session is gone".to_string()))?;
        Ok(())
    }
}

//! # Kindred Transport
//!
//! Event ingress and outbound sinks for the Kindred chat bot framework.
//!
//! Every ingress reduces what it receives to a [`ChatEvent`](kindred_core::ChatEvent)
//! and pushes it into a `tokio::sync::mpsc` channel; the runtime drains
//! that channel into the dispatcher one event at a time.
//!
//! ## Features
//!
//! - `irc` (default): IRC client session over TCP or TLS, plus [`IrcSink`]
//! - `webhook` (default): EventSub-style webhook route served with axum
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  ChatEvent  ┌──────────────┐        ┌────────────┐
//! │ IRC session  │────────────▶│              │        │            │
//! ├──────────────┤             │ mpsc channel │───────▶│ Dispatcher │
//! │ Webhook POST │────────────▶│              │        │            │
//! └──────────────┘             └──────────────┘        └─────┬──────┘
//!        ▲                                                   │ reply
//!        └──────────────────── IrcSink ◀─────────────────────┘
//! ```

mod channel;
pub mod error;

#[cfg(feature = "irc")]
pub mod irc;

#[cfg(feature = "webhook")]
pub mod webhook;

pub use channel::channel_name;
pub use error::{TransportError, TransportResult};

#[cfg(feature = "irc")]
pub use irc::{IrcConnectOptions, IrcSession, IrcSink, RetryPolicy, run_irc};

#[cfg(feature = "webhook")]
pub use webhook::{WebhookPayload, parse_webhook, serve_webhook, webhook_router};

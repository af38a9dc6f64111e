//! EventSub-style webhook ingress.
//!
//! The platform POSTs JSON bodies to one path, with the kind of message in
//! the `Twitch-Eventsub-Message-Type` header:
//!
//! | message type | handling |
//! |--------------|----------|
//! | `webhook_callback_verification` | answer `200` with the `challenge` string |
//! | `notification` | `channel.chat.message` events become [`ChatEvent`]s |
//! | `revocation` | logged at warn |
//!
//! Signature verification is not performed; expose the route behind a
//! proxy that does it, or on a private network.

use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
};
use kindred_core::ChatEvent;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::channel::channel_name;
use crate::error::{TransportError, TransportResult};

/// Header carrying the message type.
pub const MESSAGE_TYPE_HEADER: &str = "Twitch-Eventsub-Message-Type";

/// Subscription type carrying chat messages.
pub const CHAT_MESSAGE: &str = "channel.chat.message";

// =============================================================================
// Payload
// =============================================================================

#[derive(Debug, Deserialize)]
struct Subscription {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VerificationBody {
    challenge: String,
}

#[derive(Debug, Deserialize)]
struct NotificationBody {
    subscription: Subscription,
    #[serde(default)]
    event: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ChatMessageEvent {
    broadcaster_user_login: String,
    chatter_user_login: String,
    message: ChatMessageText,
}

#[derive(Debug, Deserialize)]
struct ChatMessageText {
    text: String,
}

#[derive(Debug, Deserialize)]
struct RevocationBody {
    subscription: Subscription,
}

/// A parsed webhook request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookPayload {
    /// Subscription handshake; the challenge must be echoed back.
    Verification {
        /// The string to return verbatim.
        challenge: String,
    },
    /// A chat message.
    Chat(ChatEvent),
    /// A notification of a subscription type this ingress does not handle.
    Notification {
        /// The subscription type.
        subscription_type: String,
    },
    /// The platform revoked a subscription.
    Revocation {
        /// The subscription type.
        subscription_type: String,
        /// Why it was revoked.
        status: Option<String>,
    },
}

fn invalid(e: serde_json::Error) -> TransportError {
    TransportError::InvalidPayload(e.to_string())
}

/// Parses a webhook body according to its message type.
pub fn parse_webhook(message_type: &str, body: &[u8]) -> TransportResult<WebhookPayload> {
    match message_type {
        "webhook_callback_verification" => {
            let body: VerificationBody = serde_json::from_slice(body).map_err(invalid)?;
            Ok(WebhookPayload::Verification {
                challenge: body.challenge,
            })
        }
        "notification" => {
            let body: NotificationBody = serde_json::from_slice(body).map_err(invalid)?;
            if body.subscription.kind != CHAT_MESSAGE {
                return Ok(WebhookPayload::Notification {
                    subscription_type: body.subscription.kind,
                });
            }
            let event: ChatMessageEvent = serde_json::from_value(body.event).map_err(invalid)?;
            Ok(WebhookPayload::Chat(ChatEvent::new(
                event.chatter_user_login,
                channel_name(&event.broadcaster_user_login),
                event.message.text,
            )))
        }
        "revocation" => {
            let body: RevocationBody = serde_json::from_slice(body).map_err(invalid)?;
            Ok(WebhookPayload::Revocation {
                subscription_type: body.subscription.kind,
                status: body.subscription.status,
            })
        }
        other => Err(TransportError::InvalidPayload(format!(
            "unknown message type '{other}'"
        ))),
    }
}

// =============================================================================
// Server
// =============================================================================

/// Builds the router serving the webhook at `path`. Chat events are sent to
/// `events`.
pub fn webhook_router(path: &str, events: mpsc::Sender<ChatEvent>) -> Router {
    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    };
    Router::new()
        .route(&path, post(webhook_handler))
        .with_state(events)
}

async fn webhook_handler(
    State(events): State<mpsc::Sender<ChatEvent>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(message_type) = headers
        .get(MESSAGE_TYPE_HEADER)
        .and_then(|v| v.to_str().ok())
    else {
        return (StatusCode::BAD_REQUEST, "missing message type").into_response();
    };
    trace!(message_type = %message_type, len = body.len(), "Received webhook POST");

    match parse_webhook(message_type, &body) {
        Ok(WebhookPayload::Verification { challenge }) => {
            info!("Webhook subscription verified");
            (StatusCode::OK, challenge).into_response()
        }
        Ok(WebhookPayload::Chat(event)) => {
            if events.send(event).await.is_err() {
                return StatusCode::SERVICE_UNAVAILABLE.into_response();
            }
            StatusCode::NO_CONTENT.into_response()
        }
        Ok(WebhookPayload::Notification { subscription_type }) => {
            debug!(subscription_type = %subscription_type, "Unhandled webhook notification");
            StatusCode::NO_CONTENT.into_response()
        }
        Ok(WebhookPayload::Revocation {
            subscription_type,
            status,
        }) => {
            warn!(subscription_type = %subscription_type, status = ?status, "Webhook subscription revoked");
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => {
            warn!(error = %e, "Rejected webhook payload");
            (StatusCode::BAD_REQUEST, e.to_string()).into_response()
        }
    }
}

/// Serves the webhook on `bind` until `shutdown` is cancelled.
pub async fn serve_webhook(
    bind: &str,
    path: &str,
    events: mpsc::Sender<ChatEvent>,
    shutdown: CancellationToken,
) -> TransportResult<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    let actual_addr = listener.local_addr()?;
    info!(addr = %actual_addr, path = %path, "Webhook server listening");

    axum::serve(listener, webhook_router(path, events))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("Webhook server shut down");
    Ok(())
}

//! IRC client session.
//!
//! One [`IrcSession`] is one connection: TCP, optionally upgraded to TLS,
//! framed into lines. [`run_irc`] drives sessions in a reconnect loop with
//! exponential backoff until shutdown.

use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use kindred_core::ChatEvent;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_util::codec::{Framed, LinesCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::line::{IrcLine, format_pong, parse_line};
use crate::channel::channel_name;
use crate::error::{TransportError, TransportResult};

/// Longest accepted inbound line. Tagged lines can get long.
const MAX_LINE_LENGTH: usize = 16 * 1024;

/// Chat events held by a session while the event queue is full. Newer
/// messages are dropped beyond this.
const MAX_PENDING_EVENTS: usize = 1024;

// =============================================================================
// Options
// =============================================================================

/// Reconnection policy.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Whether to reconnect after the connection drops.
    pub auto_reconnect: bool,
    /// Maximum number of consecutive failed attempts (None = infinite).
    pub max_retries: Option<u32>,
    /// Initial delay between reconnection attempts.
    pub initial_delay: Duration,
    /// Maximum delay between reconnection attempts.
    pub max_delay: Duration,
    /// Backoff multiplier.
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            auto_reconnect: true,
            max_retries: None,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
        }
    }
}

/// Where and how to connect.
#[derive(Clone)]
pub struct IrcConnectOptions {
    /// Server host name.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Upgrade the connection to TLS.
    pub tls: bool,
    /// Bot login.
    pub nick: String,
    /// Password sent with `PASS` (e.g. `oauth:…`).
    pub token: Option<String>,
    /// Channels to join.
    pub channels: Vec<String>,
    /// Reconnection policy.
    pub retry: RetryPolicy,
}

impl std::fmt::Debug for IrcConnectOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IrcConnectOptions")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("tls", &self.tls)
            .field("nick", &self.nick)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("channels", &self.channels)
            .finish()
    }
}

// =============================================================================
// Stream
// =============================================================================

/// Plain or TLS connection to the server.
enum IrcStream {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl AsyncRead for IrcStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            IrcStream::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            IrcStream::Tls(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for IrcStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            IrcStream::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            IrcStream::Tls(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            IrcStream::Plain(stream) => Pin::new(stream).poll_flush(cx),
            IrcStream::Tls(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            IrcStream::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            IrcStream::Tls(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

/// Builds a TLS connector trusting the platform's root certificates.
fn tls_connector() -> TlsConnector {
    let mut roots = RootCertStore::empty();
    let native = rustls_native_certs::load_native_certs();
    for e in &native.errors {
        warn!(error = %e, "Error loading native certs");
    }
    for cert in native.certs {
        if let Err(e) = roots.add(cert) {
            warn!(error = %e, "Failed to add root cert");
        }
    }
    let config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    TlsConnector::from(Arc::new(config))
}

// =============================================================================
// Session
// =============================================================================

/// One live connection to the chat server.
pub struct IrcSession {
    framed: Framed<IrcStream, LinesCodec>,
    nick: String,
}

impl IrcSession {
    /// Connects, upgrades to TLS if requested, and performs the login
    /// handshake (`PASS`, `NICK`, `JOIN`).
    pub async fn connect(options: &IrcConnectOptions) -> TransportResult<Self> {
        if options.host.trim().is_empty() {
            return Err(TransportError::InvalidConfig("IRC host is empty".to_string()));
        }
        if options.nick.trim().is_empty() {
            return Err(TransportError::InvalidConfig("IRC nick is empty".to_string()));
        }
        let addr = format!("{}:{}", options.host, options.port);
        info!(addr = %addr, tls = options.tls, "Connecting to IRC server");

        let tcp = TcpStream::connect((options.host.as_str(), options.port))
            .await
            .map_err(|e| TransportError::ConnectionFailed {
                addr: addr.clone(),
                reason: e.to_string(),
            })?;

        let stream = if options.tls {
            let server_name = ServerName::try_from(options.host.clone())
                .map_err(|e| TransportError::InvalidConfig(format!("invalid server name: {e}")))?;
            let tls = tls_connector()
                .connect(server_name, tcp)
                .await
                .map_err(|e| TransportError::Tls(e.to_string()))?;
            IrcStream::Tls(Box::new(tls))
        } else {
            IrcStream::Plain(tcp)
        };

        let mut session = Self {
            framed: Framed::new(stream, LinesCodec::new_with_max_length(MAX_LINE_LENGTH)),
            nick: options.nick.to_lowercase(),
        };
        session.handshake(options).await?;
        info!(addr = %addr, nick = %options.nick, channels = ?options.channels, "IRC session established");
        Ok(session)
    }

    async fn handshake(&mut self, options: &IrcConnectOptions) -> TransportResult<()> {
        if let Some(token) = &options.token {
            self.write(&format!("PASS {token}")).await?;
        }
        self.write(&format!("NICK {}", options.nick)).await?;
        for channel in &options.channels {
            self.write(&format!("JOIN {}", channel_name(channel))).await?;
        }
        Ok(())
    }

    async fn write(&mut self, line: &str) -> TransportResult<()> {
        trace!(line = %line, "IRC send");
        // LinesCodec terminates with "\n"; IRC wants "\r\n".
        self.framed
            .send(format!("{line}\r"))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    /// Runs the session until shutdown or disconnect.
    ///
    /// Inbound chat messages are forwarded to `events` in arrival order;
    /// `PING` is answered directly and the bot's own messages are dropped.
    /// Lines queued on `outbound` are written as they arrive.
    ///
    /// A full `events` queue never stalls the connection: messages wait in a
    /// bounded backlog while `PING` and `outbound` keep being served.
    ///
    /// Returns `Ok(())` on shutdown (token cancelled, or either channel
    /// closed) and an error when the connection is lost.
    pub async fn run(
        &mut self,
        outbound: &mut mpsc::Receiver<String>,
        events: &mpsc::Sender<ChatEvent>,
        shutdown: &CancellationToken,
    ) -> TransportResult<()> {
        let mut pending: VecDeque<ChatEvent> = VecDeque::new();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!(dropped = pending.len(), "IRC session shutting down");
                    let _ = self.write("QUIT").await;
                    return Ok(());
                }

                permit = events.reserve(), if !pending.is_empty() => {
                    let Ok(permit) = permit else {
                        debug!("Event receiver closed");
                        return Ok(());
                    };
                    if let Some(event) = pending.pop_front() {
                        permit.send(event);
                    }
                }

                line = outbound.recv() => {
                    let Some(line) = line else {
                        debug!("Outbound queue closed");
                        return Ok(());
                    };
                    self.write(&line).await?;
                }

                inbound = self.framed.next() => {
                    let line = match inbound {
                        Some(Ok(line)) => line,
                        Some(Err(e)) => return Err(TransportError::Io(e.to_string())),
                        None => {
                            return Err(TransportError::ConnectionClosed {
                                reason: "server closed the connection".to_string(),
                            });
                        }
                    };
                    match parse_line(&line) {
                        Some(IrcLine::Ping(token)) => self.write(&format_pong(&token)).await?,
                        Some(IrcLine::Privmsg(event)) => {
                            if event.sender.eq_ignore_ascii_case(&self.nick) {
                                continue;
                            }
                            trace!(sender = %event.sender, channel = %event.channel, "IRC message");
                            if !Self::forward(event, events, &mut pending) {
                                debug!("Event receiver closed");
                                return Ok(());
                            }
                        }
                        None => trace!(line = %line, "IRC line ignored"),
                    }
                }
            }
        }
    }

    /// Hands `event` to the event queue, or parks it behind earlier
    /// backlog. Returns `false` once the receiver is gone.
    fn forward(
        event: ChatEvent,
        events: &mpsc::Sender<ChatEvent>,
        pending: &mut VecDeque<ChatEvent>,
    ) -> bool {
        if pending.is_empty() {
            match events.try_send(event) {
                Ok(()) => return true,
                Err(mpsc::error::TrySendError::Closed(_)) => return false,
                Err(mpsc::error::TrySendError::Full(event)) => pending.push_back(event),
            }
        } else if pending.len() < MAX_PENDING_EVENTS {
            pending.push_back(event);
        } else {
            warn!(sender = %event.sender, channel = %event.channel, "Event backlog full, message dropped");
        }
        true
    }
}

/// Connects and runs sessions until `shutdown`, reconnecting with
/// exponential backoff per `options.retry`.
pub async fn run_irc(
    options: IrcConnectOptions,
    mut outbound: mpsc::Receiver<String>,
    events: mpsc::Sender<ChatEvent>,
    shutdown: CancellationToken,
) -> TransportResult<()> {
    let policy = options.retry.clone();
    let mut retry_count = 0u32;
    let mut current_delay = policy.initial_delay;

    loop {
        let connected = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            result = IrcSession::connect(&options) => result,
        };
        let result = match connected {
            Ok(mut session) => {
                retry_count = 0;
                current_delay = policy.initial_delay;
                session.run(&mut outbound, &events, &shutdown).await
            }
            Err(e) => Err(e),
        };

        let error = match result {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };
        if matches!(error, TransportError::InvalidConfig(_)) {
            error!(error = %error, "IRC ingress misconfigured");
            return Err(error);
        }
        warn!(error = %error, "IRC connection lost");

        if !policy.auto_reconnect {
            return Err(error);
        }
        if let Some(max) = policy.max_retries
            && retry_count >= max
        {
            error!("Max retries reached, giving up");
            return Err(error);
        }

        warn!(delay = ?current_delay, "Reconnecting...");
        tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            _ = tokio::time::sleep(current_delay) => {}
        }
        retry_count += 1;
        current_delay = std::cmp::min(
            Duration::from_secs_f64(current_delay.as_secs_f64() * policy.backoff_multiplier),
            policy.max_delay,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::irc::line::format_privmsg;
    use tokio::net::TcpListener;

    fn options(port: u16) -> IrcConnectOptions {
        IrcConnectOptions {
            host: "127.0.0.1".to_string(),
            port,
            tls: false,
            nick: "Kindred".to_string(),
            token: Some("oauth:secret".to_string()),
            channels: vec!["Stream".to_string()],
            retry: RetryPolicy::default(),
        }
    }

    #[tokio::test]
    async fn test_session_handshake_ping_and_messages() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut framed = Framed::new(stream, LinesCodec::new());
            let mut received = Vec::new();
            for _ in 0..3 {
                received.push(framed.next().await.unwrap().unwrap());
            }
            framed.send("PING :tmi.twitch.tv").await.unwrap();
            framed
                .send(":kindred!kindred@kindred PRIVMSG #stream :my own echo")
                .await
                .unwrap();
            framed
                .send(":viewer!viewer@viewer PRIVMSG #stream :!runes")
                .await
                .unwrap();
            for _ in 0..2 {
                received.push(framed.next().await.unwrap().unwrap());
            }
            (received, framed)
        });

        let (out_tx, mut out_rx) = mpsc::channel(8);
        let (ev_tx, mut ev_rx) = mpsc::channel(8);
        let shutdown = CancellationToken::new();

        let mut session = IrcSession::connect(&options(port)).await.unwrap();
        let token = shutdown.clone();
        let client =
            tokio::spawn(async move { session.run(&mut out_rx, &ev_tx, &token).await });

        let event = ev_rx.recv().await.unwrap();
        assert_eq!(event, ChatEvent::new("viewer", "#stream", "!runes"));
        out_tx
            .send(format_privmsg("#stream", "@viewer, hi"))
            .await
            .unwrap();

        let (received, _framed) = server.await.unwrap();
        assert_eq!(
            received,
            vec![
                "PASS oauth:secret",
                "NICK Kindred",
                "JOIN #stream",
                "PONG :tmi.twitch.tv",
                "PRIVMSG #stream :@viewer, hi",
            ]
        );

        shutdown.cancel();
        assert!(client.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_full_event_queue_keeps_pong_and_outbound_flowing() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut framed = Framed::new(stream, LinesCodec::new());
            for _ in 0..3 {
                framed.next().await.unwrap().unwrap();
            }
            for text in ["!one", "!two", "!three"] {
                framed
                    .send(format!(":viewer!viewer@viewer PRIVMSG #stream :{text}"))
                    .await
                    .unwrap();
            }
            framed.send("PING :tmi.twitch.tv").await.unwrap();
            let mut received = Vec::new();
            for _ in 0..3 {
                received.push(framed.next().await.unwrap().unwrap());
            }
            (received, framed)
        });

        let (out_tx, mut out_rx) = mpsc::channel(1);
        let (ev_tx, mut ev_rx) = mpsc::channel(1);
        let shutdown = CancellationToken::new();

        let mut session = IrcSession::connect(&options(port)).await.unwrap();
        let token = shutdown.clone();
        let client =
            tokio::spawn(async move { session.run(&mut out_rx, &ev_tx, &token).await });

        let wait = Duration::from_secs(2);
        for text in ["first", "second"] {
            tokio::time::timeout(wait, out_tx.send(format_privmsg("#stream", text)))
                .await
                .unwrap()
                .unwrap();
        }

        let (mut received, _framed) = tokio::time::timeout(wait, server).await.unwrap().unwrap();
        received.sort();
        assert_eq!(
            received,
            vec![
                "PONG :tmi.twitch.tv",
                "PRIVMSG #stream :first",
                "PRIVMSG #stream :second",
            ]
        );

        let mut texts = Vec::new();
        for _ in 0..3 {
            texts.push(ev_rx.recv().await.unwrap().text);
        }
        assert_eq!(texts, vec!["!one", "!two", "!three"]);

        shutdown.cancel();
        assert!(client.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_empty_nick_is_invalid_config_and_not_retried() {
        let mut options = options(6667);
        options.nick = "  ".to_string();
        let (_out_tx, out_rx) = mpsc::channel(1);
        let (ev_tx, _ev_rx) = mpsc::channel(1);

        let result = run_irc(options, out_rx, ev_tx, CancellationToken::new()).await;
        assert!(matches!(result, Err(TransportError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_connect_refused_is_connection_failed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = IrcSession::connect(&options(port)).await;
        assert!(matches!(result, Err(TransportError::ConnectionFailed { .. })));
    }

    #[tokio::test]
    async fn test_run_irc_gives_up_without_reconnect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut options = options(port);
        options.retry.auto_reconnect = false;
        let (_out_tx, out_rx) = mpsc::channel(1);
        let (ev_tx, _ev_rx) = mpsc::channel(1);

        let result = run_irc(options, out_rx, ev_tx, CancellationToken::new()).await;
        assert!(result.is_err());
    }
}

//! Configuration schema definitions.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
#[cfg(feature = "irc")]
use std::time::Duration;

use kindred_core::DispatchConfig;
use serde::{Deserialize, Serialize};

/// Root configuration structure.
///
/// ```toml
/// admins = ["streamer"]
///
/// [logging]
/// level = "debug"
///
/// [dispatch]
/// sigil = "!"
/// ignored_senders = ["nightbot"]
///
/// [irc]
/// enabled = true
/// nick = "kindredbot"
/// token = "oauth:..."
/// channels = ["#streamer"]
///
/// [plugins.runes]
/// region = "euw1"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct KindredConfig {
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Command parsing settings.
    #[serde(default)]
    pub dispatch: DispatchSection,

    /// IRC ingress.
    #[serde(default)]
    pub irc: IrcConfig,

    /// Webhook ingress.
    #[serde(default)]
    pub webhook: WebhookConfig,

    /// Senders allowed to use the `plugins` admin commands.
    #[serde(default)]
    pub admins: Vec<String>,

    /// Free-form per-plugin sections, keyed by plugin name.
    #[serde(default)]
    pub plugins: HashMap<String, serde_json::Value>,
}

// =============================================================================
// Logging
// =============================================================================

/// Log verbosity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Returns the level as a filter directive string.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// Converts to a `tracing` level.
    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output format of the fmt layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
}

/// Where log lines go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Base level, overridden by `RUST_LOG` when set.
    #[serde(default)]
    pub level: LogLevel,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default)]
    pub output: LogOutput,

    /// Log file, required when `output = "file"`.
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    /// Include thread ids.
    #[serde(default)]
    pub thread_ids: bool,

    /// Include file and line of the call site.
    #[serde(default)]
    pub file_location: bool,

    /// Per-module levels, e.g. `kindred_transport = "debug"`.
    #[serde(default)]
    pub filters: HashMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Compact,
            output: LogOutput::Stdout,
            file_path: None,
            thread_ids: false,
            file_location: false,
            filters: HashMap::new(),
        }
    }
}

// =============================================================================
// Dispatch
// =============================================================================

/// Command parsing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchSection {
    /// Prefix marking a command token.
    #[serde(default = "default_sigil")]
    pub sigil: String,

    /// Senders whose messages are never dispatched.
    #[serde(default = "default_ignored_senders")]
    pub ignored_senders: Vec<String>,

    /// Capacity of the ingress queue.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for DispatchSection {
    fn default() -> Self {
        Self {
            sigil: default_sigil(),
            ignored_senders: default_ignored_senders(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl DispatchSection {
    /// Converts to the dispatcher's settings.
    pub fn to_dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            sigil: self.sigil.clone(),
            ignored_senders: self.ignored_senders.clone(),
        }
    }
}

fn default_sigil() -> String {
    "!".to_string()
}

fn default_ignored_senders() -> Vec<String> {
    vec!["nightbot".to_string()]
}

fn default_queue_capacity() -> usize {
    256
}

// =============================================================================
// Ingress
// =============================================================================

/// Reconnect settings for the IRC session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Reconnect after the connection drops.
    #[serde(default = "default_true")]
    pub auto_reconnect: bool,

    /// Maximum consecutive attempts; unlimited when absent.
    #[serde(default)]
    pub max_retries: Option<u32>,

    /// Initial delay between retries in milliseconds.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Maximum delay between retries in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Exponential backoff multiplier.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            auto_reconnect: true,
            max_retries: None,
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

#[cfg(feature = "irc")]
impl RetryConfig {
    /// Converts to the transport's retry policy.
    pub fn to_policy(&self) -> kindred_transport::RetryPolicy {
        kindred_transport::RetryPolicy {
            auto_reconnect: self.auto_reconnect,
            max_retries: self.max_retries,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            backoff_multiplier: self.backoff_multiplier,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    60_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

/// IRC ingress configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct IrcConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_irc_host")]
    pub host: String,

    #[serde(default = "default_irc_port")]
    pub port: u16,

    #[serde(default = "default_true")]
    pub tls: bool,

    /// Login name of the bot account.
    #[serde(default)]
    pub nick: String,

    /// Password sent with `PASS`, e.g. `oauth:...`.
    #[serde(default)]
    pub token: Option<String>,

    /// Channels joined after login.
    #[serde(default)]
    pub channels: Vec<String>,

    /// Capacity of the outbound message queue.
    #[serde(default = "default_outbound_capacity")]
    pub outbound_capacity: usize,

    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for IrcConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: default_irc_host(),
            port: default_irc_port(),
            tls: true,
            nick: String::new(),
            token: None,
            channels: Vec::new(),
            outbound_capacity: default_outbound_capacity(),
            retry: RetryConfig::default(),
        }
    }
}

impl fmt::Debug for IrcConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IrcConfig")
            .field("enabled", &self.enabled)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("tls", &self.tls)
            .field("nick", &self.nick)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("channels", &self.channels)
            .field("outbound_capacity", &self.outbound_capacity)
            .field("retry", &self.retry)
            .finish()
    }
}

#[cfg(feature = "irc")]
impl IrcConfig {
    /// Converts to the session's connect options.
    pub fn to_connect_options(&self) -> kindred_transport::IrcConnectOptions {
        kindred_transport::IrcConnectOptions {
            host: self.host.clone(),
            port: self.port,
            tls: self.tls,
            nick: self.nick.clone(),
            token: self.token.clone(),
            channels: self.channels.clone(),
            retry: self.retry.to_policy(),
        }
    }
}

fn default_irc_host() -> String {
    "irc.chat.twitch.tv".to_string()
}

fn default_irc_port() -> u16 {
    6697
}

fn default_outbound_capacity() -> usize {
    64
}

/// Webhook ingress configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Host address to bind to.
    #[serde(default = "default_webhook_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_webhook_port")]
    pub port: u16,

    /// Path of the callback route.
    #[serde(default = "default_webhook_path")]
    pub path: String,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: default_webhook_host(),
            port: default_webhook_port(),
            path: default_webhook_path(),
        }
    }
}

impl WebhookConfig {
    /// Returns `host:port`.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn default_webhook_host() -> String {
    "0.0.0.0".to_string()
}

fn default_webhook_port() -> u16 {
    8080
}

fn default_webhook_path() -> String {
    "/twitch_webhook".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = KindredConfig::default();
        assert_eq!(config.dispatch.sigil, "!");
        assert_eq!(config.dispatch.ignored_senders, vec!["nightbot"]);
        assert!(!config.irc.enabled);
        assert_eq!(config.irc.port, 6697);
        assert_eq!(config.webhook.bind_addr(), "0.0.0.0:8080");
        assert_eq!(config.logging.level, LogLevel::Info);
    }

    #[test]
    fn test_irc_debug_redacts_token() {
        let irc = IrcConfig {
            token: Some("oauth:secret".into()),
            ..Default::default()
        };
        let printed = format!("{irc:?}");
        assert!(!printed.contains("secret"));
        assert!(printed.contains("<redacted>"));
    }

    #[cfg(feature = "irc")]
    #[test]
    fn test_retry_policy_conversion() {
        let retry = RetryConfig {
            max_retries: Some(3),
            initial_delay_ms: 250,
            ..Default::default()
        };
        let policy = retry.to_policy();
        assert_eq!(policy.max_retries, Some(3));
        assert_eq!(policy.initial_delay, Duration::from_millis(250));
        assert_eq!(policy.max_delay, Duration::from_secs(60));
    }
}

//! IRC line parsing and formatting.
//!
//! Only the two commands the bot reacts to are recognised:
//!
//! ```text
//! PING :tmi.twitch.tv
//! @badge-info=;color=#FF0000 :viewer!viewer@viewer.tmi.twitch.tv PRIVMSG #stream :!runes
//! ```
//!
//! Everything else (numerics, JOIN echoes, CAP replies) parses to `None`.

use kindred_core::ChatEvent;

use crate::channel::channel_name;

/// Tag character some chat clients append to repeated messages so that they
/// pass duplicate-message filters.
const PADDING: char = '\u{E0000}';

/// A recognised inbound line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IrcLine {
    /// Server keep-alive. Carries the token to echo back.
    Ping(String),
    /// A chat message.
    Privmsg(ChatEvent),
}

/// Parses one line received from the server.
pub fn parse_line(raw: &str) -> Option<IrcLine> {
    let mut line = raw.trim_end_matches(['\r', '\n']);
    if line.is_empty() {
        return None;
    }

    // IRCv3 tags
    if line.starts_with('@') {
        line = line.split_once(' ')?.1;
    }

    let (prefix, line) = match line.strip_prefix(':') {
        Some(rest) => {
            let (prefix, rest) = rest.split_once(' ')?;
            (Some(prefix), rest)
        }
        None => (None, line),
    };

    let (command, params) = line.split_once(' ').unwrap_or((line, ""));
    match command {
        "PING" => Some(IrcLine::Ping(params.trim_start_matches(':').to_string())),
        "PRIVMSG" => {
            let sender = prefix?.split('!').next()?;
            let (channel, text) = params.split_once(' ')?;
            let text = text.strip_prefix(':').unwrap_or(text);
            Some(IrcLine::Privmsg(ChatEvent::new(
                sender,
                channel,
                strip_padding(text),
            )))
        }
        _ => None,
    }
}

/// Removes the trailing duplicate-filter padding, with the one or two spaces
/// that precede it.
pub fn strip_padding(text: &str) -> &str {
    text.strip_suffix(PADDING)
        .map(|t| t.strip_suffix("  ").or_else(|| t.strip_suffix(' ')).unwrap_or(t))
        .unwrap_or(text)
}

/// Formats an outbound chat message.
///
/// Line breaks in `text` are replaced by spaces so a message can never smuggle
/// a second IRC command.
pub fn format_privmsg(channel: &str, text: &str) -> String {
    let text: String = text
        .chars()
        .map(|c| if c == '\r' || c == '\n' { ' ' } else { c })
        .collect();
    format!("PRIVMSG {} :{}", channel_name(channel), text)
}

/// Formats the answer to a `PING`.
pub fn format_pong(token: &str) -> String {
    format!("PONG :{token}")
}

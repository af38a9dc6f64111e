//! IRC ingress and outbound sink.
//!
//! - [`parse_line`] turns a raw server line into an [`IrcLine`].
//! - [`IrcSession`] is one connection; [`run_irc`] keeps one alive.
//! - [`IrcSink`] queues replies for whichever session is current.

pub mod line;
pub mod session;
pub mod sink;

pub use line::{IrcLine, format_privmsg, parse_line, strip_padding};
pub use session::{IrcConnectOptions, IrcSession, RetryPolicy, run_irc};
pub use sink::IrcSink;

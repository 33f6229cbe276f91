//! Chat-style message formatting.
//!
//! The server treats every line as opaque; these helpers only shape what the
//! console client sends and shows. A formatted line looks like
//! `[14:03:07] alice: hi` or `[14:03:07] System: ...`.

use std::fmt;

use chrono::{DateTime, Local, TimeZone};

/// Who a message is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderPrefix<'a> {
    /// Generated locally by the client, not typed by a user.
    System,
    /// Typed by the named user.
    User(&'a str),
}

impl fmt::Display for SenderPrefix<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::System => f.write_str("System"),
            Self::User(name) => f.write_str(name),
        }
    }
}

/// `[HH:MM:SS] <sender>: ` for the given time.
pub fn prefix<Tz>(sender: SenderPrefix<'_>, at: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    format!("[{}] {sender}: ", at.format("%H:%M:%S"))
}

/// A user's message stamped with `at`.
pub fn user_message<Tz>(name: &str, text: &str, at: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    format!("{}{text}", prefix(SenderPrefix::User(name), at))
}

/// A system message stamped with `at`.
pub fn system_message<Tz>(text: &str, at: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    format!("{}{text}", prefix(SenderPrefix::System, at))
}

/// A user's message stamped with the current local time.
pub fn user_message_now(name: &str, text: &str) -> String {
    user_message(name, text, &Local::now())
}

/// A system message stamped with the current local time.
pub fn system_message_now(text: &str) -> String {
    system_message(text, &Local::now())
}

/// Announcement sent when a user leaves.
pub fn departure_message(name: &str) -> String {
    format!("{name} has left the chat.")
}

/// Greeting shown to a user hosting the chat.
pub fn welcome_host(address: &str) -> String {
    format!("Welcome to the chat! You are hosting. Share your IP Address to other users: {address}")
}

/// Greeting shown to a user joining a chat.
pub fn welcome_join(address: &str) -> String {
    format!("Welcome to the chat! You joined server: {address}")
}

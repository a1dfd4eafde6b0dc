//! Render-ready chat records owned by the reconciliation engine.

use std::fmt::Write as _;

use chrono::{Local, TimeZone};
use uuid::Uuid;

/// Fallback display format when the configured one cannot be rendered.
pub const DEFAULT_TIMESTAMP_FORMAT: &str = "%H:%M";

/// Identity of a message in the visible list.
///
/// The three kinds live in disjoint namespaces, so an id minted locally can
/// never collide with one the backend assigned.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageId {
    /// Assigned by the backend; authoritative and unique.
    Server(String),
    /// Minted for a backend record that arrived without an id.
    Synthesized(u64),
    /// Temporary id of an optimistic send awaiting confirmation.
    Local(Uuid),
}

impl MessageId {
    /// Creates a fresh temporary id for an optimistic send.
    #[must_use]
    pub fn new_local() -> Self {
        Self::Local(Uuid::now_v7())
    }

    /// Returns `true` for temporary ids of optimistic sends.
    #[must_use]
    pub const fn is_local(&self) -> bool {
        matches!(self, Self::Local(_))
    }

    /// Returns the backend id, if this is one.
    #[must_use]
    pub fn as_server(&self) -> Option<&str> {
        match self {
            Self::Server(id) => Some(id),
            _ => None,
        }
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Server(id) => write!(f, "{id}"),
            Self::Synthesized(n) => write!(f, "synth-{n}"),
            Self::Local(uuid) => write!(f, "local-{uuid}"),
        }
    }
}

/// Millisecond-precision UTC timestamp used for ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Creates a timestamp for the current instant.
    #[must_use]
    pub fn now() -> Self {
        Self(chrono::Utc::now().timestamp_millis())
    }

    /// Creates a timestamp from milliseconds since the UNIX epoch.
    #[must_use]
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns the timestamp as milliseconds since the UNIX epoch.
    #[must_use]
    pub const fn as_millis(&self) -> i64 {
        self.0
    }

    /// Formats the timestamp in local time with a chrono format string.
    ///
    /// Falls back to [`DEFAULT_TIMESTAMP_FORMAT`] if `format` cannot be
    /// rendered, and to `"--:--"` if the instant is out of range.
    #[must_use]
    pub fn format_local(&self, format: &str) -> String {
        let chrono::LocalResult::Single(dt) = Local.timestamp_millis_opt(self.0) else {
            return "--:--".to_string();
        };
        let mut out = String::new();
        if write!(out, "{}", dt.format(format)).is_ok() {
            return out;
        }
        out.clear();
        match write!(out, "{}", dt.format(DEFAULT_TIMESTAMP_FORMAT)) {
            Ok(()) => out,
            Err(_) => "--:--".to_string(),
        }
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// Who wrote a message, from the app user's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sender {
    /// The app user.
    Me,
    /// Desk staff or any other role.
    Counterpart,
}

/// A unit of chat conversation as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Server, synthesized, or temporary local id.
    pub id: MessageId,
    /// Message body.
    pub text: String,
    /// Author side.
    pub sender: Sender,
    /// Ordering key.
    pub occurred_at: Timestamp,
    /// `occurred_at` formatted for display.
    pub display_time: String,
    /// `true` only while an optimistic send awaits confirmation.
    pub pending: bool,
}

impl Message {
    /// Returns `true` while this record awaits backend confirmation.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        self.pending
    }

    /// Returns `true` if the app user wrote this message.
    #[must_use]
    pub fn is_mine(&self) -> bool {
        self.sender == Sender::Me
    }
}

//! Line-oriented rendering of the message list.
//!
//! The CLI prints a transcript rather than redrawing a screen, so each
//! published view is diffed against what was already printed and only the
//! new or changed records become lines.

use std::collections::HashMap;

use crate::chat::message::{Message, MessageId};

/// Delivery state shown next to the user's own messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageStatus {
    /// Awaiting backend confirmation.
    Sending,
    /// Confirmed by the backend.
    Sent,
}

impl MessageStatus {
    /// Get the display symbol for this status.
    #[must_use]
    pub const fn symbol(&self) -> &'static str {
        match self {
            Self::Sending => "\u{22ef}",
            Self::Sent => "\u{2713}",
        }
    }
}

/// A message ready to print.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayLine {
    /// Sender label ("you" or "support").
    pub sender: &'static str,
    /// Message content.
    pub content: String,
    /// Formatted timestamp (e.g., "14:23").
    pub timestamp: String,
    /// Delivery state, for the user's own messages only.
    pub status: Option<MessageStatus>,
}

impl std::fmt::Display for DisplayLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.timestamp, self.sender, self.content)?;
        if let Some(status) = self.status {
            write!(f, " {}", status.symbol())?;
        }
        Ok(())
    }
}

impl From<&Message> for DisplayLine {
    fn from(message: &Message) -> Self {
        let status = message.is_mine().then_some(if message.pending {
            MessageStatus::Sending
        } else {
            MessageStatus::Sent
        });
        Self {
            sender: if message.is_mine() { "you" } else { "support" },
            content: message.text.clone(),
            timestamp: message.display_time.clone(),
            status,
        }
    }
}

/// Tracks which records have already been printed.
#[derive(Debug, Default)]
pub struct Transcript {
    /// Printed ids and whether they were pending when printed.
    printed: HashMap<MessageId, bool>,
}

impl Transcript {
    /// Creates an empty transcript.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns lines for records not printed yet, in list order.
    ///
    /// A pending record is printed once when it appears; its confirmed
    /// replacement carries a new id and is printed again with the sent mark.
    pub fn update(&mut self, messages: &[Message]) -> Vec<DisplayLine> {
        let mut lines = Vec::new();
        for message in messages {
            if self.printed.get(&message.id) == Some(&message.pending) {
                continue;
            }
            self.printed.insert(message.id.clone(), message.pending);
            lines.push(DisplayLine::from(message));
        }
        lines
    }

    /// Number of distinct records printed so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.printed.len()
    }

    /// Returns `true` if nothing has been printed yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.printed.is_empty()
    }
}

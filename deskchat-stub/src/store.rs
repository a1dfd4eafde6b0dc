//! In-memory conversation store for the stub backend.
//!
//! The [`ConversationStore`] holds one support conversation as a FIFO of
//! [`RawMessage`]s with sequential numeric ids. When the configured history
//! cap is exceeded the oldest record is dropped.

use std::collections::VecDeque;

use chrono::SecondsFormat;
use tokio::sync::RwLock;

use deskchat_proto::message::{RawId, RawMessage};

/// Default maximum number of records kept before FIFO eviction.
const DEFAULT_MAX_HISTORY: usize = 500;

#[derive(Debug)]
struct Conversation {
    records: VecDeque<RawMessage>,
    next_id: i64,
    /// Records not written by the app user and not yet marked read.
    unread: usize,
}

/// In-memory conversation with FIFO eviction.
///
/// Thread-safe via [`RwLock`].
#[derive(Debug)]
pub struct ConversationStore {
    conversation: RwLock<Conversation>,
    max_history: usize,
    self_role: String,
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationStore {
    /// Creates an empty store with the default history limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_history(DEFAULT_MAX_HISTORY)
    }

    /// Creates an empty store with a custom history limit.
    #[must_use]
    pub fn with_max_history(max_history: usize) -> Self {
        Self {
            conversation: RwLock::new(Conversation {
                records: VecDeque::new(),
                next_id: 1,
                unread: 0,
            }),
            max_history: max_history.max(1),
            self_role: deskchat_proto::message::DEFAULT_SELF_ROLE.to_string(),
        }
    }

    /// Sets which role counts as the app user for unread tracking.
    #[must_use]
    pub fn with_self_role(mut self, role: impl Into<String>) -> Self {
        self.self_role = role.into();
        self
    }

    /// Appends a record written by `role` and returns it as stored.
    ///
    /// The record gets the next numeric id and the current time in
    /// RFC 3339 with millisecond precision.
    pub async fn append(&self, text: &str, role: &str) -> RawMessage {
        let mut conversation = self.conversation.write().await;
        let record = RawMessage::new(text, role)
            .with_id(RawId::Number(conversation.next_id))
            .with_created_at(chrono::Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true));
        conversation.next_id += 1;
        if role != self.self_role {
            conversation.unread += 1;
        }
        conversation.records.push_back(record.clone());
        if conversation.records.len() > self.max_history
            && let Some(evicted) = conversation.records.pop_front()
            && !self.is_self(&evicted)
        {
            // Unread records are the newest counterpart ones, so the count
            // can never exceed the counterpart records still stored.
            let remaining = conversation
                .records
                .iter()
                .filter(|r| !self.is_self(r))
                .count();
            conversation.unread = conversation.unread.min(remaining);
        }
        drop(conversation);
        record
    }

    fn is_self(&self, record: &RawMessage) -> bool {
        record.from_role.as_deref() == Some(self.self_role.as_str())
    }

    /// Returns every stored record, oldest first.
    pub async fn history(&self) -> Vec<RawMessage> {
        let conversation = self.conversation.read().await;
        conversation.records.iter().cloned().collect()
    }

    /// Clears the unread counter, returning how many records it covered.
    pub async fn mark_all_read(&self) -> usize {
        let mut conversation = self.conversation.write().await;
        std::mem::take(&mut conversation.unread)
    }

    /// Number of counterpart records not yet marked read.
    pub async fn unread(&self) -> usize {
        self.conversation.read().await.unread
    }

    /// Number of records currently stored.
    pub async fn len(&self) -> usize {
        self.conversation.read().await.records.len()
    }

    /// Returns `true` if nothing is stored.
    pub async fn is_empty(&self) -> bool {
        self.conversation.read().await.records.is_empty()
    }
}

//! The canonical visible message list and its optimistic-send bookkeeping.
//!
//! [`Timeline`] is the single writer of the list. Every mutation is a
//! whole-list replacement or an in-place swap of one record, and every one
//! of them preserves three properties: no two records share an id, the list
//! is sorted by `occurred_at`, and each outstanding send has exactly one
//! pending record.

use super::message::{Message, MessageId};
use super::reconcile::{merge_and_sort, pending_subset};

/// Handle for one optimistic send, consumed by [`Timeline::commit`] or
/// [`Timeline::rollback`].
#[derive(Debug)]
#[must_use = "a pending send must be committed or rolled back"]
pub struct PendingSend {
    local_id: MessageId,
    typed: String,
}

impl PendingSend {
    /// Temporary id of the optimistic record.
    #[must_use]
    pub const fn local_id(&self) -> &MessageId {
        &self.local_id
    }

    /// Composer text as the user typed it.
    #[must_use]
    pub fn typed(&self) -> &str {
        &self.typed
    }
}

/// A confirmed record kept on top of polls that predate its commit.
#[derive(Debug, Clone)]
struct AwaitingEcho {
    message: Message,
    epoch: u64,
}

/// Visible message list plus the local records that must survive polls.
#[derive(Debug, Default)]
pub struct Timeline {
    messages: Vec<Message>,
    awaiting_echo: Vec<AwaitingEcho>,
    epoch: u64,
}

impl Timeline {
    /// Creates an empty timeline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current ordered, deduplicated list.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Commit counter. Capture it when a poll is issued and pass it back to
    /// [`apply_poll`](Self::apply_poll).
    #[must_use]
    pub const fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Returns `true` if any optimistic send is outstanding.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.messages.iter().any(|m| m.pending)
    }

    /// Local records merged on top of each poll: pending records in list
    /// order, then confirmed records not yet covered by a later poll.
    #[must_use]
    pub fn carry_over(&self) -> Vec<Message> {
        let mut local = pending_subset(&self.messages);
        local.extend(self.awaiting_echo.iter().map(|a| a.message.clone()));
        local
    }

    /// Replaces the list with `server` merged with the carry-over.
    ///
    /// `issued_at` is the [`epoch`](Self::epoch) observed when the fetch was
    /// started. Confirmed records committed after that point are kept even
    /// if `server` lacks them, because the response predates their commit.
    pub fn apply_poll(&mut self, server: Vec<Message>, issued_at: u64) {
        self.awaiting_echo.retain(|a| a.epoch > issued_at);
        let local = self.carry_over();
        self.messages = merge_and_sort(server, local);
    }

    /// Appends an optimistic record and returns the handle to settle it.
    ///
    /// `pending` should come from
    /// [`Normalizer::pending_message`](super::normalize::Normalizer::pending_message);
    /// `typed` is the composer text to restore on rollback.
    pub fn begin_pending_send(&mut self, pending: Message, typed: impl Into<String>) -> PendingSend {
        debug_assert!(pending.pending && pending.id.is_local());
        let local_id = pending.id.clone();
        let mut next = std::mem::take(&mut self.messages);
        next.push(pending);
        self.messages = merge_and_sort(next, Vec::new());
        PendingSend {
            local_id,
            typed: typed.into(),
        }
    }

    /// Replaces the pending record of `send` with `confirmed`, in place.
    ///
    /// If a poll already delivered a record with the confirmed id, that
    /// copy is dropped so the id stays unique. If the pending record is
    /// gone, the confirmed record is merged in instead.
    pub fn commit(&mut self, send: PendingSend, confirmed: Message) {
        self.epoch += 1;
        self.awaiting_echo.push(AwaitingEcho {
            message: confirmed.clone(),
            epoch: self.epoch,
        });

        let Some(slot) = self.position(&send.local_id) else {
            tracing::debug!(id = %send.local_id, "pending record missing at commit, merging");
            let current = std::mem::take(&mut self.messages);
            self.messages = merge_and_sort(current, vec![confirmed]);
            return;
        };

        let confirmed_id = confirmed.id.clone();
        self.messages[slot] = confirmed;
        let mut index = 0;
        self.messages.retain(|m| {
            let keep = index == slot || m.id != confirmed_id;
            index += 1;
            keep
        });
        if !self.is_sorted() {
            let current = std::mem::take(&mut self.messages);
            self.messages = merge_and_sort(current, Vec::new());
        }
    }

    /// Removes the pending record of `send` and returns the typed text.
    pub fn rollback(&mut self, send: PendingSend) -> String {
        self.messages.retain(|m| m.id != send.local_id);
        send.typed
    }

    fn position(&self, id: &MessageId) -> Option<usize> {
        self.messages.iter().position(|m| &m.id == id)
    }

    fn is_sorted(&self) -> bool {
        self.messages
            .windows(2)
            .all(|pair| pair[0].occurred_at <= pair[1].occurred_at)
    }
}

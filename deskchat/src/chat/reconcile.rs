//! Pure merge functions for the visible message list.
//!
//! The merge is idempotent and commutative over its two contributions (the
//! server set and the local carry-over set), so a poll response and a send
//! response may land in either order and still converge.

use std::collections::HashMap;

use super::message::{Message, MessageId};

/// Merges a fresh server list with local carry-over records.
///
/// Rules:
/// 1. Concatenate `server` then `local`.
/// 2. Deduplicate by id; the later record wins but keeps the slot of the
///    first occurrence.
/// 3. Stable sort ascending by `occurred_at`, so equal timestamps keep
///    arrival order.
///
/// The result replaces the previous list wholesale.
#[must_use]
pub fn merge_and_sort(server: Vec<Message>, local: Vec<Message>) -> Vec<Message> {
    let mut merged: Vec<Message> = Vec::with_capacity(server.len() + local.len());
    let mut slots: HashMap<MessageId, usize> = HashMap::with_capacity(merged.capacity());

    for message in server.into_iter().chain(local) {
        if let Some(&slot) = slots.get(&message.id) {
            merged[slot] = message;
        } else {
            slots.insert(message.id.clone(), merged.len());
            merged.push(message);
        }
    }

    merged.sort_by_key(|m| m.occurred_at);
    merged
}

/// Returns the pending records of `messages`, in list order.
#[must_use]
pub fn pending_subset(messages: &[Message]) -> Vec<Message> {
    messages.iter().filter(|m| m.pending).cloned().collect()
}

//! Mapping of backend records into render-ready [`Message`]s.
//!
//! Normalization never fails. A record with a garbled timestamp sorts as
//! "now", an unknown role is shown as the counterpart, and a missing id is
//! replaced by a session-unique synthesized one.
//!
//! Synthesized ids are stable: the same id-less record seen again in a later
//! poll gets the id it was given the first time.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDateTime};
use parking_lot::Mutex;

use deskchat_proto::message::{RawId, RawMessage};

use super::message::{Message, MessageId, Sender, Timestamp};

/// Naive formats tried after RFC 3339. Naive values are read as UTC.
const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// Converts [`RawMessage`]s into [`Message`]s for one chat session.
#[derive(Debug)]
pub struct Normalizer {
    /// Role value that marks the app user's own messages.
    self_role: String,
    /// chrono format for `display_time`.
    timestamp_format: String,
    /// Ids handed out for records without a usable backend id.
    synthesized: Mutex<SynthesizedIds>,
}

/// Content of an id-less record plus how many identical records preceded
/// it in the same batch.
type RecordKey = (String, Option<String>, Option<String>, usize);

#[derive(Debug)]
struct SynthesizedIds {
    next: u64,
    assigned: HashMap<RecordKey, u64>,
}

impl Normalizer {
    /// Creates a normalizer for the given self role and display format.
    pub fn new(self_role: impl Into<String>, timestamp_format: impl Into<String>) -> Self {
        Self {
            self_role: self_role.into(),
            timestamp_format: timestamp_format.into(),
            synthesized: Mutex::new(SynthesizedIds {
                next: 1,
                assigned: HashMap::new(),
            }),
        }
    }

    /// Normalizes one record, using the current time as the fallback.
    #[must_use]
    pub fn normalize(&self, raw: RawMessage) -> Message {
        self.normalize_at(raw, Timestamp::now())
    }

    /// Normalizes one record, substituting `now` for a missing or
    /// unparseable creation time.
    #[must_use]
    pub fn normalize_at(&self, raw: RawMessage, now: Timestamp) -> Message {
        self.normalize_nth(raw, now, 0)
    }

    /// Normalizes a record that is the `occurrence`-th identical id-less
    /// record in its batch.
    fn normalize_nth(&self, raw: RawMessage, now: Timestamp, occurrence: usize) -> Message {
        let id = match raw.id.as_ref().and_then(RawId::canonical) {
            Some(id) => MessageId::Server(id),
            None => self.synthesize_id(&raw, occurrence),
        };

        let sender = match raw.from_role.as_deref() {
            Some(role) if role == self.self_role => Sender::Me,
            _ => Sender::Counterpart,
        };

        let occurred_at = match raw.created_at.as_deref() {
            Some(text) => parse_timestamp(text).unwrap_or_else(|| {
                tracing::debug!(created_at = text, "unparseable created_at, using now");
                now
            }),
            None => now,
        };

        Message {
            id,
            text: raw.message,
            sender,
            occurred_at,
            display_time: occurred_at.format_local(&self.timestamp_format),
            pending: false,
        }
    }

    /// Normalizes a batch, sharing one fallback "now" across it so that
    /// undated records keep their response order after a stable sort.
    #[must_use]
    pub fn normalize_all(&self, raws: Vec<RawMessage>) -> Vec<Message> {
        let now = Timestamp::now();
        let mut seen: HashMap<RecordKey, usize> = HashMap::new();
        raws.into_iter()
            .map(|raw| {
                let occurrence = if raw.id.as_ref().and_then(RawId::canonical).is_some() {
                    0
                } else {
                    let count = seen.entry(record_key(&raw, 0)).or_default();
                    *count += 1;
                    *count - 1
                };
                self.normalize_nth(raw, now, occurrence)
            })
            .collect()
    }

    /// Builds the optimistic record for a send of `text` typed at `at`.
    #[must_use]
    pub fn pending_message(&self, text: &str, at: Timestamp) -> Message {
        Message {
            id: MessageId::new_local(),
            text: text.to_string(),
            sender: Sender::Me,
            occurred_at: at,
            display_time: at.format_local(&self.timestamp_format),
            pending: true,
        }
    }

    fn synthesize_id(&self, raw: &RawMessage, occurrence: usize) -> MessageId {
        let mut ids = self.synthesized.lock();
        let SynthesizedIds { next, assigned } = &mut *ids;
        let id = *assigned
            .entry(record_key(raw, occurrence))
            .or_insert_with(|| {
                let id = *next;
                *next += 1;
                id
            });
        MessageId::Synthesized(id)
    }
}

fn record_key(raw: &RawMessage, occurrence: usize) -> RecordKey {
    (
        raw.message.clone(),
        raw.from_role.clone(),
        raw.created_at.clone(),
        occurrence,
    )
}

/// Parses a backend creation time into a [`Timestamp`].
///
/// Accepts RFC 3339 and `YYYY-MM-DD HH:MM:SS[.fff]` (with a space or `T`
/// separator, read as UTC).
#[must_use]
pub fn parse_timestamp(text: &str) -> Option<Timestamp> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(Timestamp::from_millis(dt.timestamp_millis()));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .map(|naive| Timestamp::from_millis(naive.and_utc().timestamp_millis()))
}

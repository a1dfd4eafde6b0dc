//! In-memory backend for tests and offline mode.
//!
//! [`MemoryTransport`] keeps the conversation in process and lets a test
//! script the backend: inject desk replies, fail sends, take the history
//! endpoint down, or slow calls down. Clones share the same backend, so a
//! test can keep one handle while the engine owns another.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::SecondsFormat;
use parking_lot::Mutex;

use deskchat_proto::message::{
    DEFAULT_COUNTERPART_ROLE, DEFAULT_SELF_ROLE, RawId, RawMessage, SendRequest,
};

use super::{ChatTransport, TransportError, TransportType};

/// Scriptable state behind a [`MemoryTransport`].
#[derive(Debug)]
struct Backend {
    records: Vec<RawMessage>,
    next_id: i64,
    unread: usize,
    failing_sends: u32,
    history_available: bool,
    read_available: bool,
    history_delay: Duration,
    send_delay: Duration,
}

#[derive(Debug)]
struct Shared {
    backend: Mutex<Backend>,
    self_role: String,
    counterpart_role: String,
    history_calls: AtomicUsize,
    send_calls: AtomicUsize,
    read_calls: AtomicUsize,
}

/// In-process [`ChatTransport`] with a scriptable backend.
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    shared: Arc<Shared>,
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTransport {
    /// Creates an empty backend using the default role names.
    #[must_use]
    pub fn new() -> Self {
        Self::with_roles(DEFAULT_SELF_ROLE, DEFAULT_COUNTERPART_ROLE)
    }

    /// Creates an empty backend with custom role names.
    pub fn with_roles(self_role: impl Into<String>, counterpart_role: impl Into<String>) -> Self {
        Self {
            shared: Arc::new(Shared {
                backend: Mutex::new(Backend {
                    records: Vec::new(),
                    next_id: 1,
                    unread: 0,
                    failing_sends: 0,
                    history_available: true,
                    read_available: true,
                    history_delay: Duration::ZERO,
                    send_delay: Duration::ZERO,
                }),
                self_role: self_role.into(),
                counterpart_role: counterpart_role.into(),
                history_calls: AtomicUsize::new(0),
                send_calls: AtomicUsize::new(0),
                read_calls: AtomicUsize::new(0),
            }),
        }
    }

    /// Appends a desk reply stamped with the current time.
    pub fn push_reply(&self, text: impl Into<String>) -> RawMessage {
        let mut backend = self.shared.backend.lock();
        let record = Self::append(&mut backend, text.into(), &self.shared.counterpart_role);
        backend.unread += 1;
        record
    }

    /// Appends a record verbatim, e.g. one with a garbled timestamp.
    pub fn push_raw(&self, record: RawMessage) {
        self.shared.backend.lock().records.push(record);
    }

    /// Makes the next `count` sends fail.
    pub fn fail_next_sends(&self, count: u32) {
        self.shared.backend.lock().failing_sends = count;
    }

    /// Takes the history endpoint down (`false`) or back up (`true`).
    pub fn set_history_available(&self, available: bool) {
        self.shared.backend.lock().history_available = available;
    }

    /// Takes the mark-read endpoint down (`false`) or back up (`true`).
    pub fn set_read_available(&self, available: bool) {
        self.shared.backend.lock().read_available = available;
    }

    /// Delays every history response by `delay`.
    ///
    /// The response reflects the conversation as it was when the call
    /// started, like a real request in flight.
    pub fn set_history_delay(&self, delay: Duration) {
        self.shared.backend.lock().history_delay = delay;
    }

    /// Delays every send acknowledgement by `delay`.
    pub fn set_send_delay(&self, delay: Duration) {
        self.shared.backend.lock().send_delay = delay;
    }

    /// Snapshot of the stored conversation.
    #[must_use]
    pub fn records(&self) -> Vec<RawMessage> {
        self.shared.backend.lock().records.clone()
    }

    /// Number of desk replies not yet marked read.
    #[must_use]
    pub fn unread(&self) -> usize {
        self.shared.backend.lock().unread
    }

    /// Number of history fetches started.
    #[must_use]
    pub fn history_calls(&self) -> usize {
        self.shared.history_calls.load(Ordering::SeqCst)
    }

    /// Number of sends started.
    #[must_use]
    pub fn send_calls(&self) -> usize {
        self.shared.send_calls.load(Ordering::SeqCst)
    }

    /// Number of mark-read calls started.
    #[must_use]
    pub fn read_calls(&self) -> usize {
        self.shared.read_calls.load(Ordering::SeqCst)
    }

    fn append(backend: &mut Backend, text: String, role: &str) -> RawMessage {
        let record = RawMessage::new(text, role)
            .with_id(RawId::Number(backend.next_id))
            .with_created_at(chrono::Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true));
        backend.next_id += 1;
        backend.records.push(record.clone());
        record
    }
}

impl ChatTransport for MemoryTransport {
    async fn fetch_history(&self) -> Result<Vec<RawMessage>, TransportError> {
        self.shared.history_calls.fetch_add(1, Ordering::SeqCst);
        let (available, delay, records) = {
            let backend = self.shared.backend.lock();
            (
                backend.history_available,
                backend.history_delay,
                backend.records.clone(),
            )
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if available {
            Ok(records)
        } else {
            Err(TransportError::Unavailable("history endpoint down".to_string()))
        }
    }

    async fn send(&self, request: &SendRequest) -> Result<RawMessage, TransportError> {
        self.shared.send_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.shared.backend.lock().send_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut backend = self.shared.backend.lock();
        if backend.failing_sends > 0 {
            backend.failing_sends -= 1;
            return Err(TransportError::Unavailable("send rejected".to_string()));
        }
        if request.validate().is_err() {
            return Err(TransportError::Status(422));
        }
        Ok(Self::append(
            &mut backend,
            request.message.clone(),
            &self.shared.self_role,
        ))
    }

    async fn mark_all_read(&self) -> Result<(), TransportError> {
        self.shared.read_calls.fetch_add(1, Ordering::SeqCst);
        let mut backend = self.shared.backend.lock();
        if !backend.read_available {
            return Err(TransportError::Unavailable("read endpoint down".to_string()));
        }
        backend.unread = 0;
        Ok(())
    }

    fn transport_type(&self) -> TransportType {
        TransportType::Memory
    }
}

//! Chat application layer for `DeskChat`.
//!
//! Contains the [`ChatEngine`] which owns the visible message list for one
//! chat screen and orchestrates the optimistic send pipeline
//! (validate -> pending record -> transmit -> commit or rollback) and the
//! history poll (fetch -> normalize -> merge with carry-over -> replace).
//!
//! Engine state sits behind a short, synchronous critical section that is
//! never held across an await. Readers observe whole-list snapshots through
//! a [`watch`] channel; notices for the user arrive as [`ChatEvent`]s.

pub mod message;
pub mod normalize;
pub mod poll;
pub mod reconcile;
pub mod send;
pub mod timeline;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};

use deskchat_proto::message::ValidationError;

use crate::config::ChatConfig;
use crate::transport::{ChatTransport, TransportError, TransportType};

use message::{Message, MessageId};
use normalize::Normalizer;
use timeline::Timeline;

/// Errors that can occur when submitting a message.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// Message validation failed (empty or too long).
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Another send is still in flight.
    #[error("a message is already being sent")]
    Cooldown,

    /// The backend rejected the send or could not be reached.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The backend did not answer within the request timeout.
    #[error("no response within {}ms", .0.as_millis())]
    Timeout(Duration),
}

/// Events emitted by the [`ChatEngine`] for UI notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// The backend confirmed a send; the pending record was replaced.
    MessageConfirmed {
        /// Server id of the confirmed message.
        id: MessageId,
    },
    /// A send failed and its pending record was removed.
    SendFailed {
        /// The text as typed, so it can be offered again.
        text: String,
        /// Human-readable failure reason.
        reason: String,
    },
}

/// Snapshot of everything a chat screen renders.
#[derive(Debug, Clone, Default)]
pub struct ChatView {
    /// Ordered, deduplicated message list.
    pub messages: Arc<[Message]>,
    /// Current composer text.
    pub composer: String,
    /// `true` while a send is in flight (the send control is disabled).
    pub sending: bool,
}

/// Mutable engine state, guarded by [`ChatEngine::state`].
#[derive(Debug, Default)]
struct EngineState {
    timeline: Timeline,
    composer: String,
    in_flight: bool,
    /// Sequence number of the most recently issued poll.
    polls_issued: u64,
    /// Sequence number of the most recently applied poll.
    polls_applied: u64,
}

/// Owns the visible message list of one chat screen.
///
/// Shared between the poller and the send path behind an [`Arc`]. All
/// mutations go through [`Timeline`], one whole-list replacement or
/// in-place swap at a time.
pub struct ChatEngine<T: ChatTransport> {
    /// Backend the engine talks to.
    transport: T,
    /// Raw record mapping, including the synthesized-id counter.
    normalizer: Normalizer,
    /// Timeouts, limits and display settings.
    config: ChatConfig,
    /// Timeline, composer and in-flight flag.
    state: Mutex<EngineState>,
    /// Publishes a fresh [`ChatView`] after every mutation.
    view_tx: watch::Sender<ChatView>,
    /// Channel for emitting chat events to the UI layer.
    event_tx: mpsc::Sender<ChatEvent>,
}

impl<T: ChatTransport> ChatEngine<T> {
    /// Creates a new engine over `transport`.
    ///
    /// Returns the engine and a receiver for [`ChatEvent`]s that the UI
    /// layer should consume. The event buffer size comes from
    /// [`ChatConfig::event_buffer`].
    pub fn new(transport: T, config: ChatConfig) -> (Self, mpsc::Receiver<ChatEvent>) {
        let (event_tx, event_rx) = mpsc::channel(config.event_buffer.max(1));
        let (view_tx, _) = watch::channel(ChatView::default());
        let engine = Self {
            normalizer: Normalizer::new(config.self_role.clone(), config.timestamp_format.clone()),
            transport,
            config,
            state: Mutex::new(EngineState::default()),
            view_tx,
            event_tx,
        };
        (engine, event_rx)
    }

    /// Returns a receiver that observes every published [`ChatView`].
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ChatView> {
        self.view_tx.subscribe()
    }

    /// Returns the latest published view.
    #[must_use]
    pub fn view(&self) -> ChatView {
        self.view_tx.borrow().clone()
    }

    /// Returns the current message list.
    #[must_use]
    pub fn messages(&self) -> Arc<[Message]> {
        Arc::clone(&self.view_tx.borrow().messages)
    }

    /// Returns the current composer text.
    #[must_use]
    pub fn composer(&self) -> String {
        self.state.lock().composer.clone()
    }

    /// Replaces the composer text.
    pub fn set_composer(&self, text: impl Into<String>) {
        let mut state = self.state.lock();
        state.composer = text.into();
        self.publish(&state);
    }

    /// Returns `true` while a send is in flight.
    #[must_use]
    pub fn is_sending(&self) -> bool {
        self.state.lock().in_flight
    }

    /// The engine configuration.
    #[must_use]
    pub const fn config(&self) -> &ChatConfig {
        &self.config
    }

    /// The underlying transport.
    #[must_use]
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Kind of transport in use.
    #[must_use]
    pub fn transport_type(&self) -> TransportType {
        self.transport.transport_type()
    }

    /// Marks every counterpart message as read.
    ///
    /// Best effort: failures are logged at debug level and never surface to
    /// the user. Returns `true` if the backend acknowledged the call.
    pub async fn mark_all_read(&self) -> bool {
        match tokio::time::timeout(self.config.request_timeout, self.transport.mark_all_read())
            .await
        {
            Ok(Ok(())) => {
                tracing::debug!("marked all messages read");
                true
            }
            Ok(Err(e)) => {
                tracing::debug!(error = %e, "mark-all-read failed");
                false
            }
            Err(_) => {
                tracing::debug!(
                    timeout_ms = self.request_timeout_ms(),
                    "mark-all-read timed out"
                );
                false
            }
        }
    }

    /// Publishes a view of `state` to subscribers.
    fn publish(&self, state: &EngineState) {
        self.view_tx.send_replace(ChatView {
            messages: state.timeline.messages().into(),
            composer: state.composer.clone(),
            sending: state.in_flight,
        });
    }

    fn request_timeout_ms(&self) -> u64 {
        u64::try_from(self.config.request_timeout.as_millis()).unwrap_or(u64::MAX)
    }
}

impl<T: ChatTransport> std::fmt::Debug for ChatEngine<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatEngine")
            .field("transport", &self.transport.transport_type())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

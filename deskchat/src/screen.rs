//! Lifecycle of one mounted chat screen.
//!
//! Mounting creates the engine, starts the poller (first fetch runs
//! immediately) and fires a best-effort mark-all-read. Unmounting, or
//! dropping the [`ChatScreen`], cancels the poller and aborts background
//! work; nothing outlives the screen.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;

use crate::chat::message::Message;
use crate::chat::poll::{PollHandle, spawn_poller};
use crate::chat::{ChatEngine, ChatEvent, ChatView, SendError};
use crate::config::ChatConfig;
use crate::transport::ChatTransport;

/// A mounted chat screen.
#[derive(Debug)]
pub struct ChatScreen<T: ChatTransport + 'static> {
    engine: Arc<ChatEngine<T>>,
    poller: PollHandle,
    background: JoinSet<()>,
}

impl<T: ChatTransport + 'static> ChatScreen<T> {
    /// Mounts a chat screen over `transport`.
    ///
    /// Returns the screen and a receiver for [`ChatEvent`]s. Must be called
    /// within a tokio runtime.
    pub fn mount(transport: T, config: ChatConfig) -> (Self, mpsc::Receiver<ChatEvent>) {
        let interval = config.poll_interval;
        let (engine, events) = ChatEngine::new(transport, config);
        let engine = Arc::new(engine);

        let poller = spawn_poller(Arc::clone(&engine), interval);
        let mut background = JoinSet::new();
        background.spawn({
            let engine = Arc::clone(&engine);
            async move {
                engine.mark_all_read().await;
            }
        });

        tracing::info!(transport = %engine.transport_type(), "chat screen mounted");
        (
            Self {
                engine,
                poller,
                background,
            },
            events,
        )
    }

    /// The engine behind this screen.
    #[must_use]
    pub const fn engine(&self) -> &Arc<ChatEngine<T>> {
        &self.engine
    }

    /// Returns a receiver that observes every published [`ChatView`].
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ChatView> {
        self.engine.subscribe()
    }

    /// Sends `text`; see [`ChatEngine::send_text`].
    ///
    /// # Errors
    ///
    /// Returns [`SendError`] if the send was refused or failed.
    pub async fn send(&self, text: &str) -> Result<Message, SendError> {
        self.engine.send_text(text).await
    }

    /// Returns `true` while the poller is running.
    #[must_use]
    pub fn is_polling(&self) -> bool {
        !self.poller.is_cancelled()
    }

    /// Stops polling and waits for all background work to finish.
    pub async fn unmount(self) {
        let Self {
            engine,
            poller,
            mut background,
        } = self;
        poller.shutdown().await;
        background.shutdown().await;
        tracing::info!(transport = %engine.transport_type(), "chat screen unmounted");
    }
}

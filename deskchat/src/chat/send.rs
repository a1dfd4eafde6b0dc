//! Optimistic send pipeline.
//!
//! A submit validates the trimmed text, shows a pending record at once,
//! clears the composer and then waits for the backend. The backend's record
//! replaces the pending one in place; a failure removes it and gives the
//! typed text back.

use deskchat_proto::message::SendRequest;

use super::message::{Message, Sender, Timestamp};
use super::timeline::PendingSend;
use super::{ChatEngine, ChatEvent, SendError};
use crate::transport::ChatTransport;

/// Rolls a send back if its future is dropped before it settles.
struct InFlight<'a, T: ChatTransport> {
    engine: &'a ChatEngine<T>,
    send: Option<PendingSend>,
}

impl<T: ChatTransport> InFlight<'_, T> {
    fn commit(mut self, confirmed: Message) {
        if let Some(send) = self.send.take() {
            let mut state = self.engine.state.lock();
            state.timeline.commit(send, confirmed);
            state.in_flight = false;
            self.engine.publish(&state);
        }
    }

    fn fail(mut self) -> String {
        self.send
            .take()
            .map(|send| self.engine.roll_back(send))
            .unwrap_or_default()
    }
}

impl<T: ChatTransport> Drop for InFlight<'_, T> {
    fn drop(&mut self) {
        if let Some(send) = self.send.take() {
            tracing::debug!(id = %send.local_id(), "send abandoned, rolling back");
            self.engine.roll_back(send);
        }
    }
}

impl<T: ChatTransport> ChatEngine<T> {
    /// Sends the current composer text.
    ///
    /// # Errors
    ///
    /// See [`send_text`](Self::send_text).
    pub async fn submit(&self) -> Result<Message, SendError> {
        let text = self.composer();
        self.send_text(&text).await
    }

    /// Sends `text` with an optimistic pending record.
    ///
    /// Steps:
    /// 1. Refuse if a send is already in flight
    /// 2. Validate the trimmed text (non-empty, within the length limit)
    /// 3. Append a pending record, clear the composer, disable sending
    /// 4. Transmit, bounded by the request timeout
    /// 5. On success, replace the pending record with the backend's record,
    ///    emit [`ChatEvent::MessageConfirmed`] and poll once
    /// 6. On failure, remove the pending record, restore the composer and
    ///    emit [`ChatEvent::SendFailed`]
    ///
    /// Validation and cooldown errors leave all state untouched.
    ///
    /// # Errors
    ///
    /// Returns [`SendError`] if the send was refused or failed.
    pub async fn send_text(&self, text: &str) -> Result<Message, SendError> {
        let trimmed = text.trim();
        let request = SendRequest::new(trimmed);

        let send = {
            let mut state = self.state.lock();
            if state.in_flight {
                return Err(SendError::Cooldown);
            }
            request.validate_with_limit(self.config.max_message_len)?;

            let pending = self.normalizer.pending_message(trimmed, Timestamp::now());
            let send = state.timeline.begin_pending_send(pending, text);
            state.composer.clear();
            state.in_flight = true;
            self.publish(&state);
            send
        };
        tracing::debug!(id = %send.local_id(), len = trimmed.len(), "sending message");

        let guard = InFlight {
            engine: self,
            send: Some(send),
        };
        let outcome =
            match tokio::time::timeout(self.config.request_timeout, self.transport.send(&request))
                .await
            {
                Ok(Ok(raw)) => Ok(raw),
                Ok(Err(e)) => Err(SendError::Transport(e)),
                Err(_) => Err(SendError::Timeout(self.config.request_timeout)),
            };

        match outcome {
            Ok(raw) => {
                let mut confirmed = self.normalizer.normalize(raw);
                confirmed.sender = Sender::Me;
                guard.commit(confirmed.clone());
                tracing::debug!(id = %confirmed.id, "send confirmed");
                let _ = self.event_tx.try_send(ChatEvent::MessageConfirmed {
                    id: confirmed.id.clone(),
                });

                self.poll_once().await;
                Ok(confirmed)
            }
            Err(e) => {
                tracing::warn!(error = %e, "send failed, rolling back");
                let typed = guard.fail();
                let _ = self.event_tx.try_send(ChatEvent::SendFailed {
                    text: typed,
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Removes the pending record of `send` and re-enables sending.
    ///
    /// The typed text goes back into the composer unless the user has
    /// started a new draft. Returns the typed text.
    fn roll_back(&self, send: PendingSend) -> String {
        let mut state = self.state.lock();
        let typed = state.timeline.rollback(send);
        if state.composer.is_empty() {
            state.composer.clone_from(&typed);
        }
        state.in_flight = false;
        self.publish(&state);
        typed
    }
}

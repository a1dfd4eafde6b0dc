//! History polling.
//!
//! [`ChatEngine::poll_once`] fetches the full history and replaces the
//! visible list with it merged over the local carry-over. [`spawn_poller`]
//! runs it once at start and then on a fixed wall-clock interval until the
//! returned [`PollHandle`] is cancelled or dropped.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::ChatEngine;
use crate::transport::ChatTransport;

/// Shortest interval the poller accepts.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

impl<T: ChatTransport> ChatEngine<T> {
    /// Fetches history once and merges it into the visible list.
    ///
    /// A failed or timed-out fetch is logged and leaves the list untouched.
    /// A response that arrives after a later-issued poll was already
    /// applied is discarded. Returns `true` if the list was replaced.
    pub async fn poll_once(&self) -> bool {
        let (seq, issued_at) = {
            let mut state = self.state.lock();
            state.polls_issued += 1;
            (state.polls_issued, state.timeline.epoch())
        };

        let raws =
            match tokio::time::timeout(self.config.request_timeout, self.transport.fetch_history())
                .await
            {
                Ok(Ok(raws)) => raws,
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "history poll failed");
                    return false;
                }
                Err(_) => {
                    tracing::warn!(
                        timeout_ms = self.request_timeout_ms(),
                        "history poll timed out"
                    );
                    return false;
                }
            };

        let server = self.normalizer.normalize_all(raws);
        let count = server.len();

        let mut state = self.state.lock();
        if seq < state.polls_applied {
            tracing::debug!(seq, applied = state.polls_applied, "discarding stale poll");
            return false;
        }
        state.polls_applied = seq;
        state.timeline.apply_poll(server, issued_at);
        self.publish(&state);
        tracing::debug!(seq, count, visible = state.timeline.messages().len(), "poll applied");
        true
    }
}

/// Owned handle to a running poller.
///
/// Dropping the handle cancels the timer and aborts any in-flight fetch.
#[derive(Debug)]
#[must_use = "dropping the handle stops the poller"]
pub struct PollHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl PollHandle {
    /// Stops the poller without waiting for it.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Returns `true` once the poller has been told to stop.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Stops the poller and waits until it and its in-flight fetches are gone.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
            && e.is_panic()
        {
            tracing::warn!(error = %e, "poller task panicked");
        }
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Starts polling `engine` every `interval`, beginning immediately.
///
/// Each tick runs its fetch as a separate task, so a slow fetch never
/// delays the next tick. `interval` is raised to [`MIN_POLL_INTERVAL`] if
/// shorter. Must be called within a tokio runtime.
pub fn spawn_poller<T>(engine: Arc<ChatEngine<T>>, interval: Duration) -> PollHandle
where
    T: ChatTransport + 'static,
{
    let interval = interval.max(MIN_POLL_INTERVAL);
    let cancel = CancellationToken::new();
    let task = tokio::spawn(run_poller(engine, interval, cancel.clone()));
    PollHandle {
        cancel,
        task: Some(task),
    }
}

async fn run_poller<T>(engine: Arc<ChatEngine<T>>, interval: Duration, cancel: CancellationToken)
where
    T: ChatTransport + 'static,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut in_flight = JoinSet::new();

    tracing::info!(
        interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX),
        "poller started"
    );

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {
                tracing::debug!(in_flight = in_flight.len(), "poll tick");
                let engine = Arc::clone(&engine);
                in_flight.spawn(async move {
                    engine.poll_once().await;
                });
            }
            Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                if let Err(e) = joined
                    && e.is_panic()
                {
                    tracing::warn!(error = %e, "poll task panicked");
                }
            }
        }
    }

    in_flight.shutdown().await;
    tracing::info!("poller stopped");
}

//! Session lifecycle and stream orchestration.
//!
//! A [`Session`] owns one conversation: the transcript across turns, at
//! most one in-flight streaming request, and the snapshot channel
//! observers read. Submitting while a stream is in flight cancels and
//! joins the old stream first, so its late events are structurally
//! unobservable by the new request's state.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::client::{EventStream, SearchClient, StreamRequest};
use crate::error::ClientError;
use crate::events::StreamEvent;
use crate::history::Conversation;
use crate::state::{Role, StreamState};

/// Stream controller for one conversation.
pub struct Session {
    client: Arc<SearchClient>,
    state_tx: watch::Sender<StreamState>,
    active: Option<ActiveStream>,
}

struct ActiveStream {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl Session {
    pub fn new(client: SearchClient) -> Self {
        let (state_tx, _) = watch::channel(StreamState::new());
        Self {
            client: Arc::new(client),
            state_tx,
            active: None,
        }
    }

    /// Current state snapshot.
    pub fn snapshot(&self) -> StreamState {
        self.state_tx.borrow().clone()
    }

    /// Subscribe to snapshots; one is published after every reduced event.
    pub fn subscribe(&self) -> watch::Receiver<StreamState> {
        self.state_tx.subscribe()
    }

    pub fn is_streaming(&self) -> bool {
        self.state_tx.borrow().is_streaming()
    }

    /// Submit one query and start streaming its answer.
    ///
    /// Any in-flight stream is cancelled and joined first. The request
    /// carries the transcript as it stood before this turn; the new turn's
    /// user message and loading placeholder are appended locally.
    pub async fn submit(&mut self, query: &str) -> Result<(), ClientError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ClientError::EmptyQuery);
        }

        self.stop().await;

        let mut state = self.snapshot();
        let request = StreamRequest::new(query, state.messages.clone());
        state.begin_request(query);
        self.state_tx.send_replace(state.clone());

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(drive_stream(
            Arc::clone(&self.client),
            request,
            state,
            self.state_tx.clone(),
            cancel.clone(),
        ));
        self.active = Some(ActiveStream { cancel, handle });
        Ok(())
    }

    /// Cancel the in-flight stream, if any, and wait for it to finalize.
    ///
    /// Cancellation is not an error: the placeholder keeps whatever answer
    /// accumulated so far.
    pub async fn stop(&mut self) {
        if let Some(active) = self.active.take() {
            active.cancel.cancel();
            if let Err(e) = active.handle.await {
                tracing::warn!("stream task ended abnormally: {e}");
            }
        }
    }

    /// Wait for the in-flight stream to run to completion on its own.
    pub async fn wait(&mut self) {
        if let Some(active) = self.active.take() {
            if let Err(e) = active.handle.await {
                tracing::warn!("stream task ended abnormally: {e}");
            }
        }
    }

    /// Discard the conversation and return to idle.
    pub async fn reset(&mut self) {
        self.stop().await;
        self.state_tx.send_replace(StreamState::new());
    }

    /// Replace the transcript with a stored conversation.
    ///
    /// The token buffer is seeded with the last assistant turn so the
    /// live-answer view matches the restored transcript.
    pub async fn restore(&mut self, conversation: &Conversation) {
        self.stop().await;
        let mut state = StreamState::new();
        state.messages = conversation.messages.clone();
        state.token_buffer = conversation
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map(|m| m.content.clone())
            .unwrap_or_default();
        self.state_tx.send_replace(state);
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // The drive task observes the token at its next read and exits.
        if let Some(active) = &self.active {
            active.cancel.cancel();
        }
    }
}

/// Drive decode -> parse -> classify -> reduce for one request.
///
/// Reduction is synchronous between suspension points; the cancellation
/// token is observed at the next stream read, never mid-reduction. A
/// snapshot is published after every reduced event.
async fn drive_stream(
    client: Arc<SearchClient>,
    request: StreamRequest,
    mut state: StreamState,
    state_tx: watch::Sender<StreamState>,
    cancel: CancellationToken,
) {
    let opened = tokio::select! {
        _ = cancel.cancelled() => {
            state.finalize_cancelled();
            state_tx.send_replace(state);
            return;
        }
        opened = client.stream(&request) => opened,
    };

    let mut events: EventStream = match opened {
        Ok(events) => events,
        Err(e) => {
            tracing::error!("stream request failed: {e}");
            state.apply(StreamEvent::Error {
                message: e.to_string(),
            });
            state_tx.send_replace(state);
            return;
        }
    };

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("stream cancelled by user");
                state.finalize_cancelled();
                break;
            }
            next = events.next() => next,
        };

        match next {
            Some(Ok(event)) => {
                let terminal = matches!(event, StreamEvent::End | StreamEvent::Error { .. });
                state.apply(event);
                state_tx.send_replace(state.clone());
                if terminal {
                    return;
                }
            }
            Some(Err(e)) => {
                tracing::error!("stream transport error: {e}");
                state.apply(StreamEvent::Error {
                    message: e.to_string(),
                });
                state_tx.send_replace(state);
                return;
            }
            None => {
                // Transport closed without a terminal frame. Keep the
                // partial answer rather than discarding the turn.
                state.finalize_cancelled();
                break;
            }
        }
    }

    state_tx.send_replace(state);
}

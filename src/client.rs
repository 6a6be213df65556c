//! HTTP client for the agent stream endpoint.
//!
//! [`SearchClient::stream`] opens one streaming request and adapts the
//! response body into a lazy sequence of classified [`StreamEvent`]s:
//! bytes are fed through the [`FrameDecoder`] as they arrive, every
//! complete frame is classified, and dropped frames never reach the
//! caller. Events come out in exactly the order their frames appeared.

use std::collections::VecDeque;
use std::pin::Pin;

use futures_util::stream::{self, Stream};
use futures_util::StreamExt;
use reqwest::Client;

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::events::{classify, StreamEvent};
use crate::sse::FrameDecoder;
use crate::state::ChatMessage;

/// Body of a stream request: the query plus the transcript as it stood
/// before this turn.
#[derive(Debug, Clone, serde::Serialize)]
pub struct StreamRequest {
    pub query: String,
    pub messages: Vec<ChatMessage>,
}

impl StreamRequest {
    pub fn new(query: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            query: query.into(),
            messages,
        }
    }
}

/// Classified events produced by one streaming request.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, ClientError>> + Send>>;

/// Client for the agent-graph search backend.
pub struct SearchClient {
    config: ClientConfig,
    client: Client,
}

impl SearchClient {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Open one streaming request.
    ///
    /// A non-2xx response is a transport failure: the body text becomes the
    /// error message and no stream is returned. On success the returned
    /// stream yields classified events until the server sends its terminal
    /// frame or closes the connection; a connection error mid-stream is
    /// yielded as the final item.
    pub async fn stream(&self, request: &StreamRequest) -> Result<EventStream, ClientError> {
        let url = self.config.stream_url();

        let response = self
            .client
            .post(&url)
            .header("Accept", "text/event-stream")
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::Server { status, message });
        }

        let bytes_stream = response.bytes_stream();

        // Decoder state rides along with the byte stream; `pending` holds
        // events already classified out of the current chunk so one chunk
        // can yield many events.
        let events = stream::unfold(
            (
                bytes_stream,
                FrameDecoder::new(),
                VecDeque::<StreamEvent>::new(),
                false,
            ),
            |(mut bytes_stream, mut decoder, mut pending, mut finished)| async move {
                loop {
                    if let Some(event) = pending.pop_front() {
                        return Some((Ok(event), (bytes_stream, decoder, pending, finished)));
                    }
                    if finished {
                        return None;
                    }

                    match bytes_stream.next().await {
                        Some(Ok(chunk)) => {
                            for frame in decoder.feed(&chunk) {
                                if let Some(event) = classify(&frame) {
                                    pending.push_back(event);
                                }
                            }
                        }
                        Some(Err(e)) => {
                            finished = true;
                            return Some((
                                Err(ClientError::Http(e)),
                                (bytes_stream, decoder, pending, finished),
                            ));
                        }
                        None => {
                            // Transport closed: flush any unterminated frame.
                            finished = true;
                            if let Some(frame) = decoder.finish() {
                                if let Some(event) = classify(&frame) {
                                    pending.push_back(event);
                                }
                            }
                        }
                    }
                }
            },
        );

        Ok(Box::pin(events))
    }
}

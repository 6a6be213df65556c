//! Stream state and the event reducer.
//!
//! [`StreamState`] is the aggregate the rest of the crate observes: the
//! step timeline, the chat transcript, and the in-flight answer buffer.
//! [`StreamState::apply`] folds one classified event into the state; it is
//! synchronous, performs no I/O, and is total - events with no matching
//! transition leave the state untouched.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::events::{DomainEvent, ReplacePolicy, StreamEvent};

/// Role of a transcript turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Delivery status of a transcript turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    /// The turn is the in-flight placeholder still receiving tokens.
    Loading,
}

/// One transcript turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<MessageStatus>,
}

impl ChatMessage {
    /// A finished user turn.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            status: None,
        }
    }

    /// A finished assistant turn.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            status: None,
        }
    }

    /// The in-flight assistant placeholder.
    pub fn loading() -> Self {
        Self {
            role: Role::Assistant,
            content: String::new(),
            status: Some(MessageStatus::Loading),
        }
    }

    pub fn is_loading(&self) -> bool {
        self.status == Some(MessageStatus::Loading)
    }
}

/// Lifecycle of one unit of work in the agent graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Success,
}

/// One unit of work in the agent graph.
///
/// Created when a node announces it started; completed in place when the
/// node announces it finished. Steps are never removed within a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: u64,
    pub node: String,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Request lifecycle of the session's active stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Streaming,
    Errored,
    Ended,
}

/// Aggregate view folded from one request's event stream.
///
/// Owned and mutated exclusively by the session's drive loop; observers
/// read cloned snapshots.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamState {
    /// Step timeline, append-only within a request.
    pub steps: Vec<Step>,
    /// Chat transcript across turns.
    pub messages: Vec<ChatMessage>,
    /// Accumulating text of the in-flight answer.
    pub token_buffer: String,
    /// Name of the node currently executing.
    pub current_node: String,
    /// Request lifecycle state.
    pub phase: Phase,
    /// Fatal error surfaced to the user, if any.
    pub error: Option<String>,
    next_step_id: u64,
}

impl StreamState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_streaming(&self) -> bool {
        self.phase == Phase::Streaming
    }

    /// Reset transition for a new request.
    ///
    /// Steps, token buffer, error, and current node restart; the transcript
    /// is kept and gains the user turn plus a single loading placeholder.
    pub fn begin_request(&mut self, query: &str) {
        self.steps.clear();
        self.token_buffer.clear();
        self.current_node.clear();
        self.error = None;
        self.messages.push(ChatMessage::user(query));
        self.messages.push(ChatMessage::loading());
        self.phase = Phase::Streaming;
    }

    /// Fold one classified event into the state.
    pub fn apply(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::Heartbeat => {}
            StreamEvent::Error { message } => {
                self.error = Some(message);
                self.phase = Phase::Errored;
            }
            StreamEvent::End => {
                self.flush_answer();
                self.phase = Phase::Ended;
            }
            StreamEvent::Domain(domain) => self.apply_domain(domain),
        }
    }

    fn apply_domain(&mut self, event: DomainEvent) {
        match event {
            DomainEvent::NodeStarted { node } => {
                self.current_node = node.clone();
                let id = self.next_step_id();
                self.steps.push(Step {
                    id,
                    node,
                    status: StepStatus::Pending,
                    data: None,
                });
            }
            DomainEvent::NodeCompleted { data, .. } => {
                // Steps complete in the order they start; the most recently
                // appended step is the one running.
                if let Some(step) = self.steps.last_mut() {
                    step.status = StepStatus::Success;
                    step.data = (!data.is_null()).then_some(data);
                }
            }
            DomainEvent::ResetAnswerBuffer => self.token_buffer.clear(),
            DomainEvent::AnswerDelta { content } => self.token_buffer.push_str(&content),
            DomainEvent::TranscriptUpdate { messages, policy } => match policy {
                ReplacePolicy::Tail => {
                    if let (Some(slot), Some(update)) =
                        (self.messages.last_mut(), messages.into_iter().last())
                    {
                        *slot = update;
                    }
                }
                ReplacePolicy::Whole => self.messages = messages,
            },
            DomainEvent::StepReport { node, data } => {
                let id = self.next_step_id();
                self.steps.push(Step {
                    id,
                    node,
                    status: StepStatus::Success,
                    data: Some(data),
                });
            }
        }
    }

    /// Terminal transition for a cancelled or truncated stream.
    ///
    /// The placeholder keeps whatever answer accumulated; no error is
    /// recorded. A stopped stream still yields a coherent transcript.
    pub fn finalize_cancelled(&mut self) {
        self.flush_answer();
        self.phase = Phase::Ended;
    }

    /// Flush the token buffer into the transcript tail.
    ///
    /// A tail the server already finalized is only overwritten when fresh
    /// tokens arrived; an untouched placeholder always resolves, even to
    /// empty content.
    fn flush_answer(&mut self) {
        if let Some(last) = self.messages.last_mut() {
            if last.role == Role::Assistant && (last.is_loading() || !self.token_buffer.is_empty())
            {
                last.content = self.token_buffer.clone();
                last.status = None;
            }
        }
    }

    fn next_step_id(&mut self) -> u64 {
        self.next_step_id += 1;
        self.next_step_id
    }
}

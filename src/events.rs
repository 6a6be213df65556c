//! Payload classification for decoded frames.
//!
//! [`classify`] maps one parsed [`Frame`] to a tagged [`StreamEvent`].
//! Classification is where heterogeneous payloads become typed domain
//! events; it never fails loudly. Malformed JSON and unrecognized shapes
//! drop the frame with a log line so a newer backend cannot break an older
//! client.

use serde_json::Value;

use crate::sse::Frame;
use crate::state::ChatMessage;

/// Sentinel payload the backend sends as a heartbeat.
pub const KEEP_ALIVE: &str = ":keep-alive";

/// Fallback when an `error` frame carries an unreadable payload.
const INVALID_ERROR_FORMAT: &str = "Invalid error format";
/// Fallback when an `error` payload parses but names no error.
const UNKNOWN_ERROR: &str = "Unknown error";

/// One classified stream event.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Server-signaled fatal error.
    Error { message: String },
    /// Terminal end-of-stream marker.
    End,
    /// Keep-alive; reduces to nothing.
    Heartbeat,
    /// Agent-graph progress or output.
    Domain(DomainEvent),
}

/// How a server-sent message list is applied to the transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplacePolicy {
    /// Replace only the transcript tail with the list's last entry.
    Tail,
    /// Replace the whole transcript.
    Whole,
}

/// A mode-tagged domain event from the agent graph.
#[derive(Debug, Clone, PartialEq)]
pub enum DomainEvent {
    /// A graph node started executing.
    NodeStarted { node: String },
    /// The most recently started node finished, carrying its result.
    NodeCompleted { node: String, data: Value },
    /// A new answer is about to stream; the token buffer restarts.
    ResetAnswerBuffer,
    /// Server-authoritative transcript content.
    TranscriptUpdate {
        messages: Vec<ChatMessage>,
        policy: ReplacePolicy,
    },
    /// One token fragment of the in-flight answer.
    AnswerDelta { content: String },
    /// Informational graph snapshot, recorded as a completed step.
    StepReport { node: String, data: Value },
}

/// Classify one parsed frame.
///
/// Returns `None` for dropped frames: malformed JSON, unknown modes, and
/// unknown custom types.
pub fn classify(frame: &Frame) -> Option<StreamEvent> {
    if frame.event_type == "error" {
        return Some(StreamEvent::Error {
            message: error_message(frame.data.as_deref()),
        });
    }
    if frame.event_type == "end" {
        return Some(StreamEvent::End);
    }

    let data = match frame.data.as_deref() {
        Some(data) if !data.is_empty() => data,
        // A frame with no payload and no terminal meaning is a heartbeat.
        _ => return Some(StreamEvent::Heartbeat),
    };
    if data == KEEP_ALIVE {
        return Some(StreamEvent::Heartbeat);
    }

    let payload: Value = match serde_json::from_str(data) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::warn!(event_type = %frame.event_type, "dropping malformed frame: {e}");
            return None;
        }
    };

    let domain = match payload.get("mode").and_then(Value::as_str) {
        Some("custom") => classify_custom(&payload),
        Some("messages") => Some(DomainEvent::AnswerDelta {
            content: payload
                .pointer("/data/data/content")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        }),
        Some("updates") => classify_update(&payload),
        Some(mode) => {
            tracing::debug!(%mode, "ignoring event with unknown mode");
            None
        }
        None => {
            tracing::warn!("dropping frame without mode field");
            None
        }
    };
    domain.map(StreamEvent::Domain)
}

/// Extract the message from an `error` frame payload.
fn error_message(data: Option<&str>) -> String {
    let Some(data) = data else {
        return INVALID_ERROR_FORMAT.to_string();
    };
    match serde_json::from_str::<Value>(data) {
        Ok(payload) => payload
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or(UNKNOWN_ERROR)
            .to_string(),
        Err(_) => INVALID_ERROR_FORMAT.to_string(),
    }
}

/// `mode:"custom"` events carry node lifecycle and transcript control.
fn classify_custom(payload: &Value) -> Option<DomainEvent> {
    let data = payload.get("data")?;
    match data.get("type").and_then(Value::as_str)? {
        "node_execute" => {
            let node = step_node(payload, data)?;
            match data.pointer("/data/status").and_then(Value::as_str)? {
                "running" => Some(DomainEvent::NodeStarted { node }),
                "done" => Some(DomainEvent::NodeCompleted {
                    node,
                    data: data.pointer("/data/data").cloned().unwrap_or(Value::Null),
                }),
                status => {
                    tracing::debug!(%status, "ignoring node_execute with unknown status");
                    None
                }
            }
        }
        "update_stream_messages" => {
            let running =
                data.pointer("/data/status").and_then(Value::as_str) == Some("running");
            running.then_some(DomainEvent::ResetAnswerBuffer)
        }
        "update_messages" => Some(DomainEvent::TranscriptUpdate {
            messages: message_list(data.pointer("/data/messages")?)?,
            policy: ReplacePolicy::Tail,
        }),
        kind => {
            tracing::debug!(%kind, "ignoring custom event with unknown type");
            None
        }
    }
}

/// `mode:"updates"` events are graph snapshots: a full transcript when one
/// is carried, otherwise a completed-step record.
fn classify_update(payload: &Value) -> Option<DomainEvent> {
    let data = payload.get("data")?;
    if let Some(list) = data.get("messages") {
        return Some(DomainEvent::TranscriptUpdate {
            messages: message_list(list)?,
            policy: ReplacePolicy::Whole,
        });
    }
    let node = payload.get("node").and_then(Value::as_str)?.to_string();
    Some(DomainEvent::StepReport {
        node,
        data: data.clone(),
    })
}

/// The node a `node_execute` event refers to.
///
/// Carried in `data.node`, falling back to the envelope `node` field.
fn step_node(payload: &Value, data: &Value) -> Option<String> {
    data.get("node")
        .and_then(Value::as_str)
        .or_else(|| payload.get("node").and_then(Value::as_str))
        .map(str::to_string)
}

fn message_list(list: &Value) -> Option<Vec<ChatMessage>> {
    match serde_json::from_value(list.clone()) {
        Ok(messages) => Some(messages),
        Err(e) => {
            tracing::warn!("dropping transcript update with unreadable messages: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn frame(event_type: &str, data: &str) -> Frame {
        Frame {
            event_type: event_type.to_string(),
            data: Some(data.to_string()),
        }
    }

    #[test]
    fn test_error_frame_with_server_message() {
        let event = classify(&frame("error", r#"{"error": "search backend down"}"#)).unwrap();
        assert_eq!(
            event,
            StreamEvent::Error {
                message: "search backend down".to_string()
            }
        );
    }

    #[test]
    fn test_error_frame_without_error_field() {
        let event = classify(&frame("error", r#"{"status": 500}"#)).unwrap();
        assert_eq!(
            event,
            StreamEvent::Error {
                message: UNKNOWN_ERROR.to_string()
            }
        );
    }

    #[test]
    fn test_error_frame_with_invalid_json_never_fails() {
        let event = classify(&frame("error", "not json")).unwrap();
        assert_eq!(
            event,
            StreamEvent::Error {
                message: INVALID_ERROR_FORMAT.to_string()
            }
        );
    }

    #[test]
    fn test_end_frame_ignores_payload() {
        assert_eq!(classify(&frame("end", "whatever")), Some(StreamEvent::End));
        let bare = Frame {
            event_type: "end".to_string(),
            data: None,
        };
        assert_eq!(classify(&bare), Some(StreamEvent::End));
    }

    #[test]
    fn test_keep_alive_sentinel_is_heartbeat() {
        assert_eq!(
            classify(&frame("messages", KEEP_ALIVE)),
            Some(StreamEvent::Heartbeat)
        );
    }

    #[test]
    fn test_frame_without_data_is_heartbeat() {
        let bare = Frame {
            event_type: "custom".to_string(),
            data: None,
        };
        assert_eq!(classify(&bare), Some(StreamEvent::Heartbeat));
    }

    #[test]
    fn test_malformed_json_drops_frame() {
        assert_eq!(classify(&frame("messages", "{not json")), None);
    }

    #[test]
    fn test_unknown_mode_drops_frame() {
        assert_eq!(
            classify(&frame("messages", r#"{"mode": "telemetry", "data": {}}"#)),
            None
        );
    }

    #[test]
    fn test_node_execute_running() {
        let payload = json!({
            "mode": "custom",
            "node": "search",
            "data": {"type": "node_execute", "node": "search", "data": {"status": "running"}}
        });
        let event = classify(&frame("custom", &payload.to_string())).unwrap();
        assert_eq!(
            event,
            StreamEvent::Domain(DomainEvent::NodeStarted {
                node: "search".to_string()
            })
        );
    }

    #[test]
    fn test_node_execute_done_carries_result() {
        let payload = json!({
            "mode": "custom",
            "node": "search",
            "data": {
                "type": "node_execute",
                "node": "search",
                "data": {"status": "done", "data": {"query": "x"}}
            }
        });
        let event = classify(&frame("custom", &payload.to_string())).unwrap();
        assert_eq!(
            event,
            StreamEvent::Domain(DomainEvent::NodeCompleted {
                node: "search".to_string(),
                data: json!({"query": "x"}),
            })
        );
    }

    #[test]
    fn test_node_execute_falls_back_to_envelope_node() {
        let payload = json!({
            "mode": "custom",
            "node": "evaluate",
            "data": {"type": "node_execute", "data": {"status": "running"}}
        });
        let event = classify(&frame("custom", &payload.to_string())).unwrap();
        assert_eq!(
            event,
            StreamEvent::Domain(DomainEvent::NodeStarted {
                node: "evaluate".to_string()
            })
        );
    }

    #[test]
    fn test_update_stream_messages_running_resets_buffer() {
        let payload = json!({
            "mode": "custom",
            "node": "respond",
            "data": {"type": "update_stream_messages", "data": {"status": "running"}}
        });
        let event = classify(&frame("custom", &payload.to_string())).unwrap();
        assert_eq!(event, StreamEvent::Domain(DomainEvent::ResetAnswerBuffer));
    }

    #[test]
    fn test_update_stream_messages_done_is_dropped() {
        let payload = json!({
            "mode": "custom",
            "node": "respond",
            "data": {"type": "update_stream_messages", "data": {"status": "done"}}
        });
        assert_eq!(classify(&frame("custom", &payload.to_string())), None);
    }

    #[test]
    fn test_update_messages_is_tail_replace() {
        let payload = json!({
            "mode": "custom",
            "node": "respond",
            "data": {
                "type": "update_messages",
                "data": {"messages": [
                    {"role": "user", "content": "q"},
                    {"role": "assistant", "content": "final"}
                ]}
            }
        });
        let event = classify(&frame("custom", &payload.to_string())).unwrap();
        match event {
            StreamEvent::Domain(DomainEvent::TranscriptUpdate { messages, policy }) => {
                assert_eq!(policy, ReplacePolicy::Tail);
                assert_eq!(messages.len(), 2);
                assert_eq!(messages[1].content, "final");
            }
            other => panic!("expected TranscriptUpdate, got {:?}", other),
        }
    }

    #[test]
    fn test_messages_mode_is_answer_delta() {
        let payload = json!({"mode": "messages", "data": {"data": {"content": "hi"}}});
        let event = classify(&frame("messages", &payload.to_string())).unwrap();
        assert_eq!(
            event,
            StreamEvent::Domain(DomainEvent::AnswerDelta {
                content: "hi".to_string()
            })
        );
    }

    #[test]
    fn test_messages_mode_without_content_is_empty_delta() {
        let payload = json!({"mode": "messages", "data": {"data": {"id": "chunk-1"}}});
        let event = classify(&frame("messages", &payload.to_string())).unwrap();
        assert_eq!(
            event,
            StreamEvent::Domain(DomainEvent::AnswerDelta {
                content: String::new()
            })
        );
    }

    #[test]
    fn test_updates_mode_with_messages_is_whole_replace() {
        let payload = json!({
            "mode": "updates",
            "node": "respond",
            "data": {"messages": [{"role": "assistant", "content": "all of it"}]}
        });
        let event = classify(&frame("updates", &payload.to_string())).unwrap();
        match event {
            StreamEvent::Domain(DomainEvent::TranscriptUpdate { messages, policy }) => {
                assert_eq!(policy, ReplacePolicy::Whole);
                assert_eq!(messages.len(), 1);
            }
            other => panic!("expected TranscriptUpdate, got {:?}", other),
        }
    }

    #[test]
    fn test_updates_mode_without_messages_is_step_report() {
        let payload = json!({
            "mode": "updates",
            "node": "web_search",
            "data": {"results": 5}
        });
        let event = classify(&frame("updates", &payload.to_string())).unwrap();
        assert_eq!(
            event,
            StreamEvent::Domain(DomainEvent::StepReport {
                node: "web_search".to_string(),
                data: json!({"results": 5}),
            })
        );
    }

    #[test]
    fn test_transcript_update_with_unreadable_messages_is_dropped() {
        let payload = json!({
            "mode": "updates",
            "node": "respond",
            "data": {"messages": [{"role": "narrator", "content": "?"}]}
        });
        assert_eq!(classify(&frame("updates", &payload.to_string())), None);
    }
}

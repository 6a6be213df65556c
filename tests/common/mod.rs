//! Common test utilities for integration tests.
//!
//! Provides SSE body builders matching the backend's wire format and a
//! mock backend helper serving a canned stream.

// Each test binary uses its own subset of these helpers.
#![allow(dead_code)]

use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use rill::client::SearchClient;
use rill::config::ClientConfig;
use rill::session::Session;

/// One wire frame: optional `event:` line, optional `data:` line, blank
/// line terminator.
pub fn frame(event: Option<&str>, data: Option<&str>) -> String {
    let mut out = String::new();
    if let Some(event) = event {
        out.push_str(&format!("event:{event}\n"));
    }
    if let Some(data) = data {
        out.push_str(&format!("data:{data}\n"));
    }
    out.push('\n');
    out
}

pub fn node_running(node: &str) -> String {
    let payload = json!({
        "mode": "custom",
        "node": node,
        "data": {"type": "node_execute", "node": node, "data": {"status": "running"}}
    });
    frame(Some("custom"), Some(&payload.to_string()))
}

pub fn node_done(node: &str, data: Value) -> String {
    let payload = json!({
        "mode": "custom",
        "node": node,
        "data": {"type": "node_execute", "node": node, "data": {"status": "done", "data": data}}
    });
    frame(Some("custom"), Some(&payload.to_string()))
}

pub fn reset_buffer(node: &str) -> String {
    let payload = json!({
        "mode": "custom",
        "node": node,
        "data": {"type": "update_stream_messages", "data": {"status": "running"}}
    });
    frame(Some("custom"), Some(&payload.to_string()))
}

pub fn token(content: &str) -> String {
    let payload = json!({"mode": "messages", "data": {"data": {"content": content}}});
    frame(Some("messages"), Some(&payload.to_string()))
}

pub fn keep_alive() -> String {
    frame(None, Some(":keep-alive"))
}

pub fn end_frame() -> String {
    frame(Some("end"), None)
}

pub fn error_frame(message: &str) -> String {
    let payload = json!({"error": message});
    frame(Some("error"), Some(&payload.to_string()))
}

/// Mock backend serving `body` for every stream request.
pub async fn mock_backend(body: String) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/llm/search/stream"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;
    server
}

/// A session pointed at `base_url`.
pub fn session_for(base_url: &str) -> Session {
    Session::new(SearchClient::new(
        ClientConfig::new().with_base_url(base_url),
    ))
}

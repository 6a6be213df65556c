//! rill - a streaming chat client for agent-graph search backends
//!
//! The backend answers a query by running a multi-step agent graph
//! (search, retrieval, evaluation, response generation) and pushes its
//! progress as an SSE stream. This crate consumes that stream and folds
//! it into three incrementally updated views: a step timeline, a live
//! token buffer, and a chat transcript.
//!
//! Data flows one way:
//!
//! raw bytes -> frames ([`sse`]) -> classified events ([`events`]) ->
//! state deltas ([`state`]) -> observable snapshots ([`session`])

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod history;
pub mod session;
pub mod sse;
pub mod state;

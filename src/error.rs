//! Client error types.
//!
//! Only transport failures and explicit server error events ever surface
//! to the user; decode and classification failures are contained inside
//! the pipeline (see [`crate::events`]).

use thiserror::Error;

/// Errors surfaced by the streaming client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The request could not be sent or the connection dropped mid-stream.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server rejected the request before streaming started.
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// An empty query was submitted.
    #[error("query must not be empty")]
    EmptyQuery,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_error_display() {
        let err = ClientError::Server {
            status: 500,
            message: "Internal Server Error".to_string(),
        };
        let display = format!("{}", err);
        assert!(display.contains("500"));
        assert!(display.contains("Internal Server Error"));
    }

    #[test]
    fn test_empty_query_display() {
        assert_eq!(
            format!("{}", ClientError::EmptyQuery),
            "query must not be empty"
        );
    }
}

/*
[INPUT]:  Error sources (URL building, WebSocket transport, timeouts, serialization)
[OUTPUT]: Structured error types with retry hints
[POS]:    Error handling layer - unified error types for the streaming crate
[UPDATE]: When adding new error sources or changing connect semantics
*/

use std::time::Duration;

use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Main error type for the market stream client
#[derive(Error, Debug)]
pub enum StreamError {
    /// `connect` was called without any stream
    #[error("At least one stream is required to open a session")]
    EmptyStreamList,

    /// Session URL could not be built
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// WebSocket transport failed
    #[error("WebSocket error: {0}")]
    WebSocket(Box<tungstenite::Error>),

    /// Transport closed before the session opened
    #[error("Connection closed: {0}")]
    Closed(String),

    /// Transport did not open within the configured bound
    #[error("Connection timeout after {}ms", .after.as_millis())]
    ConnectTimeout { after: Duration },

    /// Session was torn down before it opened
    #[error("Session cancelled before it opened")]
    Cancelled,

    /// Serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<tungstenite::Error> for StreamError {
    fn from(err: tungstenite::Error) -> Self {
        StreamError::WebSocket(Box::new(err))
    }
}

impl StreamError {
    /// Check if the error is worth retrying with the same stream list
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StreamError::WebSocket(_) | StreamError::Closed(_) | StreamError::ConnectTimeout { .. }
        )
    }
}

/// Result type alias for stream operations
pub type Result<T> = std::result::Result<T, StreamError>;

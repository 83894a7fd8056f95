//! Error types for RPC operations.

use thiserror::Error;

/// Result type for RPC operations.
pub type Result<T> = std::result::Result<T, RpcError>;

/// Boxed error raised by a callback service.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error type for RPC operations.
#[derive(Debug, Error)]
pub enum RpcError {
    /// The peer sent a message with an id outside the protocol.
    #[error("unexpected message id {0}")]
    UnexpectedMessageId(u32),

    /// The stream ended before the final response arrived.
    #[error("stream closed before final response")]
    StreamClosed,

    /// A response did not have the expected shape.
    #[error("bad response shape: {0}")]
    BadResponseShape(String),

    /// Failed to spawn the plugin process.
    #[error("failed to spawn plugin: {0}")]
    SpawnFailed(String),

    /// Failed to communicate with the plugin.
    #[error("transport error: {0}")]
    Transport(String),

    /// Framing or protocol violation.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The plugin answered with an error.
    #[error("remote error: {0}")]
    Remote(String),

    /// The engine-side callback failed.
    #[error("callback failed: {0}")]
    Callback(#[source] BoxError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Timeout waiting for a response.
    #[error("timeout waiting for response")]
    Timeout,
}

impl RpcError {
    pub fn bad_shape(msg: impl Into<String>) -> Self {
        Self::BadResponseShape(msg.into())
    }

    pub fn spawn_failed(msg: impl Into<String>) -> Self {
        Self::SpawnFailed(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    pub fn remote(msg: impl Into<String>) -> Self {
        Self::Remote(msg.into())
    }

    pub fn callback(err: impl Into<BoxError>) -> Self {
        Self::Callback(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RpcError::UnexpectedMessageId(42);
        assert_eq!(err.to_string(), "unexpected message id 42");

        let err = RpcError::spawn_failed("no such file");
        assert!(err.to_string().contains("spawn"));
        assert!(err.to_string().contains("no such file"));

        let err = RpcError::callback("dep type unknown");
        assert!(err.to_string().contains("dep type unknown"));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err: RpcError = json_err.into();
        assert!(matches!(err, RpcError::Json(_)));
    }
}

//! Error types for MCP operations.

use thiserror::Error;

/// Errors from decoding or encoding a single wire message.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error("Unknown message type: {0}")]
    UnknownMessageType(String),

    #[error("Message exceeds {limit} bytes")]
    MessageTooLarge { limit: usize },
}

impl CodecError {
    /// Whether the stream can no longer be trusted after this error.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, CodecError::UnknownMessageType(_))
    }
}

/// Errors from MCP session and client communication.
#[derive(Debug, Error)]
pub enum McpError {
    #[error("Failed to spawn MCP server '{name}': {source}")]
    SpawnFailed {
        name: String,
        source: std::io::Error,
    },

    #[error("MCP handshake failed: {0}")]
    Handshake(String),

    #[error("JSON-RPC error (code {code}): {message}")]
    JsonRpc { code: i64, message: String },

    #[error("MCP protocol error: {0}")]
    Protocol(String),

    #[error("MCP request '{method}' timed out after {timeout_ms}ms")]
    Timeout { method: String, timeout_ms: u64 },

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("MCP session is closed")]
    SessionClosed,

    #[error("Connection to MCP peer was lost")]
    ConnectionLost,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_unknown_message_type_is_recoverable() {
        assert!(!CodecError::UnknownMessageType("x".into()).is_fatal());
        assert!(CodecError::MalformedMessage("x".into()).is_fatal());
        assert!(CodecError::MessageTooLarge { limit: 10 }.is_fatal());
    }

    #[test]
    fn codec_error_is_transparent() {
        let err: McpError = CodecError::MalformedMessage("bad json".into()).into();
        assert_eq!(err.to_string(), "Malformed message: bad json");
    }
}

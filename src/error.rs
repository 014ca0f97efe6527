//! Error types for the Retro Party client.

use thiserror::Error;

/// Errors that can occur when using the Retro Party client.
#[derive(Debug, Error)]
pub enum RetroClientError {
    /// Failed to send a message through the realtime transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a message from the realtime transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection was closed unexpectedly.
    #[error("transport connection closed")]
    TransportClosed,

    /// Failed to serialize or deserialize a protocol message.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The realtime channel is not running.
    #[error("not connected to server")]
    NotConnected,

    /// The server answered a request with a non-success status.
    #[error("server returned {status}: {}", message.as_deref().unwrap_or("no message"))]
    Api {
        /// HTTP status code.
        status: u16,
        /// Human-readable message from the response body, if any.
        message: Option<String>,
    },

    /// The request could not be performed (connection refused, bad URL, …).
    #[error("request failed: {0}")]
    Http(String),

    /// Local validation rejected the input before any request was sent.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RetroClientError {
    /// The message the server attached to a rejected request, if any.
    ///
    /// Used to build user-facing notices; every other variant yields `None`
    /// so callers fall back to a generic message.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            Self::Api { message, .. } => message.as_deref().filter(|m| !m.trim().is_empty()),
            Self::InvalidInput(reason) => Some(reason.as_str()),
            _ => None,
        }
    }
}

/// A specialized [`Result`] type for Retro Party client operations.
pub type Result<T> = std::result::Result<T, RetroClientError>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn api_error_exposes_server_message() {
        let err = RetroClientError::Api {
            status: 409,
            message: Some("Round already complete".into()),
        };
        assert_eq!(err.server_message(), Some("Round already complete"));
        assert_eq!(err.to_string(), "server returned 409: Round already complete");
    }

    #[test]
    fn blank_server_message_is_ignored() {
        let err = RetroClientError::Api {
            status: 500,
            message: Some("   ".into()),
        };
        assert_eq!(err.server_message(), None);
    }

    #[test]
    fn transport_errors_have_no_server_message() {
        assert_eq!(RetroClientError::Timeout.server_message(), None);
        assert_eq!(RetroClientError::NotConnected.server_message(), None);
    }
}

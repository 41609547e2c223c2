//! Error types for phoenix-link

use thiserror::Error;

/// Errors surfaced by the socket client.
///
/// Transport failures are reported through [`EventHandlers`](crate::EventHandlers)
/// and never through this type; it only covers the recoverable outcomes a
/// caller awaits on (joins, pushes, configuration).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PhoenixLinkError {
    /// The endpoint or options cannot form a usable WebSocket URL.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Opening or writing to the WebSocket failed.
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    /// A message could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// No reply arrived within the configured window.
    #[error("Timeout: {0}")]
    TimeoutError(String),

    /// The server answered a join with `status: "error"`.
    #[error("Join rejected: {reason}")]
    JoinRejected { reason: String },

    /// The topic was never registered with `channel()` or has been left.
    #[error("No channel found for topic: {0}")]
    UnknownTopic(String),

    /// The background connection task is no longer running.
    #[error("Connection task is not running")]
    ConnectionClosed,
}

/// Result type for socket operations
pub type Result<T> = std::result::Result<T, PhoenixLinkError>;

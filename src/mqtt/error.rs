//! Error definitions for the MQTT session engine

use thiserror::Error;

/// Errors surfaced by the session controller.
///
/// None of these are returned to callers of [`Session`](super::session::Session)
/// operations. The controller stores the outcome of the most recent operation
/// as its single current error, and consumers poll it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The broker address is not a well-formed URL with a host
    #[error("Invalid broker URL. Please enter a valid URL.")]
    InvalidAddress(String),

    /// A subscribe or publish was requested without a live connection
    #[error("Not connected to MQTT broker")]
    NotConnected,

    /// Topic was empty or whitespace only
    #[error("Topic cannot be empty")]
    EmptyTopic,

    /// Payload was empty or whitespace only
    #[error("Message cannot be empty")]
    EmptyPayload,

    /// The broker connection dropped mid-session
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// The connect attempt was rejected, timed out or could not be started
    #[error("Connection failed: {0}")]
    ConnectFailed(String),

    /// A wire-level subscribe, unsubscribe, publish or disconnect failed
    #[error("{0}")]
    OperationFailed(String),
}

/// Failures reported by a wire collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    #[error("client handle is not connected")]
    NotStarted,

    #[error("request queue rejected the request: {0}")]
    Request(String),

    #[error("transport setup failed: {0}")]
    Transport(String),
}

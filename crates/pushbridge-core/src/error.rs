//! Error types for the delivery engine.

use thiserror::Error;

/// Failure writing to or closing a peer channel.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Channel closed")]
    Closed,
}

/// Connection registry errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// A live connection already exists for this identity.
    #[error("User {0} is already connected")]
    DuplicateIdentity(String),
}

/// Correlation table errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CorrelationError {
    #[error("Duplicate correlation id: {0}")]
    DuplicateCorrelation(String),

    /// No open flow for this id, or its deadline has passed.
    #[error("No pending flow for correlation id: {0}")]
    NotFound(String),

    #[error("Reply stream already consumed: {0}")]
    AlreadyConsumed(String),
}

/// Terminal outcomes of a request/response flow.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StreamError {
    #[error("User not connected")]
    NotConnected { identity: String },

    #[error("Connection lost")]
    ConnectionLost,

    #[error("Timeout waiting for response")]
    Timeout,

    #[error("Duplicate correlation id: {0}")]
    DuplicateCorrelation(String),

    #[error("Missing correlation id")]
    MissingCorrelationId,

    #[error("Reply stream unavailable: {0}")]
    Unavailable(String),
}

impl From<CorrelationError> for StreamError {
    fn from(err: CorrelationError) -> Self {
        match err {
            CorrelationError::DuplicateCorrelation(id) => StreamError::DuplicateCorrelation(id),
            other => StreamError::Unavailable(other.to_string()),
        }
    }
}

//! Error types for the event bus adapter

use crate::message::{CloseEvent, Failure, State};
use thiserror::Error;

/// Errors reported synchronously by a [`Delegate`](crate::delegate::Delegate)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DelegateError {
    /// The operation is not allowed in the current connection state
    #[error("Invalid state: {0}")]
    InvalidState(State),

    /// Any other error raised by the underlying client
    #[error("{0}")]
    Other(String),
}

/// Errors that terminate an event bus stream
#[derive(Error, Debug)]
pub enum EventBusError {
    /// The connection was closed uncleanly
    #[error("Connection closed: {0}")]
    Closed(CloseEvent),

    /// A business-level failure reply
    #[error("Failure reply: {0}")]
    Failure(Failure),

    /// The underlying client raised an error
    #[error("Delegate error: {0}")]
    Delegate(#[from] DelegateError),

    /// Failed to serialize/deserialize a message body
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EventBusError {
    /// The close event, when this error comes from an unclean transport close
    pub fn close_event(&self) -> Option<&CloseEvent> {
        match self {
            EventBusError::Closed(event) => Some(event),
            _ => None,
        }
    }

    /// The failure reply, when this error is a business failure
    pub fn failure(&self) -> Option<&Failure> {
        match self {
            EventBusError::Failure(failure) => Some(failure),
            _ => None,
        }
    }
}

/// Result type for event bus operations
pub type Result<T> = std::result::Result<T, EventBusError>;

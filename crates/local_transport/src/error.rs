//! Error types for the in-process transport.

use thiserror::Error;

/// Failures reported by listeners, peers and the registry.
///
/// Each variant names one precise cause so a caller one layer up can decide
/// between retrying (`NotFound`, `QueueFull`) and giving up (`Closed`).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("No listener registered under name: {0}")]
    NotFound(String),

    #[error("Listener or connection already at EOF: {0}")]
    Closed(String),

    #[error("Accept queue of listener {name} is full (capacity {capacity})")]
    QueueFull { name: String, capacity: usize },

    #[error("Connection {0} is already peered")]
    AlreadyPeered(String),

    #[error("A listener is already registered under name: {0}")]
    AlreadyRegistered(String),

    #[error("Listener name cannot be empty")]
    InvalidName,

    #[error("Connection {0} has no peer")]
    NotConnected(String),
}

impl TransportError {
    /// True for failures that may succeed if the caller tries again later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::QueueFull { .. })
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, TransportError>;

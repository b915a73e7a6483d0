//! Common error types for sidegate.

use std::sync::Arc;
use thiserror::Error;

/// Top-level error type for cache, vault and gateway operations.
///
/// The type is `Clone` so that one failed computation can be handed to
/// every caller waiting on it.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// A required backing store is not configured.
    #[error("Service not ready: {0}")]
    Configuration(String),

    /// Wrong token, or an inheritance attempt across owners.
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A storage key resolved outside of its storage root.
    #[error("Security violation: {0}")]
    Security(String),

    /// The wrapped producer of a memoized call failed.
    #[error("Producer failed: {0}")]
    Producer(String),

    /// Remote store or upstream request failed.
    #[error("Network error: {0}")]
    Network(String),

    /// Sandbox runtime call failed.
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(Arc<std::io::Error>),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(Arc::new(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl Error {
    /// Whether this error means the service is missing configuration.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::Configuration(_))
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;

//! Error types for the homestream core.

use thiserror::Error;

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while syncing a connection.
#[derive(Debug, Error)]
pub enum Error {
    /// Provider rejected the connection credentials. Fatal to the run.
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Malformed input caught before any network call.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Timeout or connection failure while talking to a provider.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Non-2xx provider response.
    #[error("Provider API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Failure in the persistence collaborator.
    #[error("Repository error: {0}")]
    Repository(String),

    /// Failure decrypting or loading connection credentials.
    #[error("Credential error: {0}")]
    Credential(String),

    /// JSON serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl Error {
    /// Create an authentication error.
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Create an API error from status and message.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Create a repository error.
    pub fn repository(message: impl Into<String>) -> Self {
        Self::Repository(message.into())
    }

    /// Create a credential error.
    pub fn credential(message: impl Into<String>) -> Self {
        Self::Credential(message.into())
    }

    /// HTTP status if this is an API error.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

//! Error types for the RESO client crate.

use thiserror::Error;

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, ResoError>;

/// Retry policy class for provider failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiRetryClass {
    Retryable,
    Permanent,
    ReauthRequired,
}

/// Errors that can occur while talking to an MLS provider.
#[derive(Debug, Error)]
pub enum ResoError {
    /// Credentials rejected by the provider. Fatal to the run.
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Malformed input caught before any network call.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Transport failure (timeout, connection refused).
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-2xx provider response.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ResoError {
    /// Create an authentication error.
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create an API error from status and message.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// HTTP status if this is an API error.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Classify error for the caller's whole-run retry policy. The client
    /// never retries internally.
    pub fn retry_class(&self) -> ApiRetryClass {
        match self {
            Self::Api { status, .. } => match *status {
                401 | 403 => ApiRetryClass::ReauthRequired,
                408 | 423 | 425 | 429 => ApiRetryClass::Retryable,
                500..=599 => ApiRetryClass::Retryable,
                _ => ApiRetryClass::Permanent,
            },
            Self::Transport(_) => ApiRetryClass::Retryable,
            Self::Authentication(_) => ApiRetryClass::ReauthRequired,
            Self::Validation(_) | Self::Json(_) => ApiRetryClass::Permanent,
        }
    }
}

impl From<ResoError> for homestream_core::Error {
    fn from(err: ResoError) -> Self {
        match err {
            ResoError::Authentication(message) => Self::Authentication(message),
            ResoError::Validation(message) => Self::Validation(message),
            ResoError::Transport(source) => Self::Transport(source.to_string()),
            ResoError::Api { status, message } => Self::Api { status, message },
            ResoError::Json(source) => Self::Serialization(source),
        }
    }
}

/// Exponential backoff in seconds with cap, for the caller's whole-run
/// retry loop.
pub fn backoff_seconds(consecutive_failures: i32) -> i64 {
    const MAX_EXPONENT: i32 = 8;
    const BASE_DELAY_SECONDS: i64 = 5;

    let capped = i64::from(consecutive_failures.clamp(0, MAX_EXPONENT));
    2_i64.pow(capped as u32) * BASE_DELAY_SECONDS
}

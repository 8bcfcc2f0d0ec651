//! Error types for the remote store client.

use ledgerline_core::sync::{classify_http_status, RemoteError, SyncRetryClass};
use thiserror::Error;

/// Result type alias for remote store client operations.
pub type Result<T> = std::result::Result<T, RemoteStoreClientError>;

#[derive(Debug, Error)]
pub enum RemoteStoreClientError {
    /// Transport failure: connect, timeout or broken body.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Non-success response from the store.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// No session, or a token that cannot be sent.
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl RemoteStoreClientError {
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth(message.into())
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Classify error for retry policy.
    pub fn retry_class(&self) -> SyncRetryClass {
        match self {
            Self::Api { status, .. } => classify_http_status(*status),
            Self::Http(_) => SyncRetryClass::Retryable,
            Self::Json(_) | Self::InvalidRequest(_) | Self::Config(_) => SyncRetryClass::Permanent,
            Self::Auth(_) => SyncRetryClass::ReauthRequired,
        }
    }
}

impl From<RemoteStoreClientError> for RemoteError {
    fn from(err: RemoteStoreClientError) -> Self {
        RemoteError {
            class: err.retry_class(),
            status: err.status_code(),
            message: err.to_string(),
        }
    }
}

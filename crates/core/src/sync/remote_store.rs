//! Contract for the remote authoritative store.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::sync_model::SyncTable;

/// Retry policy classification for remote failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncRetryClass {
    Retryable,
    Permanent,
    ReauthRequired,
}

impl SyncRetryClass {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Retryable => "retryable",
            Self::Permanent => "permanent",
            Self::ReauthRequired => "reauth_required",
        }
    }
}

/// Classify HTTP status into retry behavior.
pub fn classify_http_status(status: u16) -> SyncRetryClass {
    match status {
        401 | 403 => SyncRetryClass::ReauthRequired,
        408 | 409 | 423 | 425 | 429 => SyncRetryClass::Retryable,
        500..=599 => SyncRetryClass::Retryable,
        _ => SyncRetryClass::Permanent,
    }
}

/// Failure reported by a `RemoteStore` implementation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct RemoteError {
    pub class: SyncRetryClass,
    pub status: Option<u16>,
    pub message: String,
}

impl RemoteError {
    pub fn new(class: SyncRetryClass, message: impl Into<String>) -> Self {
        Self {
            class,
            status: None,
            message: message.into(),
        }
    }

    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            class: classify_http_status(status),
            status: Some(status),
            message: message.into(),
        }
    }

    pub fn retryable(message: impl Into<String>) -> Self {
        Self::new(SyncRetryClass::Retryable, message)
    }

    pub fn is_retryable(&self) -> bool {
        self.class == SyncRetryClass::Retryable
    }

    pub fn requires_reauth(&self) -> bool {
        self.class == SyncRetryClass::ReauthRequired
    }
}

/// Incremental keyset select, ordered by `(updated_at, id)`.
///
/// Without `after_id` a row passes when its `updated_at` is strictly after
/// `updated_after`. With `after_id` the cursor is the pair, so rows sharing
/// `updated_after` pass when their id sorts after `after_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFilter {
    pub updated_after: Option<NaiveDateTime>,
    pub after_id: Option<String>,
    pub limit: usize,
}

impl RemoteFilter {
    /// Whether a row keyed by `(updated_at, id)` sorts after the cursor.
    pub fn admits(&self, updated_at: Option<NaiveDateTime>, id: Option<&str>) -> bool {
        let Some(mark) = self.updated_after else {
            return true;
        };
        let Some(updated_at) = updated_at else {
            return false;
        };
        match (&self.after_id, id) {
            (Some(after), Some(id)) => {
                updated_at > mark || (updated_at == mark && id > after.as_str())
            }
            _ => updated_at > mark,
        }
    }
}

/// Row-oriented CRUD over the remote store. Rows travel as JSON objects keyed
/// by column name.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn select(&self, table: SyncTable, filter: &RemoteFilter) -> Result<Vec<Value>, RemoteError>;

    /// Upsert by primary key, so a retried insert never duplicates a row.
    async fn insert(&self, table: SyncTable, row: &Value) -> Result<(), RemoteError>;

    async fn update(&self, table: SyncTable, id: &str, partial: &Value) -> Result<(), RemoteError>;

    /// Deleting a row that does not exist succeeds.
    async fn delete(&self, table: SyncTable, id: &str) -> Result<(), RemoteError>;
}

/// Tells the engine whether a signed-in session exists.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn access_token(&self) -> Option<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_http_status_for_retry_policy() {
        assert_eq!(classify_http_status(500), SyncRetryClass::Retryable);
        assert_eq!(classify_http_status(429), SyncRetryClass::Retryable);
        assert_eq!(classify_http_status(401), SyncRetryClass::ReauthRequired);
        assert_eq!(classify_http_status(400), SyncRetryClass::Permanent);
    }

    #[test]
    fn remote_error_keeps_status_and_class() {
        let err = RemoteError::from_status(503, "unavailable");
        assert!(err.is_retryable());
        assert_eq!(err.status, Some(503));
        assert!(RemoteError::from_status(403, "denied").requires_reauth());
    }
}

//! Error types shared by every Ledgerline crate.

use thiserror::Error;

use crate::sync::RemoteError;

/// Result type alias used across the core crate and its storage adapters.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Database operation failed: {0}")]
    Database(#[from] DatabaseError),

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Remote store error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Reconciliation rejected: {0}")]
    Reconciliation(#[from] ReconciliationError),

    #[error("Sync error: {0}")]
    Sync(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Pool error: {0}")]
    PoolError(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("Foreign key violated: {0}")]
    ForeignKeyViolation(String),

    #[error("Writer actor unavailable: {0}")]
    WriterUnavailable(String),

    #[error("Internal database error: {0}")]
    Internal(String),
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Missing field: {0}")]
    MissingField(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Unsupported sync table: {0}")]
    UnsupportedTable(String),
}

/// Local precondition failures for a reconciliation merge. Never retried.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReconciliationError {
    #[error("Transaction {0} not found")]
    TransactionNotFound(String),

    #[error("Transaction {0} is already reconciled into another record")]
    AlreadyReconciled(String),

    #[error("A transaction cannot be reconciled into itself ({0})")]
    SelfMerge(String),

    #[error("Transaction {id} has capture method {capture_method}; expected {expected}")]
    WrongCaptureMethod {
        id: String,
        capture_method: String,
        expected: &'static str,
    },

    #[error("Transactions {manual_id} and {imported_id} differ in {field}")]
    Mismatch {
        manual_id: String,
        imported_id: String,
        field: &'static str,
    },
}

impl Error {
    pub fn not_found(what: impl Into<String>) -> Self {
        Error::Database(DatabaseError::NotFound(what.into()))
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Error::Validation(ValidationError::InvalidInput(message.into()))
    }

    /// True for errors that leave local state untouched and are worth retrying on the next trigger.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Remote(err) => err.is_retryable(),
            Error::Database(DatabaseError::ConnectionFailed(_))
            | Error::Database(DatabaseError::PoolError(_))
            | Error::Database(DatabaseError::WriterUnavailable(_)) => true,
            _ => false,
        }
    }
}

//! Storage errors and their mapping into core errors.

use diesel::result::{DatabaseErrorKind, Error as DieselError};
use thiserror::Error;

use ledgerline_core::errors::{DatabaseError, Error};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Query failed: {0}")]
    QueryFailed(#[from] DieselError),

    #[error("Connection failed: {0}")]
    ConnectionFailed(#[from] diesel::ConnectionError),

    #[error("Pool error: {0}")]
    PoolError(#[from] diesel::r2d2::PoolError),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Invalid stored value: {0}")]
    InvalidValue(String),

    #[error("Writer actor unavailable: {0}")]
    WriterUnavailable(String),
}

impl From<StorageError> for Error {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::QueryFailed(DieselError::NotFound) => {
                Error::Database(DatabaseError::NotFound("Record not found".to_string()))
            }
            StorageError::QueryFailed(DieselError::DatabaseError(kind, info)) => {
                let message = info.message().to_string();
                match kind {
                    DatabaseErrorKind::UniqueViolation => {
                        Error::Database(DatabaseError::UniqueViolation(message))
                    }
                    DatabaseErrorKind::ForeignKeyViolation => {
                        Error::Database(DatabaseError::ForeignKeyViolation(message))
                    }
                    _ => Error::Database(DatabaseError::Internal(message)),
                }
            }
            StorageError::QueryFailed(other) => {
                Error::Database(DatabaseError::Internal(other.to_string()))
            }
            StorageError::ConnectionFailed(err) => {
                Error::Database(DatabaseError::ConnectionFailed(err.to_string()))
            }
            StorageError::PoolError(err) => Error::Database(DatabaseError::PoolError(err.to_string())),
            StorageError::MigrationFailed(message) => {
                Error::Database(DatabaseError::MigrationFailed(message))
            }
            StorageError::InvalidValue(message) => Error::Database(DatabaseError::Internal(message)),
            StorageError::WriterUnavailable(message) => {
                Error::Database(DatabaseError::WriterUnavailable(message))
            }
        }
    }
}

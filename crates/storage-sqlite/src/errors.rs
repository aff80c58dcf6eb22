//! Storage-specific error types for SQLite operations.
//!
//! Diesel and r2d2 errors never leave this crate. They are wrapped in
//! [`StorageError`] and converted to [`FetchError::Storage`] at the trait
//! boundary.

use diesel::result::Error as DieselError;
use thiserror::Error;
use tufe_core::errors::FetchError;

/// Storage-specific errors that wrap Diesel and r2d2 types.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database connection failed: {0}")]
    ConnectionFailed(#[from] diesel::ConnectionError),

    #[error("Connection pool error: {0}")]
    PoolError(#[from] r2d2::Error),

    #[error("Query execution failed: {0}")]
    QueryFailed(#[from] DieselError),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// A stored row could not be mapped onto a domain type, or back.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Writer actor unavailable: {0}")]
    WriterUnavailable(String),

    #[error("Core error: {0}")]
    CoreError(String),
}

/// Convert a core error raised inside a write job (for the write actor's
/// transaction wrapper).
impl From<FetchError> for StorageError {
    fn from(err: FetchError) -> Self {
        StorageError::CoreError(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::SerializationError(err.to_string())
    }
}

impl From<StorageError> for FetchError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::QueryFailed(DieselError::DatabaseError(
                diesel::result::DatabaseErrorKind::UniqueViolation,
                info,
            )) => FetchError::Storage(format!("unique violation: {}", info.message())),
            // A job that failed with a core error keeps its original message.
            StorageError::CoreError(message) => FetchError::Storage(message),
            other => FetchError::Storage(other.to_string()),
        }
    }
}

/// Extension trait for converting Diesel and r2d2 results to core results.
pub trait IntoCore<T> {
    fn into_core(self) -> tufe_core::Result<T>;
}

impl<T> IntoCore<T> for std::result::Result<T, DieselError> {
    fn into_core(self) -> tufe_core::Result<T> {
        self.map_err(|e| StorageError::from(e).into())
    }
}

impl<T> IntoCore<T> for std::result::Result<T, r2d2::Error> {
    fn into_core(self) -> tufe_core::Result<T> {
        self.map_err(|e| StorageError::from(e).into())
    }
}

impl<T> IntoCore<T> for std::result::Result<T, serde_json::Error> {
    fn into_core(self) -> tufe_core::Result<T> {
        self.map_err(|e| StorageError::from(e).into())
    }
}

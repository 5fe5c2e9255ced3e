//! Error types for the store module.

use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A row references something that does not exist, or is still
    /// referenced by something else.
    #[error("constraint violated: {0}")]
    Constraint(String),

    /// Invalid data in storage.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// A lock guarding the backend was poisoned by a panicking writer.
    #[error("store lock poisoned: {0}")]
    Poisoned(String),

    /// The blocking worker running a transaction failed.
    #[error("blocking task failed: {0}")]
    Task(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

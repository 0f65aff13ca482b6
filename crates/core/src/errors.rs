//! Shared error types for the core crate.

use thiserror::Error;

/// Result type alias used across the core crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the local database layer.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// A query against the local store failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// A connection could not be obtained from the pool.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Schema migrations could not be applied.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Catch-all for internal storage invariant violations.
    #[error("{0}")]
    Internal(String),
}

/// Top-level error type for core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Local database error
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid input supplied by a caller
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Create an invalid input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }
}

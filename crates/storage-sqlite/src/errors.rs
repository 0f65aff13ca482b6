//! Storage-layer error type, mapped into the core error at the boundary.

use thiserror::Error;

use thriftly_core::errors::{DatabaseError, Error};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Query failed: {0}")]
    QueryFailed(#[from] diesel::result::Error),

    #[error("Connection failed: {0}")]
    ConnectionFailed(#[from] diesel::r2d2::PoolError),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

impl From<StorageError> for Error {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::QueryFailed(e) => {
                Error::Database(DatabaseError::QueryFailed(e.to_string()))
            }
            StorageError::ConnectionFailed(e) => {
                Error::Database(DatabaseError::ConnectionFailed(e.to_string()))
            }
            StorageError::MigrationFailed(message) => {
                Error::Database(DatabaseError::MigrationFailed(message))
            }
        }
    }
}

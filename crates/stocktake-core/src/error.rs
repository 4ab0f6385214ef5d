//! Error types for stocktake-core

use thiserror::Error;

/// Result type alias using stocktake-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in stocktake-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Submission or conflict not found
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Submission rejected before entering the queue
    #[error("Validation error: {0}")]
    Validation(String),

    /// Record is not in a leasable state (already SYNCING, SYNCED or CONFLICT)
    #[error("Record already leased or terminal: {0}")]
    AlreadyLeased(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

//! Common error types for ranksync

use thiserror::Error;

/// Common result type for ranksync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the ranksync crates
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Value read from storage or a remote payload could not be interpreted
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for SQLite write-contention failures that are worth retrying
    /// (`SQLITE_BUSY` / `SQLITE_LOCKED`).
    pub fn is_conflict(&self) -> bool {
        match self {
            #[cfg(feature = "sqlx")]
            Error::Database(sqlx::Error::Database(db_err)) => {
                matches!(db_err.code().as_deref(), Some("5") | Some("6") | Some("517"))
                    || db_err.message().contains("database is locked")
            }
            #[cfg(feature = "sqlx")]
            Error::Database(sqlx::Error::PoolTimedOut) => true,
            _ => false,
        }
    }
}

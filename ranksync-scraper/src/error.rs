//! Error types for ranksync-scraper
//!
//! A `FetchError` or an exhausted conflict retry fails one sync cycle; the
//! scheduler logs it and tries again on the next cycle. Nothing here is
//! process-fatal.

use thiserror::Error;

/// Remote ranking service errors
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("API error {0}: {1}")]
    ApiError(u16, String),

    #[error("Parse error: {0}")]
    ParseError(String),

    /// Pagination did not terminate within the configured page budget
    #[error("Page limit of {0} reached before results were exhausted")]
    PageLimit(u32),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout(err.to_string())
        } else if err.is_decode() {
            FetchError::ParseError(err.to_string())
        } else {
            FetchError::NetworkError(err.to_string())
        }
    }
}

/// Sync cycle errors
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Storage error: {0}")]
    Storage(#[from] ranksync_common::Error),

    /// Write contention outlasted the retry budget for one transaction
    #[error("{operation} still conflicting after {attempts} attempts: {last}")]
    ConflictRetriesExhausted {
        operation: String,
        attempts: u32,
        last: ranksync_common::Error,
    },
}

impl From<sqlx::Error> for SyncError {
    fn from(err: sqlx::Error) -> Self {
        SyncError::Storage(ranksync_common::Error::Database(err))
    }
}

/// Result type for sync operations
pub type SyncResult<T> = Result<T, SyncError>;

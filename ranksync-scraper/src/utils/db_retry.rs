//! Database Retry Logic
//!
//! Retries a storage operation when SQLite reports write contention.
//! Loops of different sources can touch the same map row, so occasional
//! `database is locked` errors are expected and resolved by retrying.
//!
//! **Backoff Strategy:**
//! - Initial delay: 10ms
//! - Max delay: 1000ms
//! - Multiplier: 2.0 (exponential)

use std::time::{Duration, Instant};

use crate::error::SyncError;

/// Retry a database operation up to `max_attempts` times on conflict errors.
///
/// Non-conflict errors are returned immediately. When every attempt hits a
/// conflict the last error is returned as `ConflictRetriesExhausted`, which
/// fails the current cycle.
///
/// # Arguments
/// * `operation_name` - Name for logging (e.g., "apply qualified diff")
/// * `max_attempts` - Total attempts including the first one
/// * `operation` - Async closure that performs the database operation
pub async fn retry_on_conflict<F, Fut, T>(
    operation_name: &str,
    max_attempts: u32,
    mut operation: F,
) -> Result<T, SyncError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = ranksync_common::Result<T>>,
{
    let max_attempts = max_attempts.max(1);
    let start_time = Instant::now();
    let mut attempt = 0;
    let mut backoff_ms = 10u64;

    loop {
        attempt += 1;

        if attempt > 1 {
            tracing::debug!(
                operation = operation_name,
                attempt,
                "Retrying database operation"
            );
        }

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::info!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = start_time.elapsed().as_millis(),
                        "Database operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(err) => {
                if !err.is_conflict() {
                    return Err(SyncError::Storage(err));
                }

                if attempt >= max_attempts {
                    tracing::error!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = start_time.elapsed().as_millis(),
                        "Database operation failed: conflict retries exhausted"
                    );
                    return Err(SyncError::ConflictRetriesExhausted {
                        operation: operation_name.to_string(),
                        attempts: attempt,
                        last: err,
                    });
                }

                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    backoff_ms,
                    error = %err,
                    "Database conflict, will retry after backoff"
                );

                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms = (backoff_ms * 2).min(1000);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ranksync_common::Error;

    fn conflict() -> Error {
        // Treated as contention by Error::is_conflict
        Error::Database(sqlx::Error::PoolTimedOut)
    }

    #[tokio::test]
    async fn test_retry_succeeds_first_attempt() {
        let result = retry_on_conflict("test_op", 3, || async { Ok::<i32, Error>(42) }).await;

        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_conflicts() {
        let mut attempts = 0;

        let result = retry_on_conflict("test_op", 3, || {
            attempts += 1;
            let current = attempts;
            async move {
                if current < 3 {
                    Err(conflict())
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_max_attempts() {
        let mut attempts = 0;

        let result = retry_on_conflict("test_op", 3, || {
            attempts += 1;
            async { Err::<i32, Error>(conflict()) }
        })
        .await;

        assert_eq!(attempts, 3);
        match result {
            Err(SyncError::ConflictRetriesExhausted { attempts, operation, .. }) => {
                assert_eq!(attempts, 3);
                assert_eq!(operation, "test_op");
            }
            other => panic!("expected ConflictRetriesExhausted, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_non_conflict_error_fails_immediately() {
        let mut attempts = 0;

        let result = retry_on_conflict("test_op", 5, || {
            attempts += 1;
            async { Err::<i32, Error>(Error::Internal("other error".to_string())) }
        })
        .await;

        assert!(matches!(result, Err(SyncError::Storage(_))));
        assert_eq!(attempts, 1);
    }
}

//! Transaction timing instrumentation
//!
//! Both loops of every source share one SQLite file. A transaction that is
//! held for a long time blocks the other writers, so hold times are logged.

use sqlx::{Sqlite, SqliteConnection, Transaction};
use std::time::Instant;
use ranksync_common::Result;

/// Transaction wrapper that logs acquisition and release timing
pub struct MonitoredTransaction<'c> {
    tx: Option<Transaction<'c, Sqlite>>,
    caller: &'static str,
    acquired_at: Instant,
}

impl<'c> MonitoredTransaction<'c> {
    fn new(tx: Transaction<'c, Sqlite>, caller: &'static str, acquired_at: Instant) -> Self {
        Self {
            tx: Some(tx),
            caller,
            acquired_at,
        }
    }

    /// Connection to run statements on inside the transaction
    pub fn conn(&mut self) -> &mut SqliteConnection {
        // Only `commit` takes the transaction, and it consumes `self`
        &mut **self.tx.as_mut().expect("Transaction already consumed")
    }

    /// Commit the transaction and log how long it was held
    pub async fn commit(mut self) -> Result<()> {
        let held_ms = self.acquired_at.elapsed().as_millis();
        let tx = self.tx.take().expect("Transaction already consumed");

        tx.commit().await?;

        if held_ms > 2000 {
            tracing::warn!(
                caller = self.caller,
                held_ms = held_ms,
                "Long transaction, other sync loops were blocked meanwhile"
            );
        } else {
            tracing::debug!(caller = self.caller, held_ms = held_ms, "Transaction committed");
        }

        Ok(())
    }
}

impl<'c> Drop for MonitoredTransaction<'c> {
    fn drop(&mut self) {
        if self.tx.is_some() {
            // sqlx rolls the transaction back when it is dropped
            tracing::debug!(
                caller = self.caller,
                held_ms = self.acquired_at.elapsed().as_millis(),
                "Transaction rolled back (dropped without commit)"
            );
        }
    }
}

/// Begin a transaction that logs pool wait and hold times
pub async fn begin_monitored<'c>(
    pool: &'c sqlx::SqlitePool,
    caller: &'static str,
) -> Result<MonitoredTransaction<'c>> {
    let start = Instant::now();

    let tx = pool.begin().await?;

    let wait_ms = start.elapsed().as_millis();
    if wait_ms > 1000 {
        tracing::warn!(
            caller = caller,
            wait_ms = wait_ms,
            "Slow connection acquisition, pool may be saturated"
        );
    } else {
        tracing::debug!(caller = caller, wait_ms = wait_ms, "Connection acquired");
    }

    Ok(MonitoredTransaction::new(tx, caller, Instant::now()))
}

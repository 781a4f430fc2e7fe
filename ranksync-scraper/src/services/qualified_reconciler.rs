//! Qualified set reconciliation
//!
//! Qualification can be withdrawn at any time, so every cycle fetches the
//! complete qualified list and diffs it against the snapshot of the last
//! successful cycle:
//!
//! 1. Fetch the full list (no cutoff). A fetch failure ends the cycle
//!    before anything is written.
//! 2. Expand the fetched hashes to every known hash of the same maps.
//! 3. `to_add = current - previous`, `to_remove = previous - current`.
//! 4. One transaction: clear removed maps, flag added maps, stamp the
//!    qualified date of added difficulties.
//!
//! Unmapped entries still list their hash, so they qualify their map and
//! feed its date. They have no difficulty to stamp.
//! 5. Notify changed maps, then replace the snapshot.
//!
//! The snapshot is owned by `QualifiedContext`, which the qualified loop
//! holds exclusively and passes into each cycle.

use chrono::{DateTime, Utc};
use ranksync_common::events::ChangeKind;
use sqlx::SqlitePool;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info};

use crate::db::catalog;
use crate::error::SyncResult;
use crate::services::change_notifier::ChangeNotifier;
use crate::services::coalesce::{earliest, resolve_timestamp};
use crate::services::page_fetcher::PageFetcher;
use crate::sources::{ListFilter, RankingSource, RemoteEntry, UnmappedEntry};
use crate::utils::{begin_monitored, retry_on_conflict};

/// Hashes believed qualified as of the last successful cycle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QualifiedSnapshot {
    hashes: BTreeSet<String>,
}

impl QualifiedSnapshot {
    pub fn new(hashes: BTreeSet<String>) -> Self {
        Self { hashes }
    }

    pub fn hashes(&self) -> &BTreeSet<String> {
        &self.hashes
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.hashes.contains(hash)
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }
}

/// Added/removed delta between two snapshots
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QualifiedDiff {
    pub to_add: BTreeSet<String>,
    pub to_remove: BTreeSet<String>,
}

impl QualifiedDiff {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

pub fn diff_snapshot(previous: &BTreeSet<String>, current: &BTreeSet<String>) -> QualifiedDiff {
    QualifiedDiff {
        to_add: current.difference(previous).cloned().collect(),
        to_remove: previous.difference(current).cloned().collect(),
    }
}

/// State carried by the qualified loop between cycles
#[derive(Debug, Default)]
pub struct QualifiedContext {
    /// `None` until loaded from storage
    snapshot: Option<QualifiedSnapshot>,
}

impl QualifiedContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a known snapshot instead of loading one from storage
    pub fn with_snapshot(snapshot: QualifiedSnapshot) -> Self {
        Self {
            snapshot: Some(snapshot),
        }
    }

    pub fn snapshot(&self) -> Option<&QualifiedSnapshot> {
        self.snapshot.as_ref()
    }
}

/// Summary of one qualified cycle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QualifiedReport {
    pub fetched: usize,
    pub unmapped: usize,
    pub added: usize,
    pub removed: usize,
    /// Difficulty entries that matched no local difficulty
    pub skipped: usize,
    pub rows_written: u64,
    pub notified: usize,
    pub snapshot_size: usize,
}

#[derive(Debug, Default)]
struct ApplyOutcome {
    rows_written: u64,
    skipped: usize,
    changed_maps: BTreeSet<i64>,
}

/// Reconciles one source's qualified list with storage
pub struct QualifiedSetReconciler {
    pool: SqlitePool,
    source: Arc<dyn RankingSource>,
    fetcher: PageFetcher,
    notifier: ChangeNotifier,
    max_conflict_retries: u32,
}

impl QualifiedSetReconciler {
    pub fn new(
        pool: SqlitePool,
        source: Arc<dyn RankingSource>,
        fetcher: PageFetcher,
        notifier: ChangeNotifier,
        max_conflict_retries: u32,
    ) -> Self {
        Self {
            pool,
            source,
            fetcher,
            notifier,
            max_conflict_retries,
        }
    }

    /// Run one cycle against `ctx`.
    ///
    /// On error the context is left exactly as it was.
    pub async fn reconcile(&self, ctx: &mut QualifiedContext) -> SyncResult<QualifiedReport> {
        let kind = self.source.kind();

        if ctx.snapshot.is_none() {
            let hashes = retry_on_conflict("load qualified snapshot", self.max_conflict_retries, || {
                self.load_snapshot()
            })
            .await?;
            info!(source = %kind, hashes = hashes.len(), "Loaded qualified snapshot from storage");
            ctx.snapshot = Some(QualifiedSnapshot::new(hashes));
        }

        let outcome = self
            .fetcher
            .fetch_all(self.source.as_ref(), ListFilter::Qualified, None)
            .await?;

        let mut report = QualifiedReport {
            fetched: outcome.entries.len(),
            unmapped: outcome.unmapped.len(),
            ..Default::default()
        };

        let groups = group_by_hash(outcome.entries);
        let unmapped = group_unmapped(outcome.unmapped);
        let fetched_hashes: BTreeSet<String> =
            groups.keys().chain(unmapped.keys()).cloned().collect();

        let current = retry_on_conflict("expand qualified aliases", self.max_conflict_retries, || {
            self.expand(&fetched_hashes)
        })
        .await?;

        let previous = ctx.snapshot.as_ref().map(|s| s.hashes.clone()).unwrap_or_default();
        let diff = diff_snapshot(&previous, &current);
        report.added = diff.to_add.len();
        report.removed = diff.to_remove.len();

        if !diff.is_empty() {
            let now = ranksync_common::time::now();
            let applied = retry_on_conflict("apply qualified diff", self.max_conflict_retries, || {
                self.apply_diff(&diff, &current, &groups, &unmapped, now)
            })
            .await?;

            report.rows_written = applied.rows_written;
            report.skipped = applied.skipped;
            report.notified = self.notifier.notify(applied.changed_maps, ChangeKind::Qualified);
        }

        report.snapshot_size = current.len();
        ctx.snapshot = Some(QualifiedSnapshot::new(current));

        info!(
            source = %kind,
            fetched = report.fetched,
            added = report.added,
            removed = report.removed,
            rows_written = report.rows_written,
            notified = report.notified,
            "Qualified reconciliation complete"
        );

        Ok(report)
    }

    async fn load_snapshot(&self) -> ranksync_common::Result<BTreeSet<String>> {
        let mut conn = self.pool.acquire().await?;
        catalog::load_qualified_hashes(&mut conn, self.source.kind()).await
    }

    async fn expand(&self, hashes: &BTreeSet<String>) -> ranksync_common::Result<BTreeSet<String>> {
        let mut conn = self.pool.acquire().await?;
        catalog::expand_to_aliases(&mut conn, hashes).await
    }

    async fn apply_diff(
        &self,
        diff: &QualifiedDiff,
        current: &BTreeSet<String>,
        groups: &BTreeMap<String, Vec<RemoteEntry>>,
        unmapped: &BTreeMap<String, Vec<UnmappedEntry>>,
        now: DateTime<Utc>,
    ) -> ranksync_common::Result<ApplyOutcome> {
        let kind = self.source.kind();
        let mut outcome = ApplyOutcome::default();
        let mut tx = begin_monitored(&self.pool, "qualified_reconcile").await?;

        let current_rows = catalog::maps_for_hashes(tx.conn(), kind, current).await?;
        let current_maps: BTreeSet<i64> = current_rows.iter().map(|row| row.map_id).collect();

        // A map stays qualified while any of its hashes is still listed
        let removed_rows = catalog::maps_for_hashes(tx.conn(), kind, &diff.to_remove).await?;
        let mut cleared = BTreeSet::new();
        for row in removed_rows {
            if current_maps.contains(&row.map_id) || !cleared.insert(row.map_id) {
                continue;
            }
            if row.qualified {
                outcome.rows_written +=
                    catalog::set_map_qualified(tx.conn(), kind, row.map_id, false, None).await?;
                outcome.changed_maps.insert(row.map_id);
            }
        }

        let added_maps: BTreeSet<i64> = current_rows
            .iter()
            .filter(|row| diff.to_add.contains(&row.hash))
            .map(|row| row.map_id)
            .collect();

        for map_id in &added_maps {
            let map_hashes: Vec<_> = current_rows.iter().filter(|row| row.map_id == *map_id).collect();
            let Some(stored) = map_hashes.first() else {
                continue;
            };

            let mapped_dates = map_hashes
                .iter()
                .filter_map(|row| groups.get(&row.hash))
                .flatten()
                .map(|entry| entry.qualified_at);
            let unmapped_dates = map_hashes
                .iter()
                .filter_map(|row| unmapped.get(&row.hash))
                .flatten()
                .map(|entry| entry.qualified_at);
            let source_date = earliest(mapped_dates.chain(unmapped_dates));
            let resolved = resolve_timestamp(source_date, stored.qualified_at, now);

            if !stored.qualified || stored.qualified_at != Some(resolved) {
                outcome.rows_written +=
                    catalog::set_map_qualified(tx.conn(), kind, *map_id, true, Some(resolved)).await?;
                outcome.changed_maps.insert(*map_id);
            }
        }

        for hash in &diff.to_add {
            for entry in groups.get(hash).into_iter().flatten() {
                let difficulty = catalog::find_difficulty(
                    tx.conn(),
                    kind,
                    &entry.content_hash,
                    entry.characteristic,
                    entry.difficulty,
                )
                .await?;

                let Some(difficulty) = difficulty else {
                    debug!(
                        source = %kind,
                        hash = %entry.content_hash,
                        characteristic = %entry.characteristic,
                        difficulty = %entry.difficulty,
                        "No local difficulty for qualified entry, skipping"
                    );
                    outcome.skipped += 1;
                    continue;
                };

                let qualified_at = resolve_timestamp(entry.qualified_at, difficulty.qualified_at, now);
                if difficulty.qualified_at != Some(qualified_at) {
                    outcome.rows_written +=
                        catalog::update_difficulty_qualified_at(tx.conn(), kind, difficulty.id, qualified_at)
                            .await?;
                }
            }
        }

        tx.commit().await?;
        Ok(outcome)
    }
}

/// Group entries by content hash
pub fn group_by_hash(entries: Vec<RemoteEntry>) -> BTreeMap<String, Vec<RemoteEntry>> {
    let mut groups: BTreeMap<String, Vec<RemoteEntry>> = BTreeMap::new();
    for entry in entries {
        groups.entry(entry.content_hash.clone()).or_default().push(entry);
    }
    groups
}

/// Group unmapped entries by content hash
pub fn group_unmapped(entries: Vec<UnmappedEntry>) -> BTreeMap<String, Vec<UnmappedEntry>> {
    let mut groups: BTreeMap<String, Vec<UnmappedEntry>> = BTreeMap::new();
    for entry in entries {
        groups.entry(entry.content_hash.clone()).or_default().push(entry);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_diff_example() {
        let diff = diff_snapshot(&set(&["A", "B"]), &set(&["B", "C"]));
        assert_eq!(diff.to_add, set(&["C"]));
        assert_eq!(diff.to_remove, set(&["A"]));
    }

    #[test]
    fn test_identical_sets_produce_empty_diff() {
        let diff = diff_snapshot(&set(&["A", "B"]), &set(&["A", "B"]));
        assert!(diff.is_empty());
    }

    #[test]
    fn test_cold_start_adds_everything() {
        let diff = diff_snapshot(&BTreeSet::new(), &set(&["A"]));
        assert_eq!(diff.to_add, set(&["A"]));
        assert!(diff.to_remove.is_empty());
    }

    #[test]
    fn test_context_starts_unloaded() {
        let ctx = QualifiedContext::new();
        assert!(ctx.snapshot().is_none());

        let ctx = QualifiedContext::with_snapshot(QualifiedSnapshot::new(set(&["A"])));
        let snapshot = ctx.snapshot().unwrap();
        assert!(snapshot.contains("A"));
        assert_eq!(snapshot.len(), 1);
        assert!(!snapshot.is_empty());
    }
}

//! Incremental ranked merge
//!
//! Ranked status is never withdrawn, so the ranked loop only asks for
//! entries newer than the latest ranked date already stored (the
//! watermark). The watermark is read from storage at the start of every
//! cycle and never cached: whatever a cycle commits moves it forward for
//! the next one.
//!
//! All writes of a cycle share one transaction. Notifications go out
//! only after it commits.
//!
//! Unmapped entries rank their map and feed its date without touching
//! any difficulty.

use chrono::{DateTime, Utc};
use ranksync_common::events::ChangeKind;
use sqlx::SqlitePool;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info};

use crate::db::catalog::{self, MapRow};
use crate::error::SyncResult;
use crate::services::change_notifier::ChangeNotifier;
use crate::services::coalesce::{earliest, normalize_star_rating, resolve_timestamp};
use crate::services::page_fetcher::PageFetcher;
use crate::services::qualified_reconciler::{group_by_hash, group_unmapped};
use crate::sources::{ListFilter, RankingSource, RemoteEntry, UnmappedEntry};
use crate::utils::{begin_monitored, retry_on_conflict};

/// Summary of one ranked cycle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RankedReport {
    /// Watermark the fetch was bounded by
    pub watermark: Option<DateTime<Utc>>,
    pub fetched: usize,
    pub unmapped: usize,
    /// Entries that matched no local difficulty
    pub skipped: usize,
    pub rows_written: u64,
    /// Maps matched by a fetched hash
    pub affected: BTreeSet<i64>,
    pub notified: usize,
}

#[derive(Debug, Default)]
struct MergeOutcome {
    rows_written: u64,
    skipped: usize,
    affected: BTreeSet<i64>,
}

/// Merges one source's newly ranked entries into storage
pub struct RankedWatermarkMerger {
    pool: SqlitePool,
    source: Arc<dyn RankingSource>,
    fetcher: PageFetcher,
    notifier: ChangeNotifier,
    max_conflict_retries: u32,
}

impl RankedWatermarkMerger {
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

    /// Run one cycle, returns the maps that were touched
    pub async fn merge_ranked(&self) -> SyncResult<RankedReport> {
        let kind = self.source.kind();

        let watermark = retry_on_conflict("read ranked watermark", self.max_conflict_retries, || {
            self.read_watermark()
        })
        .await?;

        debug!(source = %kind, watermark = ?watermark, "Fetching ranked entries after watermark");

        let outcome = self
            .fetcher
            .fetch_all(self.source.as_ref(), ListFilter::Ranked, watermark)
            .await?;

        let mut report = RankedReport {
            watermark,
            fetched: outcome.entries.len(),
            unmapped: outcome.unmapped.len(),
            ..Default::default()
        };

        if outcome.entries.is_empty() && outcome.unmapped.is_empty() {
            info!(source = %kind, watermark = ?watermark, "No newly ranked entries");
            return Ok(report);
        }

        let groups = group_by_hash(outcome.entries);
        let unmapped = group_unmapped(outcome.unmapped);
        let now = ranksync_common::time::now();

        let merged = retry_on_conflict("merge ranked entries", self.max_conflict_retries, || {
            self.apply(&groups, &unmapped, now)
        })
        .await?;

        report.rows_written = merged.rows_written;
        report.skipped = merged.skipped;
        report.notified = self
            .notifier
            .notify(merged.affected.iter().copied(), ChangeKind::Ranked);
        report.affected = merged.affected;

        info!(
            source = %kind,
            fetched = report.fetched,
            skipped = report.skipped,
            rows_written = report.rows_written,
            maps = report.affected.len(),
            "Ranked merge complete"
        );

        Ok(report)
    }

    async fn read_watermark(&self) -> ranksync_common::Result<Option<DateTime<Utc>>> {
        let mut conn = self.pool.acquire().await?;
        catalog::read_ranked_watermark(&mut conn, self.source.kind()).await
    }

    async fn apply(
        &self,
        groups: &BTreeMap<String, Vec<RemoteEntry>>,
        unmapped: &BTreeMap<String, Vec<UnmappedEntry>>,
        now: DateTime<Utc>,
    ) -> ranksync_common::Result<MergeOutcome> {
        let kind = self.source.kind();
        let mut outcome = MergeOutcome::default();
        let mut tx = begin_monitored(&self.pool, "ranked_merge").await?;

        // Stored map row and earliest ranked date across all fetched hashes of the map
        let mut maps: BTreeMap<i64, (MapRow, Option<DateTime<Utc>>)> = BTreeMap::new();

        let hashes: BTreeSet<&String> = groups.keys().chain(unmapped.keys()).collect();

        for hash in hashes {
            let mut group_dates = Vec::new();

            for entry in groups.get(hash).into_iter().flatten() {
                let difficulty = catalog::find_difficulty(
                    tx.conn(),
                    kind,
                    hash,
                    entry.characteristic,
                    entry.difficulty,
                )
                .await?;

                let Some(difficulty) = difficulty else {
                    debug!(
                        source = %kind,
                        hash = %hash,
                        characteristic = %entry.characteristic,
                        difficulty = %entry.difficulty,
                        "No local difficulty for ranked entry, skipping"
                    );
                    outcome.skipped += 1;
                    group_dates.push(entry.ranked_at);
                    continue;
                };

                let stars = normalize_star_rating(entry.star_rating);
                let ranked_at = resolve_timestamp(entry.ranked_at, difficulty.ranked_at, now);
                let qualified_at = resolve_timestamp(entry.qualified_at, difficulty.qualified_at, now);
                group_dates.push(Some(ranked_at));

                let unchanged = difficulty.stars == stars
                    && difficulty.ranked_at == Some(ranked_at)
                    && difficulty.qualified_at == Some(qualified_at);
                if !unchanged {
                    outcome.rows_written += catalog::update_difficulty_ranked(
                        tx.conn(),
                        kind,
                        difficulty.id,
                        stars,
                        ranked_at,
                        qualified_at,
                    )
                    .await?;
                }
            }

            group_dates.extend(
                unmapped
                    .get(hash)
                    .into_iter()
                    .flatten()
                    .map(|entry| entry.ranked_at),
            );

            let group_earliest = earliest(group_dates);
            for row in catalog::maps_for_hashes(tx.conn(), kind, [hash]).await? {
                let slot = maps.entry(row.map_id).or_insert((row, None));
                slot.1 = earliest([slot.1, group_earliest]);
            }
        }

        for (map_id, (stored, group_date)) in maps {
            // Earliest ranked difficulty wins, including dates committed by earlier cycles
            let source_date = earliest([group_date, stored.ranked_at]);
            let ranked_at = resolve_timestamp(source_date, stored.ranked_at, now);
            if !stored.ranked || stored.ranked_at != Some(ranked_at) {
                outcome.rows_written += catalog::set_map_ranked(tx.conn(), kind, map_id, ranked_at).await?;
            }
            outcome.affected.insert(map_id);
        }

        tx.commit().await?;
        Ok(outcome)
    }
}

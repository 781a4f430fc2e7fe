//! BeatLeader leaderboard client
//!
//! `GET /leaderboards?type={qualified|ranked}&sortBy=timestamp&order=asc&count=N&page=N&date_from=S`
//!
//! Results are sorted ascending by timestamp and `date_from` narrows the
//! list server-side, which makes incremental ranked fetches cheap.
//! Timestamps are Unix seconds; `0` means "not set".

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ranksync_common::catalog::{Characteristic, DifficultyTier, RankStatus, SourceKind};
use ranksync_common::config::SourceConfig;
use ranksync_common::time::from_unix_seconds;
use serde::Deserialize;

use super::{
    endpoint, HttpFetcher, Listing, PageMetadata, PageQuery, RankingSource, RemoteEntry, SourcePage,
    UnmappedEntry,
};
use crate::error::FetchError;

#[derive(Debug, Deserialize)]
struct BeatLeaderList {
    metadata: Option<PageMetadata>,
    #[serde(default)]
    data: Vec<BeatLeaderLeaderboard>,
}

#[derive(Debug, Deserialize)]
struct BeatLeaderLeaderboard {
    song: BeatLeaderSong,
    difficulty: BeatLeaderDifficulty,
}

#[derive(Debug, Deserialize)]
struct BeatLeaderSong {
    hash: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BeatLeaderDifficulty {
    #[serde(default)]
    stars: Option<f64>,
    difficulty_name: String,
    mode_name: String,
    status: i64,
    #[serde(default)]
    nominated_time: Option<i64>,
    #[serde(default)]
    qualified_time: Option<i64>,
    #[serde(default)]
    ranked_time: Option<i64>,
}

fn unix_time(value: Option<i64>) -> Option<DateTime<Utc>> {
    value.filter(|secs| *secs > 0).and_then(from_unix_seconds)
}

impl BeatLeaderLeaderboard {
    fn into_listing(self) -> Listing {
        let content_hash = self.song.hash.to_lowercase();
        let status = RankStatus::from_status_code(self.difficulty.status);
        let qualified_at = unix_time(self.difficulty.qualified_time);
        let ranked_at = unix_time(self.difficulty.ranked_time);

        // Mods create characteristics the catalog does not know about
        let characteristic = Characteristic::from_mode_name(&self.difficulty.mode_name);
        let difficulty = DifficultyTier::from_name(&self.difficulty.difficulty_name);

        match characteristic.zip(difficulty) {
            Some((characteristic, difficulty)) => Listing::Mapped(RemoteEntry {
                content_hash,
                characteristic,
                difficulty,
                star_rating: self.difficulty.stars.unwrap_or(0.0),
                status,
                nominated_at: unix_time(self.difficulty.nominated_time),
                qualified_at,
                ranked_at,
            }),
            None => Listing::Unmapped(UnmappedEntry {
                content_hash,
                status,
                qualified_at,
                ranked_at,
            }),
        }
    }
}

/// BeatLeader API client
pub struct BeatLeaderClient {
    http: HttpFetcher,
    base_url: String,
}

impl BeatLeaderClient {
    pub fn new(config: &SourceConfig) -> Result<Self, FetchError> {
        Ok(Self {
            http: HttpFetcher::new(config)?,
            base_url: config.base_url.clone(),
        })
    }
}

#[async_trait]
impl RankingSource for BeatLeaderClient {
    fn kind(&self) -> SourceKind {
        SourceKind::BeatLeader
    }

    async fn fetch_page(&self, query: &PageQuery) -> Result<SourcePage, FetchError> {
        let url = endpoint(&self.base_url, "leaderboards");
        let date_from = query.since.map(|ts| ts.timestamp()).unwrap_or(0);
        let params = [
            ("type", query.filter.as_str().to_string()),
            ("sortBy", "timestamp".to_string()),
            ("order", "asc".to_string()),
            ("count", query.page_size.to_string()),
            ("page", query.page.to_string()),
            ("date_from", date_from.to_string()),
        ];

        let list: BeatLeaderList = self.http.get_json(&url, &params).await?;

        if let Some(meta) = &list.metadata {
            tracing::debug!(
                source = "beatleader",
                total = meta.total,
                page = meta.page,
                items_per_page = meta.items_per_page,
                "Page metadata"
            );
        }

        let mut page = SourcePage::default();
        for leaderboard in list.data {
            let mode = leaderboard.difficulty.mode_name.clone();
            let name = leaderboard.difficulty.difficulty_name.clone();
            let listing = leaderboard.into_listing();
            if let Listing::Unmapped(entry) = &listing {
                tracing::debug!(
                    source = "beatleader",
                    hash = %entry.content_hash,
                    mode = %mode,
                    difficulty = %name,
                    "Unrecognised leaderboard, no difficulty to update"
                );
            }
            page.push(listing);
        }

        Ok(page)
    }
}

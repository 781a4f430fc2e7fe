//! ScoreSaber leaderboard client
//!
//! `GET /api/leaderboards?{qualified|ranked}=true&category=1&unique=false&page=N`
//!
//! ScoreSaber has no page size or date parameter; pages have a fixed size
//! and the date cutoff is applied client-side by the page fetcher.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ranksync_common::catalog::{Characteristic, DifficultyTier, RankStatus, SourceKind};
use ranksync_common::config::SourceConfig;
use serde::Deserialize;

use super::{
    endpoint, HttpFetcher, Listing, PageMetadata, PageQuery, RankingSource, RemoteEntry, SourcePage,
    UnmappedEntry,
};
use crate::error::FetchError;

#[derive(Debug, Deserialize)]
struct ScoreSaberList {
    metadata: Option<PageMetadata>,
    #[serde(default)]
    leaderboards: Vec<ScoreSaberLeaderboard>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScoreSaberLeaderboard {
    song_hash: String,
    difficulty: ScoreSaberDifficulty,
    #[serde(default)]
    stars: f64,
    #[serde(default)]
    ranked: bool,
    #[serde(default)]
    qualified: bool,
    #[serde(default)]
    qualified_date: Option<DateTime<Utc>>,
    #[serde(default)]
    ranked_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScoreSaberDifficulty {
    difficulty: i64,
    game_mode: String,
}

impl ScoreSaberLeaderboard {
    fn into_listing(self) -> Listing {
        let content_hash = self.song_hash.to_lowercase();
        let status = RankStatus::from_flags(self.ranked, self.qualified);
        let characteristic = Characteristic::from_game_mode(&self.difficulty.game_mode);
        let difficulty = DifficultyTier::from_code(self.difficulty.difficulty);

        match characteristic.zip(difficulty) {
            Some((characteristic, difficulty)) => Listing::Mapped(RemoteEntry {
                content_hash,
                characteristic,
                difficulty,
                star_rating: self.stars,
                status,
                nominated_at: None,
                qualified_at: self.qualified_date,
                ranked_at: self.ranked_date,
            }),
            None => Listing::Unmapped(UnmappedEntry {
                content_hash,
                status,
                qualified_at: self.qualified_date,
                ranked_at: self.ranked_date,
            }),
        }
    }
}

/// ScoreSaber API client
pub struct ScoreSaberClient {
    http: HttpFetcher,
    base_url: String,
}

impl ScoreSaberClient {
    pub fn new(config: &SourceConfig) -> Result<Self, FetchError> {
        Ok(Self {
            http: HttpFetcher::new(config)?,
            base_url: config.base_url.clone(),
        })
    }
}

#[async_trait]
impl RankingSource for ScoreSaberClient {
    fn kind(&self) -> SourceKind {
        SourceKind::ScoreSaber
    }

    async fn fetch_page(&self, query: &PageQuery) -> Result<SourcePage, FetchError> {
        let url = endpoint(&self.base_url, "api/leaderboards");
        let params = [
            (query.filter.as_str(), "true".to_string()),
            ("category", "1".to_string()),
            ("unique", "false".to_string()),
            ("page", query.page.to_string()),
        ];

        let list: ScoreSaberList = self.http.get_json(&url, &params).await?;

        if let Some(meta) = &list.metadata {
            tracing::debug!(
                source = "scoresaber",
                total = meta.total,
                page = meta.page,
                items_per_page = meta.items_per_page,
                "Page metadata"
            );
        }

        let mut page = SourcePage::default();
        for leaderboard in list.leaderboards {
            let mode = leaderboard.difficulty.game_mode.clone();
            let code = leaderboard.difficulty.difficulty;
            let listing = leaderboard.into_listing();
            if let Listing::Unmapped(entry) = &listing {
                tracing::debug!(
                    source = "scoresaber",
                    hash = %entry.content_hash,
                    game_mode = %mode,
                    difficulty = code,
                    "Unrecognised leaderboard, no difficulty to update"
                );
            }
            page.push(listing);
        }

        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn parse(json: &str) -> ScoreSaberList {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_ranked_leaderboard_converts() {
        let list = parse(
            r#"{
                "metadata": { "total": 1, "page": 1, "itemsPerPage": 14 },
                "leaderboards": [{
                    "id": 1, "songHash": "ABCDEF", "songName": "x",
                    "difficulty": { "leaderboardId": 1, "difficulty": 9, "gameMode": "SoloStandard", "difficultyRaw": "_ExpertPlus_SoloStandard" },
                    "stars": 11.5, "ranked": true, "qualified": false,
                    "rankedDate": "2024-03-01T00:00:00.000Z", "qualifiedDate": null
                }]
            }"#,
        );

        let Listing::Mapped(entry) = list.leaderboards.into_iter().next().unwrap().into_listing() else {
            panic!("expected a mapped entry");
        };
        assert_eq!(entry.content_hash, "abcdef");
        assert_eq!(entry.characteristic, Characteristic::Standard);
        assert_eq!(entry.difficulty, DifficultyTier::ExpertPlus);
        assert_eq!(entry.status, RankStatus::Ranked);
        assert_eq!(entry.star_rating, 11.5);
        assert_eq!(entry.ranked_at, Some(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()));
        assert_eq!(entry.qualified_at, None);
    }

    #[test]
    fn test_unknown_difficulty_is_kept_as_unmapped() {
        let list = parse(
            r#"{ "leaderboards": [{
                "songHash": "aa", "difficulty": { "difficulty": 4, "gameMode": "SoloStandard" },
                "stars": 0, "ranked": false, "qualified": true
            }] }"#,
        );

        assert!(list.metadata.is_none());
        let listing = list.leaderboards.into_iter().next().unwrap().into_listing();
        assert_eq!(
            listing,
            Listing::Unmapped(UnmappedEntry {
                content_hash: "aa".to_string(),
                status: RankStatus::Qualified,
                qualified_at: None,
                ranked_at: None,
            })
        );
    }

    #[test]
    fn test_unknown_game_mode_is_unmapped() {
        let list = parse(
            r#"{ "leaderboards": [{
                "songHash": "aa", "difficulty": { "difficulty": 7, "gameMode": "SoloGhost" },
                "qualified": true
            }] }"#,
        );

        let listing = list.leaderboards.into_iter().next().unwrap().into_listing();
        assert!(matches!(listing, Listing::Unmapped(_)));
    }
}

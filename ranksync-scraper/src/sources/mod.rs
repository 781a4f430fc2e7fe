//! Ranking service clients
//!
//! Every service is queried through `RankingSource::fetch_page`, which
//! returns entries already converted to the canonical `RemoteEntry`.
//! A leaderboard whose characteristic or difficulty cannot be mapped comes
//! back as an `UnmappedEntry`: it has no difficulty to write, but it still
//! lists its hash and still counts for pagination.

pub mod beatleader;
pub mod scoresaber;

pub use beatleader::BeatLeaderClient;
pub use scoresaber::ScoreSaberClient;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use ranksync_common::catalog::{Characteristic, DifficultyTier, RankStatus, SourceKind};
use ranksync_common::config::SourceConfig;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use crate::error::FetchError;

const USER_AGENT: &str = concat!("ranksync/", env!("CARGO_PKG_VERSION"));

/// Which leaderboard list to query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListFilter {
    Qualified,
    Ranked,
}

impl ListFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListFilter::Qualified => "qualified",
            ListFilter::Ranked => "ranked",
        }
    }

    /// Status an entry must have to belong to this list
    pub fn status(&self) -> RankStatus {
        match self {
            ListFilter::Qualified => RankStatus::Qualified,
            ListFilter::Ranked => RankStatus::Ranked,
        }
    }

    /// Date that orders this list and bounds incremental fetches
    pub fn date_of<L: Dated + ?Sized>(&self, entry: &L) -> Option<DateTime<Utc>> {
        match self {
            ListFilter::Qualified => entry.qualified_at(),
            ListFilter::Ranked => entry.ranked_at(),
        }
    }
}

/// Status and dates of a listing, mapped or not
pub trait Dated {
    fn status(&self) -> RankStatus;
    fn qualified_at(&self) -> Option<DateTime<Utc>>;
    fn ranked_at(&self) -> Option<DateTime<Utc>>;
}

/// One leaderboard (one difficulty of one upload) as reported by a service
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteEntry {
    /// Lowercase content hash
    pub content_hash: String,
    pub characteristic: Characteristic,
    pub difficulty: DifficultyTier,
    pub star_rating: f64,
    pub status: RankStatus,
    pub nominated_at: Option<DateTime<Utc>>,
    pub qualified_at: Option<DateTime<Utc>>,
    pub ranked_at: Option<DateTime<Utc>>,
}

impl Dated for RemoteEntry {
    fn status(&self) -> RankStatus {
        self.status
    }

    fn qualified_at(&self) -> Option<DateTime<Utc>> {
        self.qualified_at
    }

    fn ranked_at(&self) -> Option<DateTime<Utc>> {
        self.ranked_at
    }
}

/// A leaderboard whose characteristic or difficulty the catalog does not know
#[derive(Debug, Clone, PartialEq)]
pub struct UnmappedEntry {
    /// Lowercase content hash
    pub content_hash: String,
    pub status: RankStatus,
    pub qualified_at: Option<DateTime<Utc>>,
    pub ranked_at: Option<DateTime<Utc>>,
}

impl Dated for UnmappedEntry {
    fn status(&self) -> RankStatus {
        self.status
    }

    fn qualified_at(&self) -> Option<DateTime<Utc>> {
        self.qualified_at
    }

    fn ranked_at(&self) -> Option<DateTime<Utc>> {
        self.ranked_at
    }
}

/// One converted leaderboard
#[derive(Debug, Clone, PartialEq)]
pub enum Listing {
    Mapped(RemoteEntry),
    Unmapped(UnmappedEntry),
}

impl Listing {
    pub fn content_hash(&self) -> &str {
        match self {
            Listing::Mapped(entry) => &entry.content_hash,
            Listing::Unmapped(entry) => &entry.content_hash,
        }
    }
}

impl Dated for Listing {
    fn status(&self) -> RankStatus {
        match self {
            Listing::Mapped(entry) => entry.status,
            Listing::Unmapped(entry) => entry.status,
        }
    }

    fn qualified_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Listing::Mapped(entry) => entry.qualified_at,
            Listing::Unmapped(entry) => entry.qualified_at,
        }
    }

    fn ranked_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Listing::Mapped(entry) => entry.ranked_at,
            Listing::Unmapped(entry) => entry.ranked_at,
        }
    }
}

/// Parameters of one page request
#[derive(Debug, Clone, PartialEq)]
pub struct PageQuery {
    pub filter: ListFilter,
    /// 1-based page number
    pub page: u32,
    pub page_size: u32,
    /// Only entries after this instant are wanted (services may ignore it)
    pub since: Option<DateTime<Utc>>,
}

/// Converted entries of one page, in the order the service listed them
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourcePage {
    pub entries: Vec<RemoteEntry>,
    /// Leaderboards with a characteristic/difficulty that was not recognised
    pub unmapped: Vec<UnmappedEntry>,
}

impl SourcePage {
    pub fn push(&mut self, listing: Listing) {
        match listing {
            Listing::Mapped(entry) => self.entries.push(entry),
            Listing::Unmapped(entry) => self.unmapped.push(entry),
        }
    }

    /// Mapped and unmapped entries together
    pub fn len(&self) -> usize {
        self.entries.len() + self.unmapped.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Paging metadata echoed by both services
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMetadata {
    pub total: i64,
    pub page: i64,
    pub items_per_page: i64,
}

/// A remote ranking service
#[async_trait]
pub trait RankingSource: Send + Sync {
    /// Service identity, selects the storage columns it writes
    fn kind(&self) -> SourceKind;

    /// Fetch and convert one page of a leaderboard list
    async fn fetch_page(&self, query: &PageQuery) -> Result<SourcePage, FetchError>;
}

/// Build the client for `kind`
pub fn client_for(
    kind: SourceKind,
    config: &SourceConfig,
) -> Result<Arc<dyn RankingSource>, FetchError> {
    let client: Arc<dyn RankingSource> = match kind {
        SourceKind::ScoreSaber => Arc::new(ScoreSaberClient::new(config)?),
        SourceKind::BeatLeader => Arc::new(BeatLeaderClient::new(config)?),
    };
    Ok(client)
}

/// HTTP plumbing shared by the concrete clients
pub(crate) struct HttpFetcher {
    client: reqwest::Client,
    rate_limiter: DefaultDirectRateLimiter,
}

impl HttpFetcher {
    pub(crate) fn new(config: &SourceConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| FetchError::NetworkError(e.to_string()))?;

        let per_second = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);

        Ok(Self {
            client,
            rate_limiter: RateLimiter::direct(Quota::per_second(per_second)),
        })
    }

    /// GET `url` with `params` and decode the JSON body
    pub(crate) async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        params: &[(&str, String)],
    ) -> Result<T, FetchError> {
        self.rate_limiter.until_ready().await;

        tracing::debug!(url = %url, ?params, "Querying ranking service");

        let response = self.client.get(url).query(params).send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(FetchError::ApiError(status.as_u16(), error_text));
        }

        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| FetchError::ParseError(e.to_string()))
    }
}

/// Join a configured base URL and a path without doubling slashes
pub(crate) fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_cleanly() {
        assert_eq!(
            endpoint("https://api.example.com/", "/leaderboards"),
            "https://api.example.com/leaderboards"
        );
        assert_eq!(
            endpoint("http://127.0.0.1:9000", "api/leaderboards"),
            "http://127.0.0.1:9000/api/leaderboards"
        );
    }

    #[test]
    fn test_filter_selects_status_and_date() {
        let ranked_at = Utc::now();
        let entry = RemoteEntry {
            content_hash: "abc".to_string(),
            characteristic: Characteristic::Standard,
            difficulty: DifficultyTier::Expert,
            star_rating: 4.2,
            status: RankStatus::Ranked,
            nominated_at: None,
            qualified_at: None,
            ranked_at: Some(ranked_at),
        };

        assert_eq!(ListFilter::Ranked.status(), RankStatus::Ranked);
        assert_eq!(ListFilter::Qualified.status(), RankStatus::Qualified);
        assert_eq!(ListFilter::Ranked.date_of(&entry), Some(ranked_at));
        assert_eq!(ListFilter::Qualified.date_of(&entry), None);
    }

    #[test]
    fn test_page_keeps_unmapped_listings() {
        let mut page = SourcePage::default();
        page.push(Listing::Unmapped(UnmappedEntry {
            content_hash: "abc".to_string(),
            status: RankStatus::Qualified,
            qualified_at: None,
            ranked_at: None,
        }));

        assert!(page.entries.is_empty());
        assert_eq!(page.unmapped.len(), 1);
        assert_eq!(page.len(), 1);
        assert!(!page.is_empty());
    }

    #[test]
    fn test_client_for_each_kind() {
        let config = SourceConfig::with_base_url("https://example.com");
        for kind in SourceKind::ALL {
            let client = client_for(kind, &config).unwrap();
            assert_eq!(client.kind(), kind);
        }
    }

    #[test]
    fn test_http_fetcher_builds_with_defaults() {
        let config = SourceConfig::with_base_url("https://example.com");
        assert!(HttpFetcher::new(&config).is_ok());
    }
}

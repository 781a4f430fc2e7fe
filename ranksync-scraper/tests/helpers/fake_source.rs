//! Scripted ranking source and recording event sink

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use ranksync_common::catalog::{Characteristic, DifficultyTier, RankStatus, SourceKind};
use ranksync_common::events::{CatalogEvent, EventSink};
use ranksync_scraper::sources::{
    Dated, Listing, PageQuery, RankingSource, RemoteEntry, SourcePage, UnmappedEntry,
};
use ranksync_scraper::FetchError;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

pub fn day(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
}

pub fn ranked_entry(
    hash: &str,
    characteristic: Characteristic,
    difficulty: DifficultyTier,
    stars: f64,
    ranked_at: Option<DateTime<Utc>>,
) -> RemoteEntry {
    RemoteEntry {
        content_hash: hash.to_string(),
        characteristic,
        difficulty,
        star_rating: stars,
        status: RankStatus::Ranked,
        nominated_at: None,
        qualified_at: None,
        ranked_at,
    }
}

pub fn qualified_entry(
    hash: &str,
    characteristic: Characteristic,
    difficulty: DifficultyTier,
    qualified_at: Option<DateTime<Utc>>,
) -> RemoteEntry {
    RemoteEntry {
        content_hash: hash.to_string(),
        characteristic,
        difficulty,
        star_rating: 0.0,
        status: RankStatus::Qualified,
        nominated_at: None,
        qualified_at,
        ranked_at: None,
    }
}

/// Leaderboard on a characteristic the catalog does not know
pub fn modded_entry(
    hash: &str,
    status: RankStatus,
    qualified_at: Option<DateTime<Utc>>,
    ranked_at: Option<DateTime<Utc>>,
) -> Listing {
    Listing::Unmapped(UnmappedEntry {
        content_hash: hash.to_string(),
        status,
        qualified_at,
        ranked_at,
    })
}

/// In-memory ranking source.
///
/// Serves its entries sorted the way they were given, filtered by list and
/// by `since` the way a server-side date filter would, split into pages of
/// the requested size.
pub struct ScriptedSource {
    kind: SourceKind,
    listings: Mutex<Vec<Listing>>,
    fail: AtomicBool,
    requests: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(kind: SourceKind, entries: Vec<RemoteEntry>) -> Self {
        Self::with_listings(kind, entries.into_iter().map(Listing::Mapped).collect())
    }

    pub fn with_listings(kind: SourceKind, listings: Vec<Listing>) -> Self {
        Self {
            kind,
            listings: Mutex::new(listings),
            fail: AtomicBool::new(false),
            requests: AtomicUsize::new(0),
        }
    }

    pub fn set_entries(&self, entries: Vec<RemoteEntry>) {
        *self.listings.lock().unwrap() = entries.into_iter().map(Listing::Mapped).collect();
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RankingSource for ScriptedSource {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    async fn fetch_page(&self, query: &PageQuery) -> Result<SourcePage, FetchError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(FetchError::ApiError(503, "Service Unavailable".to_string()));
        }

        let listed: Vec<Listing> = self
            .listings
            .lock()
            .unwrap()
            .iter()
            .filter(|listing| listing.status() == query.filter.status())
            .filter(|listing| match (query.since, query.filter.date_of(*listing)) {
                (Some(since), Some(date)) => date > since,
                _ => true,
            })
            .cloned()
            .collect();

        let size = query.page_size as usize;
        let start = (query.page as usize - 1) * size;
        let mut page = SourcePage::default();
        for listing in listed.into_iter().skip(start).take(size) {
            page.push(listing);
        }
        Ok(page)
    }
}

/// Event sink that records what was published
#[derive(Default)]
pub struct RecordingSink {
    published: Mutex<Vec<(String, String, CatalogEvent)>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn routing_keys(&self) -> Vec<String> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .map(|(_, key, _)| key.clone())
            .collect()
    }

    pub fn topics(&self) -> Vec<String> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .map(|(topic, _, _)| topic.clone())
            .collect()
    }

    pub fn count(&self) -> usize {
        self.published.lock().unwrap().len()
    }
}

impl EventSink for RecordingSink {
    fn publish(&self, topic: &str, routing_key: &str, payload: &CatalogEvent) {
        self.published
            .lock()
            .unwrap()
            .push((topic.to_string(), routing_key.to_string(), payload.clone()));
    }
}

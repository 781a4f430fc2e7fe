//! Pagination driver
//!
//! Requests pages 1, 2, 3, ... from a ranking source and keeps the entries
//! that belong to the requested list. Paging stops at the first page with
//! no accepted entry: lists are ordered by date, so once a page holds
//! nothing past the cutoff no later page will either. Unmapped entries
//! count as accepted, so a page of unrecognised leaderboards never ends
//! the walk early.
//!
//! Any page failure fails the whole fetch. Callers never see a partial list.

use chrono::{DateTime, Utc};
use ranksync_common::config::SourceConfig;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::FetchError;
use crate::sources::{Dated, ListFilter, PageQuery, RankingSource, RemoteEntry, UnmappedEntry};

/// Result of a complete fetch
#[derive(Debug, Clone, Default)]
pub struct FetchOutcome {
    /// Accepted entries in page order
    pub entries: Vec<RemoteEntry>,
    /// Accepted entries the client could not map to a difficulty
    pub unmapped: Vec<UnmappedEntry>,
    /// Pages requested, including the terminating one
    pub pages: u32,
    /// Entries dropped by the status/cutoff predicate
    pub rejected: usize,
}

/// Iterative page walker with pacing and a page budget
#[derive(Debug, Clone)]
pub struct PageFetcher {
    page_size: u32,
    page_delay: Duration,
    max_pages: u32,
}

impl PageFetcher {
    pub fn new(page_size: u32, page_delay: Duration, max_pages: u32) -> Self {
        Self {
            page_size: page_size.max(1),
            page_delay,
            max_pages: max_pages.max(1),
        }
    }

    pub fn from_config(config: &SourceConfig) -> Self {
        Self::new(config.page_size, config.page_delay(), config.max_pages)
    }

    /// Fetch every accepted entry of `filter`, optionally only those dated after `cutoff`
    pub async fn fetch_all(
        &self,
        source: &dyn RankingSource,
        filter: ListFilter,
        cutoff: Option<DateTime<Utc>>,
    ) -> Result<FetchOutcome, FetchError> {
        let mut outcome = FetchOutcome::default();
        let mut page = 1u32;

        loop {
            if page > self.max_pages {
                return Err(FetchError::PageLimit(self.max_pages));
            }

            if page > 1 && !self.page_delay.is_zero() {
                tokio::time::sleep(self.page_delay).await;
            }

            let query = PageQuery {
                filter,
                page,
                page_size: self.page_size,
                since: cutoff,
            };
            let fetched = source.fetch_page(&query).await?;
            outcome.pages = page;

            let received = fetched.len();
            let mut accepted = 0usize;
            for entry in fetched.entries {
                if accepts(filter, cutoff, &entry) {
                    outcome.entries.push(entry);
                    accepted += 1;
                }
            }
            for entry in fetched.unmapped {
                if accepts(filter, cutoff, &entry) {
                    outcome.unmapped.push(entry);
                    accepted += 1;
                }
            }
            outcome.rejected += received - accepted;

            debug!(
                source = %source.kind(),
                list = filter.as_str(),
                page,
                received,
                accepted,
                "Loaded page"
            );

            if accepted == 0 {
                break;
            }
            page += 1;
        }

        info!(
            source = %source.kind(),
            list = filter.as_str(),
            pages = outcome.pages,
            entries = outcome.entries.len(),
            unmapped = outcome.unmapped.len(),
            "Fetch complete"
        );

        Ok(outcome)
    }
}

/// Entry belongs to `filter` and, with a cutoff, is undated or dated after it
pub fn accepts<L: Dated + ?Sized>(
    filter: ListFilter,
    cutoff: Option<DateTime<Utc>>,
    entry: &L,
) -> bool {
    if entry.status() != filter.status() {
        return false;
    }
    match (cutoff, filter.date_of(entry)) {
        (Some(cutoff), Some(date)) => date > cutoff,
        _ => true,
    }
}

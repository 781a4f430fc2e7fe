//! Database access for ranksync-scraper
//!
//! The schema lives in `ranksync_common::db`; this module holds the
//! reads and writes the sync loops perform on it.

pub mod catalog;

pub use ranksync_common::db::init_database;

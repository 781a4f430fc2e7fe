//! HTTP API handlers for ranksync-scraper
//!
//! Operational endpoints only; the catalog itself is served elsewhere.

pub mod health;

pub use health::health_routes;

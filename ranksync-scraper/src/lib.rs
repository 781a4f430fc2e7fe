//! ranksync-scraper library interface
//!
//! Keeps the local catalog's qualified/ranked data in sync with the
//! ranking services. Exposed as a library for integration testing.

pub mod api;
pub mod db;
pub mod error;
pub mod scheduler;
pub mod services;
pub mod sources;
pub mod utils;

pub use crate::error::{FetchError, SyncError, SyncResult};

use axum::Router;
use chrono::{DateTime, Utc};

use crate::scheduler::LoopRegistry;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Status of the running sync loops
    pub registry: LoopRegistry,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(registry: LoopRegistry) -> Self {
        Self {
            registry,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::health_routes())
        .with_state(state)
}

//! Health check endpoint
//!
//! Reports uptime and the state of every sync loop.

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::scheduler::LoopStatus;
use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "ok", or "degraded" when the last cycle of any loop failed
    pub status: String,
    /// Module name ("ranksync-scraper")
    pub module: String,
    /// Crate version from Cargo.toml
    pub version: String,
    /// Seconds since service started
    pub uptime_seconds: u64,
    pub loops: Vec<LoopStatus>,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);
    let uptime_seconds = uptime.num_seconds().max(0) as u64;

    let loops = state.registry.snapshot().await;
    let status = if loops.iter().any(|l| l.last_error.is_some()) {
        "degraded"
    } else {
        "ok"
    };

    Json(HealthResponse {
        status: status.to_string(),
        module: "ranksync-scraper".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds,
        loops,
    })
}

/// Build health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

//! Database initialization
//!
//! The catalog rows (maps, versions, difficulties) are ingested by another
//! process. This module only opens the shared SQLite file and makes sure the
//! tables and the per-source rank columns exist.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// SQLite busy timeout applied to every connection. Kept short so lock
/// contention surfaces as an error the sync loops can retry.
pub const BUSY_TIMEOUT_MS: u64 = 250;

/// Open (or create) the catalog database and ensure the schema exists
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Applied on every pooled connection. WAL lets the two loops of a
    // source read while the other one writes.
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS));

    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .min_connections(1)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_catalog_schema(&pool).await?;

    Ok(pool)
}

/// Create catalog tables if they don't exist (idempotent)
pub async fn create_catalog_schema(pool: &SqlitePool) -> Result<()> {
    create_maps_table(pool).await?;
    create_versions_table(pool).await?;
    create_difficulties_table(pool).await?;
    Ok(())
}

/// Logical items. Each ranking service owns its own flag/timestamp columns.
async fn create_maps_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS maps (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL DEFAULT '',
            ss_qualified INTEGER NOT NULL DEFAULT 0,
            ss_qualified_at TEXT,
            ss_ranked INTEGER NOT NULL DEFAULT 0,
            ss_ranked_at TEXT,
            bl_qualified INTEGER NOT NULL DEFAULT 0,
            bl_qualified_at TEXT,
            bl_ranked INTEGER NOT NULL DEFAULT 0,
            bl_ranked_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Content hashes (uploads) of a map. Several hashes can share one map.
async fn create_versions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS versions (
            id INTEGER PRIMARY KEY,
            map_id INTEGER NOT NULL REFERENCES maps(id) ON DELETE CASCADE,
            hash TEXT NOT NULL UNIQUE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_versions_map_id ON versions(map_id)")
        .execute(pool)
        .await?;

    Ok(())
}

/// One row per (version, characteristic, difficulty)
async fn create_difficulties_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS difficulties (
            id INTEGER PRIMARY KEY,
            version_id INTEGER NOT NULL REFERENCES versions(id) ON DELETE CASCADE,
            characteristic TEXT NOT NULL,
            difficulty TEXT NOT NULL,
            ss_stars REAL,
            ss_qualified_at TEXT,
            ss_ranked_at TEXT,
            bl_stars REAL,
            bl_qualified_at TEXT,
            bl_ranked_at TEXT,
            UNIQUE (version_id, characteristic, difficulty)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Watermark reads are MAX() over these
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_difficulties_ss_ranked_at ON difficulties(ss_ranked_at)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_difficulties_bl_ranked_at ON difficulties(bl_ranked_at)")
        .execute(pool)
        .await?;

    Ok(())
}

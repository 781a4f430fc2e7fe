//! Database Test Utilities
//!
//! Temporary catalog databases plus seeding and inspection helpers

use ranksync_common::catalog::{Characteristic, DifficultyTier, SourceKind};
use ranksync_common::db::init_database;
use sqlx::{Row, SqlitePool};
use tempfile::TempDir;

/// Create temporary catalog database with the schema applied
///
/// Returns (TempDir, SqlitePool) - TempDir must be kept alive for duration of test
pub async fn create_test_db() -> (TempDir, SqlitePool) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test_catalog.db");
    let pool = init_database(&db_path).await.unwrap();
    (temp_dir, pool)
}

/// Insert a map with its versions and their difficulties
pub async fn seed_map(
    pool: &SqlitePool,
    map_id: i64,
    versions: &[(&str, &[(Characteristic, DifficultyTier)])],
) {
    sqlx::query("INSERT INTO maps (id, name) VALUES (?, ?)")
        .bind(map_id)
        .bind(format!("map {}", map_id))
        .execute(pool)
        .await
        .unwrap();

    for (hash, difficulties) in versions {
        let version_id = sqlx::query("INSERT INTO versions (map_id, hash) VALUES (?, ?)")
            .bind(map_id)
            .bind(*hash)
            .execute(pool)
            .await
            .unwrap()
            .last_insert_rowid();

        for (characteristic, difficulty) in difficulties.iter() {
            sqlx::query(
                "INSERT INTO difficulties (version_id, characteristic, difficulty) VALUES (?, ?, ?)",
            )
            .bind(version_id)
            .bind(characteristic.as_str())
            .bind(difficulty.as_str())
            .execute(pool)
            .await
            .unwrap();
        }
    }
}

/// Source-owned fields of one difficulty, timestamps as stored
#[derive(Debug, Clone, PartialEq)]
pub struct DifficultyState {
    pub stars: Option<f64>,
    pub qualified_at: Option<String>,
    pub ranked_at: Option<String>,
}

pub async fn difficulty_state(
    pool: &SqlitePool,
    source: SourceKind,
    hash: &str,
    characteristic: Characteristic,
    difficulty: DifficultyTier,
) -> DifficultyState {
    let cols = source.columns();
    let sql = format!(
        "SELECT d.{} AS stars, d.{} AS qualified_at, d.{} AS ranked_at \
         FROM difficulties d JOIN versions v ON v.id = d.version_id \
         WHERE v.hash = ? AND d.characteristic = ? AND d.difficulty = ?",
        cols.diff_stars, cols.diff_qualified_at, cols.diff_ranked_at
    );

    let row = sqlx::query(&sql)
        .bind(hash)
        .bind(characteristic.as_str())
        .bind(difficulty.as_str())
        .fetch_one(pool)
        .await
        .unwrap();

    DifficultyState {
        stars: row.get("stars"),
        qualified_at: row.get("qualified_at"),
        ranked_at: row.get("ranked_at"),
    }
}

/// Source-owned fields of one map, timestamps as stored
#[derive(Debug, Clone, PartialEq)]
pub struct MapState {
    pub qualified: bool,
    pub qualified_at: Option<String>,
    pub ranked: bool,
    pub ranked_at: Option<String>,
}

pub async fn map_state(pool: &SqlitePool, source: SourceKind, map_id: i64) -> MapState {
    let cols = source.columns();
    let sql = format!(
        "SELECT {} AS qualified, {} AS qualified_at, {} AS ranked, {} AS ranked_at FROM maps WHERE id = ?",
        cols.map_qualified, cols.map_qualified_at, cols.map_ranked, cols.map_ranked_at
    );

    let row = sqlx::query(&sql).bind(map_id).fetch_one(pool).await.unwrap();

    MapState {
        qualified: row.get::<i64, _>("qualified") != 0,
        qualified_at: row.get("qualified_at"),
        ranked: row.get::<i64, _>("ranked") != 0,
        ranked_at: row.get("ranked_at"),
    }
}

/// Every sync-owned value in the catalog, one line per row
pub async fn dump_catalog(pool: &SqlitePool) -> Vec<String> {
    let mut lines: Vec<String> = sqlx::query_scalar(
        "SELECT printf('map %d|%d|%s|%d|%s|%d|%s|%d|%s', id, \
         ss_qualified, ifnull(ss_qualified_at, '-'), ss_ranked, ifnull(ss_ranked_at, '-'), \
         bl_qualified, ifnull(bl_qualified_at, '-'), bl_ranked, ifnull(bl_ranked_at, '-')) \
         FROM maps ORDER BY id",
    )
    .fetch_all(pool)
    .await
    .unwrap();

    let difficulties: Vec<String> = sqlx::query_scalar(
        "SELECT printf('difficulty %d|%s|%s|%s|%s|%s|%s', id, \
         ifnull(ss_stars, '-'), ifnull(ss_qualified_at, '-'), ifnull(ss_ranked_at, '-'), \
         ifnull(bl_stars, '-'), ifnull(bl_qualified_at, '-'), ifnull(bl_ranked_at, '-')) \
         FROM difficulties ORDER BY id",
    )
    .fetch_all(pool)
    .await
    .unwrap();

    lines.extend(difficulties);
    lines
}

//! Catalog queries used by the sync loops
//!
//! Every statement targets the column set of one ranking service
//! (`SourceKind::columns()`), so the same queries serve every source.
//! Functions take a `SqliteConnection` so they can run inside a
//! transaction or on a pooled connection alike.

use chrono::{DateTime, Utc};
use ranksync_common::catalog::{Characteristic, DifficultyTier, SourceKind};
use ranksync_common::time::{parse_optional_db_timestamp, to_db_string};
use ranksync_common::Result;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection};
use std::collections::BTreeSet;

/// SQLite caps bound parameters per statement; stay well below it
const IN_LIST_CHUNK: usize = 500;

/// A version (content hash) joined with its map's flags for one source
#[derive(Debug, Clone, PartialEq)]
pub struct MapRow {
    pub map_id: i64,
    pub hash: String,
    pub qualified: bool,
    pub qualified_at: Option<DateTime<Utc>>,
    pub ranked: bool,
    pub ranked_at: Option<DateTime<Utc>>,
}

/// One difficulty with the fields a source owns
#[derive(Debug, Clone, PartialEq)]
pub struct DifficultyRow {
    pub id: i64,
    pub map_id: i64,
    pub stars: Option<f64>,
    pub qualified_at: Option<DateTime<Utc>>,
    pub ranked_at: Option<DateTime<Utc>>,
}

/// Every hash whose map is currently flagged qualified by `source`
pub async fn load_qualified_hashes(
    conn: &mut SqliteConnection,
    source: SourceKind,
) -> Result<BTreeSet<String>> {
    let sql = format!(
        "SELECT v.hash FROM versions v JOIN maps m ON m.id = v.map_id WHERE m.{} = 1",
        source.columns().map_qualified
    );

    let hashes: Vec<String> = sqlx::query_scalar(&sql).fetch_all(conn).await?;
    Ok(hashes.into_iter().collect())
}

/// Expand hashes to every known hash of the same maps.
///
/// Hashes with no local version are dropped.
pub async fn expand_to_aliases(
    conn: &mut SqliteConnection,
    hashes: &BTreeSet<String>,
) -> Result<BTreeSet<String>> {
    let mut expanded = BTreeSet::new();
    let hashes: Vec<&String> = hashes.iter().collect();

    for chunk in hashes.chunks(IN_LIST_CHUNK) {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT DISTINCT alias.hash FROM versions fetched \
             JOIN versions alias ON alias.map_id = fetched.map_id \
             WHERE fetched.hash IN (",
        );
        let mut separated = builder.separated(", ");
        for hash in chunk {
            separated.push_bind(hash.as_str());
        }
        separated.push_unseparated(")");

        let rows: Vec<String> = builder
            .build_query_scalar()
            .fetch_all(&mut *conn)
            .await?;
        expanded.extend(rows);
    }

    Ok(expanded)
}

/// Map rows for the given hashes (unknown hashes produce no row)
pub async fn maps_for_hashes<'a, I>(
    conn: &mut SqliteConnection,
    source: SourceKind,
    hashes: I,
) -> Result<Vec<MapRow>>
where
    I: IntoIterator<Item = &'a String>,
{
    let cols = source.columns();
    let hashes: Vec<&String> = hashes.into_iter().collect();
    let mut rows = Vec::new();

    for chunk in hashes.chunks(IN_LIST_CHUNK) {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT m.id AS map_id, v.hash AS hash, \
             m.{} AS qualified, m.{} AS qualified_at, m.{} AS ranked, m.{} AS ranked_at \
             FROM versions v JOIN maps m ON m.id = v.map_id WHERE v.hash IN (",
            cols.map_qualified, cols.map_qualified_at, cols.map_ranked, cols.map_ranked_at
        ));
        let mut separated = builder.separated(", ");
        for hash in chunk {
            separated.push_bind(hash.as_str());
        }
        separated.push_unseparated(")");

        for row in builder.build().fetch_all(&mut *conn).await? {
            rows.push(MapRow {
                map_id: row.get("map_id"),
                hash: row.get("hash"),
                qualified: row.get::<i64, _>("qualified") != 0,
                qualified_at: parse_optional_db_timestamp(row.get("qualified_at"))?,
                ranked: row.get::<i64, _>("ranked") != 0,
                ranked_at: parse_optional_db_timestamp(row.get("ranked_at"))?,
            });
        }
    }

    Ok(rows)
}

/// Set or clear a map's qualified flag, optionally stamping its qualified date.
///
/// With `qualified_at = None` the stored date is left as is.
pub async fn set_map_qualified(
    conn: &mut SqliteConnection,
    source: SourceKind,
    map_id: i64,
    qualified: bool,
    qualified_at: Option<DateTime<Utc>>,
) -> Result<u64> {
    let cols = source.columns();
    let result = match qualified_at {
        Some(ts) => {
            let sql = format!(
                "UPDATE maps SET {} = ?, {} = ? WHERE id = ?",
                cols.map_qualified, cols.map_qualified_at
            );
            sqlx::query(&sql)
                .bind(qualified)
                .bind(to_db_string(ts))
                .bind(map_id)
                .execute(conn)
                .await?
        }
        None => {
            let sql = format!("UPDATE maps SET {} = ? WHERE id = ?", cols.map_qualified);
            sqlx::query(&sql)
                .bind(qualified)
                .bind(map_id)
                .execute(conn)
                .await?
        }
    };

    Ok(result.rows_affected())
}

/// Flag a map ranked with the given ranked date
pub async fn set_map_ranked(
    conn: &mut SqliteConnection,
    source: SourceKind,
    map_id: i64,
    ranked_at: DateTime<Utc>,
) -> Result<u64> {
    let cols = source.columns();
    let sql = format!(
        "UPDATE maps SET {} = 1, {} = ? WHERE id = ?",
        cols.map_ranked, cols.map_ranked_at
    );

    let result = sqlx::query(&sql)
        .bind(to_db_string(ranked_at))
        .bind(map_id)
        .execute(conn)
        .await?;

    Ok(result.rows_affected())
}

/// Look up the difficulty a fetched entry refers to
pub async fn find_difficulty(
    conn: &mut SqliteConnection,
    source: SourceKind,
    hash: &str,
    characteristic: Characteristic,
    difficulty: DifficultyTier,
) -> Result<Option<DifficultyRow>> {
    let cols = source.columns();
    let sql = format!(
        "SELECT d.id AS id, v.map_id AS map_id, d.{} AS stars, d.{} AS qualified_at, d.{} AS ranked_at \
         FROM difficulties d JOIN versions v ON v.id = d.version_id \
         WHERE v.hash = ? AND d.characteristic = ? AND d.difficulty = ?",
        cols.diff_stars, cols.diff_qualified_at, cols.diff_ranked_at
    );

    let row = sqlx::query(&sql)
        .bind(hash)
        .bind(characteristic.as_str())
        .bind(difficulty.as_str())
        .fetch_optional(conn)
        .await?;

    match row {
        Some(row) => Ok(Some(DifficultyRow {
            id: row.get("id"),
            map_id: row.get("map_id"),
            stars: row.get("stars"),
            qualified_at: parse_optional_db_timestamp(row.get("qualified_at"))?,
            ranked_at: parse_optional_db_timestamp(row.get("ranked_at"))?,
        })),
        None => Ok(None),
    }
}

pub async fn update_difficulty_qualified_at(
    conn: &mut SqliteConnection,
    source: SourceKind,
    difficulty_id: i64,
    qualified_at: DateTime<Utc>,
) -> Result<u64> {
    let sql = format!(
        "UPDATE difficulties SET {} = ? WHERE id = ?",
        source.columns().diff_qualified_at
    );

    let result = sqlx::query(&sql)
        .bind(to_db_string(qualified_at))
        .bind(difficulty_id)
        .execute(conn)
        .await?;

    Ok(result.rows_affected())
}

/// Write the ranked-loop fields of one difficulty
pub async fn update_difficulty_ranked(
    conn: &mut SqliteConnection,
    source: SourceKind,
    difficulty_id: i64,
    stars: Option<f64>,
    ranked_at: DateTime<Utc>,
    qualified_at: DateTime<Utc>,
) -> Result<u64> {
    let cols = source.columns();
    let sql = format!(
        "UPDATE difficulties SET {} = ?, {} = ?, {} = ? WHERE id = ?",
        cols.diff_stars, cols.diff_ranked_at, cols.diff_qualified_at
    );

    let result = sqlx::query(&sql)
        .bind(stars)
        .bind(to_db_string(ranked_at))
        .bind(to_db_string(qualified_at))
        .bind(difficulty_id)
        .execute(conn)
        .await?;

    Ok(result.rows_affected())
}

/// Latest ranked date stored for `source`, `None` when nothing is ranked yet
pub async fn read_ranked_watermark(
    conn: &mut SqliteConnection,
    source: SourceKind,
) -> Result<Option<DateTime<Utc>>> {
    // Fixed-width timestamps: text MAX is the chronological MAX
    let sql = format!(
        "SELECT MAX({}) FROM difficulties",
        source.columns().diff_ranked_at
    );

    let max: Option<String> = sqlx::query_scalar(&sql).fetch_one(conn).await?;
    parse_optional_db_timestamp(max)
}

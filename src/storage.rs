//! SQLite relation backing the Loader/Ranker.
//!
//! Each load replaces both tables inside one transaction; readers see either
//! the previous run's tables or the complete new ones.

use crate::error::LoadError;
use crate::types::{CleanPlaceRecord, RankMode, RankedPlaceRow};
use rusqlite::{params, Connection, Row};
use std::path::Path;

/// Table names and ranking switches for one load.
#[derive(Debug, Clone, PartialEq)]
pub struct RankQuery {
    pub places_table: String,
    pub ranking_table: String,
    pub mode: RankMode,
    /// When set, review count participates in the rank itself, so rows
    /// with equal rating but different review counts get different ranks.
    pub reviews_break_ties: bool,
}

pub struct PlaceStore {
    conn: Connection,
}

impl PlaceStore {
    pub fn open(db_path: &Path) -> Result<Self, LoadError> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| LoadError::Write {
                    path: parent.display().to_string(),
                    reason: e.to_string(),
                })?;
            }
        }
        let conn = Connection::open(db_path)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, LoadError> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    /// Drop and recreate the places relation, derive `main_type`, and build
    /// the ranking table. All or nothing.
    pub fn replace_and_rank(&mut self, records: &[CleanPlaceRecord], query: &RankQuery) -> Result<usize, LoadError> {
        let places = &query.places_table;
        let ranking = &query.ranking_table;

        let tx = self.conn.transaction()?;
        tx.execute_batch(&format!(
            r#"
            DROP TABLE IF EXISTS {ranking};
            DROP TABLE IF EXISTS {places};
            CREATE TABLE {places} (
                place_id            TEXT NOT NULL,
                name                TEXT NOT NULL,
                rating              REAL NOT NULL,
                user_ratings_total  INTEGER NOT NULL,
                latitude            REAL,
                longitude           REAL,
                types               TEXT,
                address             TEXT NOT NULL,
                main_type           TEXT
            );
            "#
        ))?;

        {
            let mut insert = tx.prepare(&format!(
                "INSERT INTO {places} (place_id, name, rating, user_ratings_total, latitude, longitude, types, address)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
            ))?;
            for rec in records {
                insert.execute(params![
                    rec.place_id,
                    rec.name,
                    rec.rating,
                    i64::try_from(rec.user_ratings_total).unwrap_or(i64::MAX),
                    rec.latitude,
                    rec.longitude,
                    rec.types,
                    rec.address,
                ])?;
            }
        }

        {
            // main_type is derived, never edited: recompute wherever it is unset
            let mut update = tx.prepare(&format!(
                "UPDATE {places} SET main_type = ?1 WHERE rowid = ?2 AND (main_type IS NULL OR main_type = '')"
            ))?;
            let pending: Vec<(i64, String)> = {
                let mut stmt = tx.prepare(&format!(
                    "SELECT rowid, types FROM {places} WHERE types IS NOT NULL AND (main_type IS NULL OR main_type = '')"
                ))?;
                let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
                rows.collect::<Result<_, _>>()?
            };
            for (rowid, types) in pending {
                update.execute(params![derive_main_type(&types), rowid])?;
            }
        }

        // Rating-only by default so equal ratings share a rank; see sql.reviews_break_ties
        let order = if query.reviews_break_ties {
            "rating DESC, user_ratings_total DESC"
        } else {
            "rating DESC"
        };
        tx.execute_batch(&format!(
            r#"
            CREATE TABLE {ranking} AS
            SELECT
                place_id,
                name,
                rating,
                user_ratings_total,
                COALESCE(main_type, types) AS category,
                {rank_fn}() OVER (
                    PARTITION BY COALESCE(main_type, types)
                    ORDER BY {order}
                ) AS rating_rank
            FROM {places};
            "#,
            rank_fn = query.mode.sql_function(),
        ))?;

        let loaded: i64 = tx.query_row(&format!("SELECT COUNT(*) FROM {places}"), [], |r| r.get(0))?;
        tx.commit()?;
        Ok(loaded as usize)
    }

    /// Full ranked view: category ascending, then rank.
    pub fn ranked_rows(&self, ranking_table: &str) -> Result<Vec<RankedPlaceRow>, LoadError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT place_id, name, rating, user_ratings_total, category, rating_rank
             FROM {ranking_table}
             ORDER BY category, rating_rank, user_ratings_total DESC, place_id"
        ))?;
        let rows = stmt.query_map([], ranked_from_row)?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    /// At most `limit` rows per category, in ranked order.
    pub fn top_rows(&self, ranking_table: &str, limit: usize) -> Result<Vec<RankedPlaceRow>, LoadError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT place_id, name, rating, user_ratings_total, category, rating_rank
             FROM (
                 SELECT *,
                        ROW_NUMBER() OVER (
                            PARTITION BY category
                            ORDER BY rating_rank, user_ratings_total DESC, place_id
                        ) AS row_in_category
                 FROM {ranking_table}
             )
             WHERE row_in_category <= ?1
             ORDER BY category, rating_rank, user_ratings_total DESC, place_id"
        ))?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![limit], ranked_from_row)?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    /// `(place_id, main_type)` for every stored row, in insertion order.
    #[cfg(test)]
    fn main_types(&self, places_table: &str) -> Result<Vec<(String, Option<String>)>, LoadError> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT place_id, main_type FROM {places_table} ORDER BY rowid"))?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        Ok(rows.collect::<Result<_, _>>()?)
    }
}

fn ranked_from_row(row: &Row<'_>) -> rusqlite::Result<RankedPlaceRow> {
    let reviews: i64 = row.get(3)?;
    let rank: i64 = row.get(5)?;
    Ok(RankedPlaceRow {
        place_id: row.get(0)?,
        name: row.get(1)?,
        rating: row.get(2)?,
        user_ratings_total: u64::try_from(reviews).unwrap_or(0),
        category: row.get(4)?,
        rating_rank: u64::try_from(rank).unwrap_or(0),
    })
}

/// Category cleanup: drop `[`, `]` and `"`, then trim.
///
/// A plain string heuristic, not a parser. Several categories stay one
/// composite value (`["bar", "restaurant"]` → `bar, restaurant`).
pub fn derive_main_type(types: &str) -> String {
    types
        .chars()
        .filter(|c| !matches!(c, '[' | ']' | '"'))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Table names are spliced into SQL text, so only plain identifiers pass.
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

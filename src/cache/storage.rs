//! SQLite and no-op implementations of [`CacheStore`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, types::Type, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex};

use super::traits::{CacheStore, CachedRow};
use crate::error::{Error, Result};

/// Storage implementation that doesn't cache anything.
/// Used when caching is disabled - all operations are no-ops.
#[derive(Debug, Default)]
pub struct NoopStore;

#[async_trait]
impl CacheStore for NoopStore {
  async fn upsert_many(&self, _rows: Vec<CachedRow>) -> Result<()> {
    Ok(()) // Discard
  }

  async fn upsert_one(&self, _row: CachedRow) -> Result<()> {
    Ok(()) // Discard
  }

  async fn select_by_page_range(&self, _max_page: i64) -> Result<Vec<CachedRow>> {
    Ok(Vec::new()) // Always miss
  }

  async fn select_max_page(&self) -> Result<Option<i64>> {
    Ok(None)
  }

  async fn select_by_id(&self, _id: i64) -> Result<Option<CachedRow>> {
    Ok(None) // Always miss
  }

  async fn clear_all(&self) -> Result<()> {
    Ok(())
  }

  async fn replace_all(&self, _rows: Vec<CachedRow>) -> Result<()> {
    Ok(()) // Discard
  }
}

/// SQLite-based cache storage implementation.
///
/// Queries run on the blocking pool so callers never stall the runtime.
#[derive(Clone)]
pub struct SqliteStore {
  conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
  /// Open (or create) the cache database at `path`.
  pub fn open(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| Error::Storage(format!("Failed to create cache directory: {}", e)))?;
    }

    let conn = Connection::open(path).map_err(|e| {
      Error::Storage(format!(
        "Failed to open cache database at {}: {}",
        path.display(),
        e
      ))
    })?;

    Self::with_connection(conn)
  }

  /// Open a throwaway in-memory database.
  pub fn open_in_memory() -> Result<Self> {
    Self::with_connection(Connection::open_in_memory()?)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| Error::Storage(format!("Failed to run cache migrations: {}", e)))?;

    Ok(Self {
      conn: Arc::new(Mutex::new(conn)),
    })
  }

  /// Run `f` against the connection on the blocking pool.
  async fn call<T, F>(&self, f: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
  {
    let conn = Arc::clone(&self.conn);
    tokio::task::spawn_blocking(move || {
      let mut conn = conn
        .lock()
        .map_err(|e| Error::Storage(format!("Lock poisoned: {}", e)))?;
      f(&mut *conn)
    })
    .await?
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS anime (
    id INTEGER PRIMARY KEY,
    title TEXT NOT NULL,
    title_english TEXT,
    title_japanese TEXT,
    episodes INTEGER,
    score REAL,
    synopsis TEXT,
    rating TEXT,
    image_url TEXT,
    large_image_url TEXT,
    trailer_youtube_id TEXT,
    trailer_url TEXT,
    trailer_embed_url TEXT,
    genres TEXT,
    kind TEXT,
    status TEXT,
    airing INTEGER,
    duration TEXT,
    rank INTEGER,
    popularity INTEGER,
    season TEXT,
    year INTEGER,
    page INTEGER NOT NULL DEFAULT 1,
    last_updated TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_anime_page_rank ON anime(page, rank);
"#;

const COLUMNS: &str = "id, title, title_english, title_japanese, episodes, score, synopsis, \
   rating, image_url, large_image_url, trailer_youtube_id, trailer_url, trailer_embed_url, \
   genres, kind, status, airing, duration, rank, popularity, season, year, page, last_updated";

fn insert_row(conn: &Connection, row: &CachedRow) -> rusqlite::Result<usize> {
  conn.execute(
    &format!(
      "INSERT OR REPLACE INTO anime ({}) VALUES \
       (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, \
        ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24)",
      COLUMNS
    ),
    params![
      row.id,
      row.title,
      row.title_english,
      row.title_japanese,
      row.episodes,
      row.score,
      row.synopsis,
      row.rating,
      row.image_url,
      row.large_image_url,
      row.trailer_youtube_id,
      row.trailer_url,
      row.trailer_embed_url,
      row.genres,
      row.kind,
      row.status,
      row.airing,
      row.duration,
      row.rank,
      row.popularity,
      row.season,
      row.year,
      row.page,
      row.last_updated.to_rfc3339(),
    ],
  )
}

fn read_row(row: &Row<'_>) -> rusqlite::Result<CachedRow> {
  let last_updated: String = row.get(23)?;
  Ok(CachedRow {
    id: row.get(0)?,
    title: row.get(1)?,
    title_english: row.get(2)?,
    title_japanese: row.get(3)?,
    episodes: row.get(4)?,
    score: row.get(5)?,
    synopsis: row.get(6)?,
    rating: row.get(7)?,
    image_url: row.get(8)?,
    large_image_url: row.get(9)?,
    trailer_youtube_id: row.get(10)?,
    trailer_url: row.get(11)?,
    trailer_embed_url: row.get(12)?,
    genres: row.get(13)?,
    kind: row.get(14)?,
    status: row.get(15)?,
    airing: row.get(16)?,
    duration: row.get(17)?,
    rank: row.get(18)?,
    popularity: row.get(19)?,
    season: row.get(20)?,
    year: row.get(21)?,
    page: row.get(22)?,
    last_updated: parse_datetime(&last_updated)
      .map_err(|e| rusqlite::Error::FromSqlConversionFailure(23, Type::Text, Box::new(e)))?,
  })
}

#[async_trait]
impl CacheStore for SqliteStore {
  async fn upsert_many(&self, rows: Vec<CachedRow>) -> Result<()> {
    self
      .call(move |conn| {
        let tx = conn.transaction()?;
        for row in &rows {
          insert_row(&tx, row)?;
        }
        tx.commit()?;
        Ok(())
      })
      .await
  }

  async fn upsert_one(&self, row: CachedRow) -> Result<()> {
    self
      .call(move |conn| {
        insert_row(conn, &row)?;
        Ok(())
      })
      .await
  }

  async fn select_by_page_range(&self, max_page: i64) -> Result<Vec<CachedRow>> {
    self
      .call(move |conn| {
        // Unranked entries sort after ranked ones within a page
        let mut stmt = conn.prepare(&format!(
          "SELECT {} FROM anime WHERE page <= ?1
           ORDER BY page ASC, rank IS NULL, rank ASC, id ASC",
          COLUMNS
        ))?;
        let rows = stmt
          .query_map(params![max_page], read_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await
  }

  async fn select_max_page(&self) -> Result<Option<i64>> {
    self
      .call(|conn| {
        let max: Option<i64> = conn.query_row("SELECT MAX(page) FROM anime", [], |row| row.get(0))?;
        Ok(max)
      })
      .await
  }

  async fn select_by_id(&self, id: i64) -> Result<Option<CachedRow>> {
    self
      .call(move |conn| {
        let row = conn
          .query_row(
            &format!("SELECT {} FROM anime WHERE id = ?1", COLUMNS),
            params![id],
            read_row,
          )
          .optional()?;
        Ok(row)
      })
      .await
  }

  async fn clear_all(&self) -> Result<()> {
    self
      .call(|conn| {
        conn.execute("DELETE FROM anime", [])?;
        Ok(())
      })
      .await
  }

  async fn replace_all(&self, rows: Vec<CachedRow>) -> Result<()> {
    self
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM anime", [])?;
        for row in &rows {
          insert_row(&tx, row)?;
        }
        tx.commit()?;
        Ok(())
      })
      .await
  }
}

/// Parse an RFC 3339 timestamp as written by [`insert_row`].
fn parse_datetime(s: &str) -> std::result::Result<DateTime<Utc>, chrono::ParseError> {
  DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc))
}

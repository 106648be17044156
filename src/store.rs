//! Committed post store
//!
//! Append-only: rows are inserted on commit and never updated or deleted.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommittedPost {
    pub id: i64,
    pub preview_id: String,
    pub urls: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommittedPage {
    pub items: Vec<CommittedPost>,
    pub limit: i64,
    pub offset: i64,
    pub count: usize,
}

/// Clamp caller paging to `1..=MAX_PAGE_SIZE` and a non-negative offset.
pub fn clamp_page(limit: Option<i64>, offset: Option<i64>) -> (i64, i64) {
    let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let offset = offset.unwrap_or(0).max(0);
    (limit, offset)
}

pub trait PostStore: Send + Sync {
    fn insert(
        &self,
        preview_id: &str,
        urls: &[String],
        created_at: DateTime<Utc>,
    ) -> EngineResult<CommittedPost>;

    fn get(&self, id: i64) -> EngineResult<Option<CommittedPost>>;

    /// Newest first (id descending).
    fn list(&self, limit: i64, offset: i64) -> EngineResult<Vec<CommittedPost>>;

    fn count(&self) -> EngineResult<i64>;
}

pub struct SqlitePostStore {
    conn: Mutex<Connection>,
}

impl SqlitePostStore {
    pub fn open(path: &Path) -> EngineResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| EngineError::Storage(format!("create {}: {e}", parent.display())))?;
        }
        let conn = Connection::open(path)?;
        tracing::info!(path = %path.display(), "post store opened");
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> EngineResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> EngineResult<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS committed_posts (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                preview_id  TEXT NOT NULL,
                urls_json   TEXT NOT NULL,
                created_at  TEXT NOT NULL
            )",
            [],
        )?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn conn(&self) -> EngineResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| EngineError::Storage("post store lock poisoned".into()))
    }
}

type RawRow = (i64, String, String, String);

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn to_post((id, preview_id, urls_json, created_at): RawRow) -> EngineResult<CommittedPost> {
    let urls = serde_json::from_str(&urls_json).unwrap_or_default();
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map_err(|e| EngineError::Storage(format!("bad timestamp on post {id}: {e}")))?
        .with_timezone(&Utc);
    Ok(CommittedPost { id, preview_id, urls, created_at })
}

impl PostStore for SqlitePostStore {
    fn insert(
        &self,
        preview_id: &str,
        urls: &[String],
        created_at: DateTime<Utc>,
    ) -> EngineResult<CommittedPost> {
        let urls_json = serde_json::to_string(urls)?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO committed_posts (preview_id, urls_json, created_at) VALUES (?1, ?2, ?3)",
            params![preview_id, urls_json, created_at.to_rfc3339()],
        )?;
        Ok(CommittedPost {
            id: conn.last_insert_rowid(),
            preview_id: preview_id.to_string(),
            urls: urls.to_vec(),
            created_at,
        })
    }

    fn get(&self, id: i64) -> EngineResult<Option<CommittedPost>> {
        let conn = self.conn()?;
        let raw = conn
            .query_row(
                "SELECT id, preview_id, urls_json, created_at FROM committed_posts WHERE id = ?1",
                [id],
                read_row,
            )
            .optional()?;
        raw.map(to_post).transpose()
    }

    fn list(&self, limit: i64, offset: i64) -> EngineResult<Vec<CommittedPost>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, preview_id, urls_json, created_at FROM committed_posts
             ORDER BY id DESC LIMIT ?1 OFFSET ?2",
        )?;
        let rows = stmt.query_map([limit, offset], read_row)?;

        let mut posts = Vec::new();
        for row in rows {
            posts.push(to_post(row?)?);
        }
        Ok(posts)
    }

    fn count(&self) -> EngineResult<i64> {
        let conn = self.conn()?;
        Ok(conn.query_row("SELECT COUNT(*) FROM committed_posts", [], |row| row.get(0))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_clamping() {
        assert_eq!(clamp_page(None, None), (20, 0));
        assert_eq!(clamp_page(Some(0), Some(-5)), (1, 0));
        assert_eq!(clamp_page(Some(1000), Some(3)), (100, 3));
    }

    #[test]
    fn insert_and_list_newest_first() {
        let store = SqlitePostStore::open_in_memory().unwrap();
        for i in 0..3 {
            store
                .insert(&format!("prev_{i}_a"), &[format!("/static/generated/{i}.png")], Utc::now())
                .unwrap();
        }
        assert_eq!(store.count().unwrap(), 3);

        let page = store.list(2, 0).unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].preview_id, "prev_2_a");
        assert_eq!(page[1].preview_id, "prev_1_a");

        let rest = store.list(2, 2).unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].urls, vec!["/static/generated/0.png".to_string()]);
    }

    #[test]
    fn get_missing_is_none() {
        let store = SqlitePostStore::open_in_memory().unwrap();
        assert!(store.get(42).unwrap().is_none());
    }
}

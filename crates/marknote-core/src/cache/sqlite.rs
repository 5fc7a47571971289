//! SQLite-backed cache implementation

use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use crate::error::{Error, Result};
use crate::models::{LocalNote, NoteId, SyncStatus};

use super::LocalCache;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS notes (
    id          TEXT PRIMARY KEY,
    title       TEXT NOT NULL,
    content     TEXT NOT NULL,
    updated_at  INTEGER NOT NULL,
    synced      INTEGER NOT NULL,
    deleted     INTEGER NOT NULL DEFAULT 0,
    sync_status TEXT NOT NULL DEFAULT 'unsynced'
);
CREATE INDEX IF NOT EXISTS idx_notes_updated_at ON notes(updated_at DESC);
";

/// Durable [`LocalCache`] backed by a local SQLite file
///
/// Timestamps are stored as Unix milliseconds; `list` is served from the
/// `updated_at` index.
pub struct SqliteCache {
    conn: Mutex<Connection>,
}

impl SqliteCache {
    /// Open a cache at the given path, creating schema if needed
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    /// Open an in-memory cache (useful for testing)
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        // WAL may be unavailable on some filesystems; not fatal
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.pragma_update(None, "synchronous", "NORMAL").ok();
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Cache("sqlite cache poisoned".to_string()))
    }

    fn parse_note(row: &rusqlite::Row<'_>) -> rusqlite::Result<LocalNote> {
        let id: String = row.get(0)?;
        let updated_at_ms: i64 = row.get(3)?;
        let sync_status: String = row.get(6)?;
        Ok(LocalNote {
            id: id.parse().unwrap_or_default(),
            title: row.get(1)?,
            content: row.get(2)?,
            updated_at: DateTime::from_timestamp_millis(updated_at_ms)
                .unwrap_or(DateTime::UNIX_EPOCH),
            synced: row.get::<_, i32>(4)? != 0,
            deleted: row.get::<_, i32>(5)? != 0,
            sync_status: SyncStatus::from_str(&sync_status).unwrap_or_default(),
        })
    }
}

#[async_trait]
impl LocalCache for SqliteCache {
    async fn list(&self) -> Result<Vec<LocalNote>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, title, content, updated_at, synced, deleted, sync_status
             FROM notes
             ORDER BY updated_at DESC",
        )?;

        let notes = stmt
            .query_map([], Self::parse_note)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(notes)
    }

    async fn get(&self, id: &NoteId) -> Result<Option<LocalNote>> {
        let conn = self.lock()?;
        let result = conn.query_row(
            "SELECT id, title, content, updated_at, synced, deleted, sync_status
             FROM notes WHERE id = ?",
            params![id.as_str()],
            Self::parse_note,
        );

        match result {
            Ok(note) => Ok(Some(note)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, note: LocalNote) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO notes (id, title, content, updated_at, synced, deleted, sync_status)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 title = excluded.title,
                 content = excluded.content,
                 updated_at = MAX(notes.updated_at, excluded.updated_at),
                 synced = excluded.synced,
                 deleted = excluded.deleted,
                 sync_status = excluded.sync_status",
            params![
                note.id.as_str(),
                note.title,
                note.content,
                note.updated_at.timestamp_millis(),
                i32::from(note.synced),
                i32::from(note.deleted),
                note.sync_status.as_str(),
            ],
        )?;
        Ok(())
    }

    async fn delete(&self, id: &NoteId) -> Result<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM notes WHERE id = ?", params![id.as_str()])?;
        Ok(())
    }

    async fn soft_delete(&self, id: &NoteId) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE notes
             SET deleted = 1, synced = 0, sync_status = 'unsynced',
                 updated_at = MAX(updated_at, ?)
             WHERE id = ?",
            params![Utc::now().timestamp_millis(), id.as_str()],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn draft(title: &str) -> LocalNote {
        let mut note = LocalNote::new_draft();
        note.title = title.to_string();
        note
    }

    /// Truncate to millisecond precision, matching storage granularity
    fn at_ms(note: &mut LocalNote) {
        note.updated_at = DateTime::from_timestamp_millis(note.updated_at.timestamp_millis())
            .unwrap_or(DateTime::UNIX_EPOCH);
    }

    #[tokio::test]
    async fn test_put_get_round_trip() {
        let cache = SqliteCache::open_in_memory().unwrap();
        let mut note = draft("hello");
        note.content = "# body".to_string();
        at_ms(&mut note);

        cache.put(note.clone()).await.unwrap();
        let fetched = cache.get(&note.id).await.unwrap().unwrap();
        assert_eq!(fetched, note);
    }

    #[tokio::test]
    async fn test_list_includes_tombstones_newest_first() {
        let cache = SqliteCache::open_in_memory().unwrap();
        let mut older = draft("older");
        let mut newer = draft("newer");
        let now = Utc::now();
        older.updated_at = now - Duration::seconds(10);
        older.deleted = true;
        newer.updated_at = now;

        cache.put(older).await.unwrap();
        cache.put(newer).await.unwrap();

        let all = cache.list().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].title, "newer");
        assert!(all[1].deleted);
    }

    #[tokio::test]
    async fn test_put_never_regresses_updated_at() {
        let cache = SqliteCache::open_in_memory().unwrap();
        let mut note = draft("n");
        at_ms(&mut note);
        cache.put(note.clone()).await.unwrap();

        let mut stale = note.clone();
        stale.title = "stale".to_string();
        stale.updated_at = note.updated_at - Duration::seconds(30);
        cache.put(stale).await.unwrap();

        let stored = cache.get(&note.id).await.unwrap().unwrap();
        assert_eq!(stored.title, "stale");
        assert_eq!(stored.updated_at, note.updated_at);
    }

    #[tokio::test]
    async fn test_soft_delete_then_hard_delete() {
        let cache = SqliteCache::open_in_memory().unwrap();
        let note = draft("doomed");
        cache.put(note.clone()).await.unwrap();

        cache.soft_delete(&note.id).await.unwrap();
        let stored = cache.get(&note.id).await.unwrap().unwrap();
        assert!(stored.deleted);
        assert!(!stored.synced);

        cache.delete(&note.id).await.unwrap();
        assert!(cache.get(&note.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_soft_delete_missing_is_noop() {
        let cache = SqliteCache::open_in_memory().unwrap();
        cache.soft_delete(&NoteId::new()).await.unwrap();
        assert!(cache.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("notes.db");
        let mut note = draft("durable");
        at_ms(&mut note);

        {
            let cache = SqliteCache::open(&path).unwrap();
            cache.put(note.clone()).await.unwrap();
        }

        let cache = SqliteCache::open(&path).unwrap();
        let fetched = cache.get(&note.id).await.unwrap().unwrap();
        assert_eq!(fetched, note);
    }
}

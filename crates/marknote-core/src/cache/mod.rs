//! Durable local cache for note records

mod memory;
mod sqlite;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{LocalNote, NoteId};

pub use memory::MemoryCache;
pub use sqlite::SqliteCache;

/// Trait for the durable key-value store holding cached notes
///
/// All operations are atomic per record; no cross-record transactions are
/// assumed. `list` orders newest-first as a presentation convenience.
#[async_trait]
pub trait LocalCache: Send + Sync {
    /// All cached records, tombstones included, by `updated_at` descending
    async fn list(&self) -> Result<Vec<LocalNote>>;

    /// Fetch a single record by ID
    async fn get(&self, id: &NoteId) -> Result<Option<LocalNote>>;

    /// Insert-or-replace a record keyed by its ID
    ///
    /// `updated_at` never regresses: if an existing record carries a newer
    /// timestamp, the stored record keeps the newer one.
    async fn put(&self, note: LocalNote) -> Result<()>;

    /// Hard-remove a record; no-op if absent
    async fn delete(&self, id: &NoteId) -> Result<()>;

    /// Mark a record as a tombstone pending remote deletion; no-op if absent
    ///
    /// Sets `deleted = true`, `synced = false` and bumps `updated_at`.
    async fn soft_delete(&self, id: &NoteId) -> Result<()>;
}

//! In-memory cache implementation

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::{Error, Result};
use crate::models::{LocalNote, NoteId, SyncStatus};

use super::LocalCache;

/// Non-durable [`LocalCache`] backed by a `HashMap`
///
/// Useful for tests and throwaway sessions; production front ends use
/// [`super::SqliteCache`].
#[derive(Default)]
pub struct MemoryCache {
    notes: Mutex<HashMap<NoteId, LocalNote>>,
}

impl MemoryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<NoteId, LocalNote>>> {
        self.notes
            .lock()
            .map_err(|_| Error::Cache("memory cache poisoned".to_string()))
    }
}

#[async_trait]
impl LocalCache for MemoryCache {
    async fn list(&self) -> Result<Vec<LocalNote>> {
        let notes = self.lock()?;
        let mut all: Vec<LocalNote> = notes.values().cloned().collect();
        all.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(all)
    }

    async fn get(&self, id: &NoteId) -> Result<Option<LocalNote>> {
        Ok(self.lock()?.get(id).cloned())
    }

    async fn put(&self, mut note: LocalNote) -> Result<()> {
        let mut notes = self.lock()?;
        if let Some(existing) = notes.get(&note.id) {
            if existing.updated_at > note.updated_at {
                note.updated_at = existing.updated_at;
            }
        }
        notes.insert(note.id, note);
        Ok(())
    }

    async fn delete(&self, id: &NoteId) -> Result<()> {
        self.lock()?.remove(id);
        Ok(())
    }

    async fn soft_delete(&self, id: &NoteId) -> Result<()> {
        let mut notes = self.lock()?;
        if let Some(note) = notes.get_mut(id) {
            note.deleted = true;
            note.synced = false;
            note.sync_status = SyncStatus::Unsynced;
            note.updated_at = Utc::now();
        }
        Ok(())
    }
}

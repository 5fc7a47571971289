//! Test doubles shared across unit tests

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use crate::cache::{LocalCache, MemoryCache};
use crate::error::Result;
use crate::models::{LocalNote, Note, NoteId};
use crate::remote::{NoteDraft, NoteUpdate, RemoteClient, RemoteError, RemoteResult};

fn unavailable() -> RemoteError {
    RemoteError::Api {
        status: 503,
        message: "injected failure".to_string(),
    }
}

/// In-memory remote collection with scripted failures
#[derive(Default)]
pub struct MockRemote {
    notes: Mutex<Vec<Note>>,
    fail_list: AtomicBool,
    fail_ids: Mutex<HashSet<NoteId>>,
    vanished_updates: Mutex<HashSet<NoteId>>,
    create_calls: AtomicUsize,
    list_delay: Mutex<Option<Duration>>,
}

impl MockRemote {
    pub fn insert(&self, note: Note) {
        self.notes.lock().unwrap().push(note);
    }

    pub fn note(&self, id: &NoteId) -> Option<Note> {
        self.notes.lock().unwrap().iter().find(|n| n.id == *id).cloned()
    }

    pub fn len(&self) -> usize {
        self.notes.lock().unwrap().len()
    }

    /// Every create/update/delete touching this id fails
    pub fn fail_on(&self, id: NoteId) {
        self.fail_ids.lock().unwrap().insert(id);
    }

    /// Updates to this id answer `NotFound` even while it is listed,
    /// simulating a deletion racing the snapshot
    pub fn vanish_on_update(&self, id: NoteId) {
        self.vanished_updates.lock().unwrap().insert(id);
    }

    pub fn set_fail_list(&self, fail: bool) {
        self.fail_list.store(fail, Ordering::SeqCst);
    }

    pub fn set_list_delay(&self, delay: Duration) {
        *self.list_delay.lock().unwrap() = Some(delay);
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    fn fails(&self, id: &NoteId) -> bool {
        self.fail_ids.lock().unwrap().contains(id)
    }
}

#[async_trait]
impl RemoteClient for MockRemote {
    async fn list_all(&self) -> RemoteResult<Vec<Note>> {
        let delay = *self.list_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        Ok(self.notes.lock().unwrap().clone())
    }

    async fn create(&self, draft: &NoteDraft) -> RemoteResult<Note> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let id = draft.id.unwrap_or_default();
        if self.fails(&id) {
            return Err(unavailable());
        }

        let mut notes = self.notes.lock().unwrap();
        let updated_at = draft.updated_at.unwrap_or_else(Utc::now);
        // Provided-id collision is an upsert, like the real collection
        if let Some(existing) = notes.iter_mut().find(|n| n.id == id) {
            existing.title.clone_from(&draft.title);
            existing.content.clone_from(&draft.content);
            existing.updated_at = updated_at;
            existing.synced = true;
            return Ok(existing.clone());
        }

        let note = Note {
            id,
            title: draft.title.clone(),
            content: draft.content.clone(),
            updated_at,
            synced: true,
        };
        notes.push(note.clone());
        Ok(note)
    }

    async fn update(&self, id: &NoteId, update: &NoteUpdate) -> RemoteResult<Note> {
        if self.fails(id) {
            return Err(unavailable());
        }
        if self.vanished_updates.lock().unwrap().contains(id) {
            return Err(RemoteError::NotFound(id.as_str()));
        }

        let mut notes = self.notes.lock().unwrap();
        let Some(existing) = notes.iter_mut().find(|n| n.id == *id) else {
            return Err(RemoteError::NotFound(id.as_str()));
        };
        if let Some(title) = &update.title {
            existing.title.clone_from(title);
        }
        if let Some(content) = &update.content {
            existing.content.clone_from(content);
        }
        existing.updated_at = update.updated_at.unwrap_or_else(Utc::now);
        existing.synced = true;
        Ok(existing.clone())
    }

    async fn delete(&self, id: &NoteId) -> RemoteResult<()> {
        if self.fails(id) {
            return Err(unavailable());
        }
        // Absence is success
        self.notes.lock().unwrap().retain(|n| n.id != *id);
        Ok(())
    }
}

/// [`MemoryCache`] wrapper counting writes and injecting failures
#[derive(Default)]
pub struct FlakyCache {
    inner: MemoryCache,
    puts: AtomicUsize,
    fail_put: AtomicBool,
    fail_soft_delete: AtomicBool,
}

impl FlakyCache {
    pub fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn set_fail_put(&self, fail: bool) {
        self.fail_put.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_soft_delete(&self, fail: bool) {
        self.fail_soft_delete.store(fail, Ordering::SeqCst);
    }

    fn write_failed() -> crate::error::Error {
        crate::error::Error::Cache("injected write failure".to_string())
    }
}

#[async_trait]
impl LocalCache for FlakyCache {
    async fn list(&self) -> Result<Vec<LocalNote>> {
        self.inner.list().await
    }

    async fn get(&self, id: &NoteId) -> Result<Option<LocalNote>> {
        self.inner.get(id).await
    }

    async fn put(&self, note: LocalNote) -> Result<()> {
        if self.fail_put.load(Ordering::SeqCst) {
            return Err(Self::write_failed());
        }
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.inner.put(note).await
    }

    async fn delete(&self, id: &NoteId) -> Result<()> {
        self.inner.delete(id).await
    }

    async fn soft_delete(&self, id: &NoteId) -> Result<()> {
        if self.fail_soft_delete.load(Ordering::SeqCst) {
            return Err(Self::write_failed());
        }
        self.inner.soft_delete(id).await
    }
}

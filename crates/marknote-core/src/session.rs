//! Editing-session layer over the cache and sync engine
//!
//! Serializes rapid edit events into debounced durable writes and keeps a
//! live projection of the cache for the UI. Every durable mutation fires an
//! opportunistic, non-blocking sync cycle.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, warn};

use crate::cache::LocalCache;
use crate::error::{Error, Result};
use crate::models::{LocalNote, NoteId, NotePatch};
use crate::remote::RemoteClient;
use crate::sync::SyncEngine;

/// Coalescing window for autosave writes
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(600);

struct SessionState {
    /// Live (non-tombstoned) projection of the cache, newest first
    notes: Vec<LocalNote>,
    /// The note currently open for editing
    draft: Option<LocalNote>,
}

struct SessionInner<C, R> {
    cache: Arc<C>,
    engine: Arc<SyncEngine<C, R>>,
    state: Mutex<SessionState>,
    /// Debounce generation: a scheduled write only fires if it is still the
    /// newest when its window elapses
    autosave_seq: AtomicU64,
}

/// Mediates UI-facing note operations on top of the cache and sync engine
pub struct NoteSessionManager<C, R> {
    inner: Arc<SessionInner<C, R>>,
}

impl<C, R> Clone for NoteSessionManager<C, R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C, R> NoteSessionManager<C, R>
where
    C: LocalCache + 'static,
    R: RemoteClient + 'static,
{
    /// Create a session over the given cache and engine
    ///
    /// Must be called within a tokio runtime: the session spawns a listener
    /// that reloads the projection after every sync cycle.
    #[must_use]
    pub fn new(cache: Arc<C>, engine: Arc<SyncEngine<C, R>>) -> Self {
        let inner = Arc::new(SessionInner {
            cache,
            engine,
            state: Mutex::new(SessionState {
                notes: Vec::new(),
                draft: None,
            }),
            autosave_seq: AtomicU64::new(0),
        });
        spawn_refresh_listener(&inner);
        Self { inner }
    }

    /// Reload the projection from the cache
    pub async fn reload(&self) -> Result<()> {
        SessionInner::reload(&self.inner).await
    }

    /// The live notes projection, newest first
    pub fn notes(&self) -> Vec<LocalNote> {
        self.inner
            .lock_state()
            .map(|state| state.notes.clone())
            .unwrap_or_default()
    }

    /// The note currently open for editing, if any
    pub fn draft(&self) -> Option<LocalNote> {
        self.inner
            .lock_state()
            .ok()
            .and_then(|state| state.draft.clone())
    }

    /// Open an editing session for a new note
    ///
    /// Allocates a fresh id and an empty placeholder draft immediately, so
    /// autosave always has a record to merge into.
    pub fn open_new(&self) -> LocalNote {
        let draft = LocalNote::new_draft();
        if let Ok(mut state) = self.inner.lock_state() {
            state.draft = Some(draft.clone());
        }
        draft
    }

    /// Open an editing session for an existing note
    pub async fn open(&self, id: &NoteId) -> Result<LocalNote> {
        let note = self
            .inner
            .cache
            .get(id)
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        let mut state = self.inner.lock_state()?;
        state.draft = Some(note.clone());
        Ok(note)
    }

    /// Close the editing session, discarding any pending autosave
    pub fn close(&self) {
        self.inner.autosave_seq.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut state) = self.inner.lock_state() {
            state.draft = None;
        }
    }

    /// Merge an edit into the open draft and schedule a debounced durable
    /// write
    ///
    /// The projection reflects the merge immediately. A newer autosave within
    /// the window supersedes the pending write, so exactly the last edit is
    /// persisted.
    pub fn autosave(&self, patch: &NotePatch) -> Result<LocalNote> {
        let merged = self.merge_into_draft(patch)?;

        let seq = self.inner.autosave_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let inner = Arc::clone(&self.inner);
        let pending = merged.clone();
        tokio::spawn(async move {
            tokio::time::sleep(DEBOUNCE_WINDOW).await;
            if inner.autosave_seq.load(Ordering::SeqCst) != seq {
                // Superseded by a newer edit or an explicit save
                return;
            }
            if let Err(err) = SessionInner::flush(&inner, pending).await {
                warn!(%err, "debounced autosave failed");
            }
        });

        Ok(merged)
    }

    /// Write the open draft durably right now, bypassing the debounce window
    ///
    /// Returns after the durable local write, not after remote sync.
    pub async fn save(&self, patch: &NotePatch) -> Result<LocalNote> {
        let merged = self.merge_into_draft(patch)?;
        // Supersede any pending debounced write; this one is authoritative
        self.inner.autosave_seq.fetch_add(1, Ordering::SeqCst);
        SessionInner::flush(&self.inner, merged.clone()).await?;
        Ok(merged)
    }

    /// Soft-delete a note and schedule its remote deletion
    ///
    /// The projection drops the note optimistically; if the durable write
    /// fails the projection is reloaded from the cache and the error
    /// surfaced.
    pub async fn delete(&self, id: &NoteId) -> Result<()> {
        {
            let mut state = self.inner.lock_state()?;
            state.notes.retain(|n| n.id != *id);
            if state.draft.as_ref().is_some_and(|d| d.id == *id) {
                state.draft = None;
            }
        }

        if let Err(err) = self.inner.cache.soft_delete(id).await {
            if let Err(reload_err) = SessionInner::reload(&self.inner).await {
                warn!(%reload_err, "failed to reload after delete rollback");
            }
            return Err(err);
        }

        SessionInner::reload(&self.inner).await?;
        SessionInner::trigger_sync(&self.inner);
        Ok(())
    }

    /// Merge a patch into the draft (creating a fresh draft when none is
    /// open) and mirror the result into the projection
    fn merge_into_draft(&self, patch: &NotePatch) -> Result<LocalNote> {
        let mut state = self.inner.lock_state()?;
        let draft = state.draft.get_or_insert_with(LocalNote::new_draft);
        draft.apply(patch, Utc::now());
        let merged = draft.clone();
        upsert_projection(&mut state.notes, merged.clone());
        Ok(merged)
    }
}

impl<C, R> SessionInner<C, R>
where
    C: LocalCache + 'static,
    R: RemoteClient + 'static,
{
    fn lock_state(&self) -> Result<MutexGuard<'_, SessionState>> {
        self.state
            .lock()
            .map_err(|_| Error::Cache("session state poisoned".to_string()))
    }

    async fn reload(inner: &Arc<Self>) -> Result<()> {
        let all = inner.cache.list().await?;
        let mut state = inner.lock_state()?;
        state.notes = all.into_iter().filter(|n| !n.deleted).collect();
        Ok(())
    }

    /// Durable write followed by projection refresh and opportunistic sync
    async fn flush(inner: &Arc<Self>, note: LocalNote) -> Result<()> {
        inner.cache.put(note).await?;
        Self::reload(inner).await?;
        Self::trigger_sync(inner);
        Ok(())
    }

    /// Fire-and-forget sync; skips and failures are retried on later
    /// triggers
    fn trigger_sync(inner: &Arc<Self>) {
        let engine = Arc::clone(&inner.engine);
        tokio::spawn(async move {
            if let Err(err) = engine.sync().await {
                debug!(%err, "opportunistic sync failed");
            }
        });
    }
}

/// Replace-or-insert into the projection, keeping newest-first order
fn upsert_projection(notes: &mut Vec<LocalNote>, note: LocalNote) {
    notes.retain(|n| n.id != note.id);
    notes.push(note);
    notes.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
}

/// Reload the projection whenever the engine finishes a cycle
fn spawn_refresh_listener<C, R>(inner: &Arc<SessionInner<C, R>>)
where
    C: LocalCache + 'static,
    R: RemoteClient + 'static,
{
    let mut changes = inner.engine.subscribe_changes();
    let weak: Weak<SessionInner<C, R>> = Arc::downgrade(inner);
    tokio::spawn(async move {
        while changes.changed().await.is_ok() {
            let Some(inner) = weak.upgrade() else { break };
            if let Err(err) = SessionInner::reload(&inner).await {
                warn!(%err, "projection reload failed");
            }
        }
    });
}

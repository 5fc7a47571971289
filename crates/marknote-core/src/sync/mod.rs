//! Offline-first sync engine.
//!
//! The [`SyncEngine`] reconciles the full local cache with the full remote
//! snapshot in one pass (a "sync cycle"):
//!
//! 1. Fetch the remote snapshot, then the local snapshot (tombstones
//!    included).
//! 2. **Push phase** — per record: tombstones are deleted remotely and then
//!    purged locally; unsynced records are updated (id known remotely) or
//!    created (id unknown) and the server-confirmed fields merged back.
//! 3. **Pull phase** — remote records with no local counterpart are inserted;
//!    a known record is overwritten only when the remote revision is strictly
//!    newer and the local record has no pending write of its own.
//!
//! Every record is reconciled independently: one record's failure marks that
//! record `error` and moves on. Only a failed snapshot fetch aborts the
//! cycle, which then gates future cycles behind [`ERROR_COOLDOWN`].

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::cache::LocalCache;
use crate::connectivity::ConnectivityMonitor;
use crate::error::Result;
use crate::models::{LocalNote, Note, NoteId, SyncStatus};
use crate::remote::{NoteDraft, NoteUpdate, RemoteClient};

/// Gate on whole-cycle failures: no new cycle starts within this window
/// after one fails
pub const ERROR_COOLDOWN: Duration = Duration::from_millis(5000);

/// Engine-level sync state published to front ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Offline,
    Syncing,
    Synced,
    Error,
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Offline => write!(f, "offline"),
            Self::Syncing => write!(f, "syncing"),
            Self::Synced => write!(f, "synced"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Why a requested cycle did not run
///
/// Skips are silent by design: the next qualifying trigger retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Connectivity is currently reported as unavailable
    Offline,
    /// Another cycle is in flight in this process
    InFlight,
    /// A whole-cycle failure occurred within [`ERROR_COOLDOWN`]
    Cooldown,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Offline => write!(f, "offline"),
            Self::InFlight => write!(f, "cycle already in flight"),
            Self::Cooldown => write!(f, "error cooldown active"),
        }
    }
}

/// Per-cycle accounting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Local edits pushed and confirmed by the remote
    pub pushed: usize,
    /// Tombstones whose remote deletion was confirmed and that were purged
    pub purged: usize,
    /// Remote revisions inserted or adopted locally
    pub pulled: usize,
    /// Records left in `error` status this cycle
    pub record_errors: usize,
}

/// Outcome of a sync request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// An entry guard rejected the cycle
    Skipped(SkipReason),
    /// The cycle ran to completion (per-record failures included)
    Completed(CycleReport),
}

/// Orchestrates reconciliation between the local cache and the remote store
pub struct SyncEngine<C, R> {
    cache: Arc<C>,
    remote: Arc<R>,
    connectivity: ConnectivityMonitor,
    /// In-flight guard: at most one cycle per process
    in_flight: Mutex<()>,
    last_cycle_error: StdMutex<Option<Instant>>,
    state: watch::Sender<SyncState>,
    /// Bumped after every cycle so projections reload from the cache
    changed: watch::Sender<u64>,
}

impl<C, R> SyncEngine<C, R>
where
    C: LocalCache + 'static,
    R: RemoteClient + 'static,
{
    #[must_use]
    pub fn new(cache: Arc<C>, remote: Arc<R>, connectivity: ConnectivityMonitor) -> Self {
        let initial = if connectivity.is_online() {
            SyncState::Synced
        } else {
            SyncState::Offline
        };
        let (state, _) = watch::channel(initial);
        let (changed, _) = watch::channel(0);
        Self {
            cache,
            remote,
            connectivity,
            in_flight: Mutex::new(()),
            last_cycle_error: StdMutex::new(None),
            state,
            changed,
        }
    }

    /// Current engine state
    #[must_use]
    pub fn state(&self) -> SyncState {
        *self.state.borrow()
    }

    /// Subscribe to engine state transitions
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    /// Subscribe to cache-changed notifications (one bump per finished cycle)
    #[must_use]
    pub fn subscribe_changes(&self) -> watch::Receiver<u64> {
        self.changed.subscribe()
    }

    /// Run one sync cycle, subject to the entry guards
    ///
    /// Returns `Ok(Skipped(_))` when a guard rejects the request,
    /// `Ok(Completed(_))` when the cycle ran (per-record failures are
    /// reported in the [`CycleReport`], not as errors), and `Err(_)` on a
    /// whole-cycle failure.
    pub async fn sync(&self) -> Result<CycleOutcome> {
        if !self.connectivity.is_online() {
            debug!("sync skipped: offline");
            return Ok(CycleOutcome::Skipped(SkipReason::Offline));
        }
        if self.in_cooldown() {
            debug!("sync skipped: error cooldown active");
            return Ok(CycleOutcome::Skipped(SkipReason::Cooldown));
        }
        let Ok(_guard) = self.in_flight.try_lock() else {
            debug!("sync skipped: cycle already in flight");
            return Ok(CycleOutcome::Skipped(SkipReason::InFlight));
        };

        self.state.send_replace(SyncState::Syncing);
        let result = self.run_cycle().await;

        // Projections reload from the cache after every cycle, success or not.
        self.changed.send_modify(|generation| *generation += 1);

        match result {
            Ok(report) => {
                self.clear_cycle_error();
                self.state.send_replace(SyncState::Synced);
                info!(
                    pushed = report.pushed,
                    purged = report.purged,
                    pulled = report.pulled,
                    record_errors = report.record_errors,
                    "sync cycle complete"
                );
                Ok(CycleOutcome::Completed(report))
            }
            Err(err) => {
                self.record_cycle_error();
                self.state.send_replace(SyncState::Error);
                error!(%err, "sync cycle failed");
                Err(err)
            }
        }
    }

    /// Background driver: syncs when connectivity is regained and on a
    /// periodic tick, retrying indefinitely
    pub async fn run(self: Arc<Self>, interval: Duration) {
        let mut connectivity = self.connectivity.subscribe();
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                changed = connectivity.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    if *connectivity.borrow_and_update() {
                        debug!("connectivity regained");
                        self.try_sync().await;
                    } else {
                        self.state.send_replace(SyncState::Offline);
                    }
                }
                _ = ticker.tick() => {
                    self.try_sync().await;
                }
            }
        }
    }

    async fn try_sync(&self) {
        if let Err(err) = self.sync().await {
            warn!(%err, "sync cycle failed; retrying on next trigger");
        }
    }

    async fn run_cycle(&self) -> Result<CycleReport> {
        let remote_notes = self.remote.list_all().await?;
        let local_notes = self.cache.list().await?;
        debug!(
            remote = remote_notes.len(),
            local = local_notes.len(),
            "starting sync cycle"
        );

        let mut report = CycleReport::default();
        let reconciled = self
            .push_phase(&remote_notes, local_notes, &mut report)
            .await;
        self.pull_phase(remote_notes, &reconciled, &mut report)
            .await?;
        Ok(report)
    }

    /// Push every pending local change, isolating failures per record
    ///
    /// Returns the ids successfully reconciled (pushed or purged) this
    /// cycle; the pull phase must not revisit them, since the remote
    /// snapshot predates these writes.
    async fn push_phase(
        &self,
        remote_notes: &[Note],
        local_notes: Vec<LocalNote>,
        report: &mut CycleReport,
    ) -> HashSet<NoteId> {
        let mut reconciled = HashSet::new();
        for note in local_notes {
            if note.deleted {
                match self.push_tombstone(&note).await {
                    Ok(()) => {
                        reconciled.insert(note.id);
                        report.purged += 1;
                    }
                    Err(err) => {
                        warn!(id = %note.id, %err, "failed to push deletion");
                        report.record_errors += 1;
                        self.mark_record_error(note).await;
                    }
                }
            } else if !note.synced {
                match self.push_edit(remote_notes, &note).await {
                    Ok(()) => {
                        reconciled.insert(note.id);
                        report.pushed += 1;
                    }
                    Err(err) => {
                        warn!(id = %note.id, %err, "failed to push edit");
                        report.record_errors += 1;
                        self.mark_record_error(note).await;
                    }
                }
            }
        }
        reconciled
    }

    async fn push_tombstone(&self, note: &LocalNote) -> Result<()> {
        self.remote.delete(&note.id).await?;
        self.cache.delete(&note.id).await
    }

    async fn push_edit(&self, remote_notes: &[Note], note: &LocalNote) -> Result<()> {
        let known_remotely = remote_notes.iter().any(|r| r.id == note.id);
        let confirmed = if known_remotely {
            self.remote
                .update(
                    &note.id,
                    &NoteUpdate {
                        title: Some(note.title.clone()),
                        content: Some(note.content.clone()),
                        updated_at: Some(note.updated_at),
                    },
                )
                .await?
        } else {
            // Client id included so the server cannot create a duplicate
            self.remote
                .create(&NoteDraft {
                    id: Some(note.id),
                    title: note.title.clone(),
                    content: note.content.clone(),
                    updated_at: Some(note.updated_at),
                })
                .await?
        };

        let mut merged = note.clone();
        merged.adopt_remote(&confirmed);
        self.cache.put(merged).await
    }

    /// Record a per-record failure; the record is retried next cycle
    async fn mark_record_error(&self, mut note: LocalNote) {
        note.sync_status = SyncStatus::Error;
        if let Err(err) = self.cache.put(note).await {
            warn!(%err, "failed to persist record error status");
        }
    }

    /// Adopt remote changes not shadowed by a pending local write
    async fn pull_phase(
        &self,
        remote_notes: Vec<Note>,
        reconciled: &HashSet<NoteId>,
        report: &mut CycleReport,
    ) -> Result<()> {
        // Post-push snapshot, so this phase observes the pushed state
        let local_notes = self.cache.list().await?;

        for server_note in remote_notes {
            if reconciled.contains(&server_note.id) {
                continue;
            }
            let incoming = match local_notes.iter().find(|l| l.id == server_note.id) {
                None => LocalNote::from_remote(server_note),
                Some(existing) if remote_wins(existing, &server_note) => {
                    LocalNote::from_remote(server_note)
                }
                Some(_) => continue,
            };

            let id = incoming.id;
            match self.cache.put(incoming).await {
                Ok(()) => report.pulled += 1,
                Err(err) => {
                    warn!(%id, %err, "failed to adopt remote revision");
                    report.record_errors += 1;
                }
            }
        }
        Ok(())
    }

    fn in_cooldown(&self) -> bool {
        self.last_cycle_error
            .lock()
            .ok()
            .and_then(|guard| *guard)
            .is_some_and(|at| at.elapsed() < ERROR_COOLDOWN)
    }

    fn record_cycle_error(&self) {
        if let Ok(mut guard) = self.last_cycle_error.lock() {
            *guard = Some(Instant::now());
        }
    }

    fn clear_cycle_error(&self) {
        if let Ok(mut guard) = self.last_cycle_error.lock() {
            *guard = None;
        }
    }
}

/// Last-write-wins, but only once the local side has no pending write of its
/// own: an unsynced or tombstoned record is never clobbered by the pull
/// phase
fn remote_wins(existing: &LocalNote, incoming: &Note) -> bool {
    incoming.updated_at > existing.updated_at && existing.synced && !existing.deleted
}

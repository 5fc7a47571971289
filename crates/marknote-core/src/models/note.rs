//! Note model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A unique identifier for a note, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NoteId(Uuid);

impl NoteId {
    /// Create a new unique note ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for NoteId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for NoteId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Per-note sync state as shown in the UI.
///
/// This is a display refinement only: reconciliation decisions read the
/// `synced` and `deleted` flags, never this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Synced,
    #[default]
    Unsynced,
    Syncing,
    Error,
}

impl SyncStatus {
    /// Stable string form used for storage and display
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Synced => "synced",
            Self::Unsynced => "unsynced",
            Self::Syncing => "syncing",
            Self::Error => "error",
        }
    }
}

impl FromStr for SyncStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "synced" => Ok(Self::Synced),
            "unsynced" => Ok(Self::Unsynced),
            "syncing" => Ok(Self::Syncing),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown sync status: {other}")),
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A note as the remote collection sees it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    /// Unique identifier
    pub id: NoteId,
    /// Note title
    pub title: String,
    /// Markdown source
    pub content: String,
    /// Last update timestamp (ISO-8601 on the wire)
    pub updated_at: DateTime<Utc>,
    /// Whether this exact revision is known to match the remote store
    pub synced: bool,
}

/// A note as stored in the local cache
///
/// Extends [`Note`] with a tombstone flag and the UI-facing sync status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalNote {
    pub id: NoteId,
    pub title: String,
    pub content: String,
    pub updated_at: DateTime<Utc>,
    pub synced: bool,
    /// Tombstone: marked for deletion locally, retained until the remote
    /// deletion is confirmed
    #[serde(rename = "_deleted", default, skip_serializing_if = "is_false")]
    pub deleted: bool,
    #[serde(default)]
    pub sync_status: SyncStatus,
}

#[allow(clippy::trivially_copy_pass_by_ref)] // serde skip_serializing_if signature
fn is_false(value: &bool) -> bool {
    !value
}

impl LocalNote {
    /// Create an empty placeholder draft with a fresh ID
    #[must_use]
    pub fn new_draft() -> Self {
        Self {
            id: NoteId::new(),
            title: String::new(),
            content: String::new(),
            updated_at: Utc::now(),
            synced: false,
            deleted: false,
            sync_status: SyncStatus::Unsynced,
        }
    }

    /// Build a cached record from a remote revision, marked as synced
    #[must_use]
    pub fn from_remote(note: Note) -> Self {
        Self {
            id: note.id,
            title: note.title,
            content: note.content,
            updated_at: note.updated_at,
            synced: true,
            deleted: false,
            sync_status: SyncStatus::Synced,
        }
    }

    /// Merge a partial edit into this record, marking it as pending sync
    pub fn apply(&mut self, patch: &NotePatch, now: DateTime<Utc>) {
        if let Some(title) = &patch.title {
            self.title.clone_from(title);
        }
        if let Some(content) = &patch.content {
            self.content.clone_from(content);
        }
        self.updated_at = now;
        self.synced = false;
        self.sync_status = SyncStatus::Unsynced;
    }

    /// Adopt the server-confirmed revision of this note
    pub fn adopt_remote(&mut self, note: &Note) {
        self.title.clone_from(&note.title);
        self.content.clone_from(&note.content);
        self.updated_at = note.updated_at;
        self.synced = true;
        self.sync_status = SyncStatus::Synced;
    }

    /// The remote-facing projection of this record
    #[must_use]
    pub fn to_note(&self) -> Note {
        Note {
            id: self.id,
            title: self.title.clone(),
            content: self.content.clone(),
            updated_at: self.updated_at,
            synced: self.synced,
        }
    }
}

/// A partial edit to a note's user-visible fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotePatch {
    pub title: Option<String>,
    pub content: Option<String>,
}

impl NotePatch {
    /// Patch that replaces the title
    #[must_use]
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            content: None,
        }
    }

    /// Patch that replaces the content
    #[must_use]
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            title: None,
            content: Some(content.into()),
        }
    }
}

//! Remote collection client for note records

mod http;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{Note, NoteId};

pub use http::HttpRemoteClient;

/// Remote-visible error conditions relevant to reconciliation
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The targeted id does not exist remotely
    #[error("Remote note not found: {0}")]
    NotFound(String),
    /// Duplicate id on create
    #[error("Remote note id conflict: {0}")]
    Conflict(String),
    /// Transient network or transport failure
    #[error("Network failure: {0}")]
    Network(#[from] reqwest::Error),
    /// Non-success response from the remote API
    #[error("Remote API error: {message} ({status})")]
    Api { status: u16, message: String },
}

pub type RemoteResult<T> = Result<T, RemoteError>;

/// Payload for creating a note remotely
///
/// The id is included when the client allocated one, so the server echoes it
/// back instead of generating a duplicate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteDraft {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<NoteId>,
    pub title: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Partial update payload for an existing remote note
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Trait for the remote collection resource
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Full remote snapshot
    async fn list_all(&self) -> RemoteResult<Vec<Note>>;

    /// Create a note; the server echoes a provided id or assigns one
    async fn create(&self, draft: &NoteDraft) -> RemoteResult<Note>;

    /// Update an existing note; fails with [`RemoteError::NotFound`] if the
    /// id is unknown remotely
    async fn update(&self, id: &NoteId, update: &NoteUpdate) -> RemoteResult<Note>;

    /// Delete a note; an already-absent record is a successful no-op
    async fn delete(&self, id: &NoteId) -> RemoteResult<()>;
}

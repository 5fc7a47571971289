//! marknote-core - Core library for marknote
//!
//! This crate contains the note models, the durable local cache, the remote
//! collection client, and the offline-first sync engine shared by all
//! marknote front ends.

pub mod cache;
pub mod connectivity;
pub mod error;
pub mod models;
pub mod remote;
pub mod session;
pub mod sync;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{Error, Result};
pub use models::{LocalNote, Note, NoteId, NotePatch, SyncStatus};

//! Data models for marknote

mod note;

pub use note::{LocalNote, Note, NoteId, NotePatch, SyncStatus};

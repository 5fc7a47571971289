//! Error types for marknote-core

use thiserror::Error;

use crate::remote::RemoteError;

/// Result type alias using marknote-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in marknote-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Local cache error
    #[error("Cache error: {0}")]
    Cache(String),

    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Remote store error
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    /// Note not found
    #[error("Note not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

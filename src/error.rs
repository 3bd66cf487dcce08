//! Error types shared across the crate.
//! Nothing here is fatal: callers log these and degrade to empty/absent results.

use thiserror::Error;

use crate::model::CryInstance;

/// Failure reported by a [`crate::history::StoragePort`] backend.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("storage quota exceeded: {needed} bytes needed, {available} available")]
    QuotaExceeded { needed: usize, available: usize },

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure surfaced by [`crate::history::HistoryStore`] operations.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Storage(#[from] StorageError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("blob writer is not running")]
    WriterClosed,

    #[error("store was cleared before the audio blob for {id} was written")]
    Cleared { id: String },

    #[error("entry {id} was evicted before its audio blob was written")]
    Evicted { id: String },
}

/// A cry that was detected and analyzed but whose record could not be stored.
/// Carries the instance so the caller can still act on it.
#[derive(Error, Debug)]
#[error("cry {} not persisted: {source}", .instance.id)]
pub struct PersistError {
    pub instance: Box<CryInstance>,
    #[source]
    pub source: StoreError,
}

/// Failure loading a [`crate::config::CoreConfig`] from disk.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Failure encoding captured samples into an attachment payload.
#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("WAV encoding error: {0}")]
    Wav(#[from] hound::Error),
}

// error.rs — Error types for the durable store.
//
// A StoreError means the durable layer could not be reached or returned
// something it should never have stored. Callers never map it into a
// domain denial: it propagates unmasked so operational tooling can alert.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the store layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Failed to create the directory holding the database file.
    #[error("failed to prepare store directory {path}: {source}")]
    DirectoryFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to open the database.
    #[error("failed to open store at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        source: rusqlite::Error,
    },

    /// Any SQLite failure: lock timeout, constraint violation, I/O.
    #[error("store operation failed: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Failed to serialize a record for storage.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored row holds a value no writer could have produced.
    #[error("corrupt {collection} record: {detail}")]
    Corrupt {
        collection: &'static str,
        detail: String,
    },

    /// A thread panicked while holding the connection.
    #[error("store connection poisoned by a panicked writer")]
    Poisoned,
}

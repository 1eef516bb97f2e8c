use std::path::PathBuf;

use cxo_types::Hash;

/// Errors from object and root store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested object was not found.
    #[error("object not found: {0}")]
    NotFound(Hash),

    /// Offered bytes do not hash to the claimed key.
    #[error("forged content: claimed {claimed}, computed {computed}")]
    ForgedContent { claimed: Hash, computed: Hash },

    /// A different root pack is already stored at this position.
    #[error("root pack conflict for {feed} at seq {seq}")]
    PackConflict { feed: String, seq: u64 },

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A persisted record is malformed.
    #[error("corrupt record at {path}: {reason}")]
    CorruptRecord { path: PathBuf, reason: String },

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A lock guarding in-memory state was poisoned by a panicking writer.
    #[error("store lock poisoned")]
    LockPoisoned,
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

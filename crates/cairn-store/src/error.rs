use cairn_types::{Key, TypeError};

/// Errors from datastore and journal operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A key or argument failed validation.
    #[error("validation error: {0}")]
    Validation(#[from] TypeError),

    /// A journal record failed its checksum or could not be decoded.
    #[error("corrupt journal record {sequence}: {reason}")]
    CorruptRecord { sequence: u64, reason: String },

    /// Stored block content no longer hashes to its key.
    #[error("corrupt block {key}: {reason}")]
    CorruptBlock { key: Key, reason: String },

    /// The storage engine reported on-disk corruption.
    #[error("corrupt storage engine: {0}")]
    CorruptEngine(String),

    /// Serialization failure while encoding a record.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The engine files are held open by another handle or process.
    #[error("storage engine already open")]
    AlreadyOpen,

    /// Any other engine failure.
    #[error("storage engine error: {0}")]
    Engine(String),

    /// A thread panicked while holding a store lock.
    #[error("store lock poisoned")]
    LockPoisoned,
}

impl StoreError {
    /// Returns `true` for errors that indicate persisted data is unreadable.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::CorruptRecord { .. } | Self::CorruptBlock { .. } | Self::CorruptEngine(_)
        )
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

use std::path::PathBuf;

use cairn_store::StoreError;
use cairn_types::TypeError;

use crate::repository::RepoState;

/// Errors from repository lifecycle and datastore access.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    /// A key or argument failed validation.
    #[error("validation error: {0}")]
    Validation(#[from] TypeError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The `config` file exists but cannot be parsed.
    #[error("corrupt config {path}: {reason}")]
    CorruptConfig { path: PathBuf, reason: String },

    /// A caller-supplied configuration is not usable.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// Journal, block or engine data is unreadable.
    #[error("corrupt repository data: {0}")]
    CorruptRecord(StoreError),

    /// Another process holds the repository open.
    #[error("repository is locked by another process: {0}")]
    Lock(PathBuf),

    /// The operation is not valid in the handle's current state.
    #[error("invalid repository state: {operation} requires {required}, handle is {actual}")]
    InvalidState {
        operation: &'static str,
        required: RepoState,
        actual: RepoState,
    },

    #[error("store error: {0}")]
    Store(StoreError),

    /// The configuration could not be rendered as TOML.
    #[error("config serialization error: {0}")]
    ConfigSerialization(String),
}

impl From<StoreError> for RepoError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Validation(e) => Self::Validation(e),
            StoreError::Io(e) => Self::Io(e),
            e if e.is_corruption() => Self::CorruptRecord(e),
            e => Self::Store(e),
        }
    }
}

impl RepoError {
    /// Returns `true` if on-disk repository data is unreadable.
    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::CorruptConfig { .. } | Self::CorruptRecord(_))
    }
}

/// Result alias for repository operations.
pub type RepoResult<T> = Result<T, RepoError>;

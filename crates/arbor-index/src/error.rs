//! Error types for the index crate.

/// Errors that can occur during index operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// The specified path was not found in the index.
    #[error("path not found in index: {0}")]
    PathNotFound(String),

    /// The operation needs a conflict-free index.
    #[error("unresolved conflict at path: {0}")]
    UnresolvedConflict(String),

    /// Store operation failed.
    #[error("store error: {0}")]
    Store(#[from] arbor_store::StoreError),

    /// Serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// An invalid path was provided.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Reading or writing the index file or the worktree failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The index file failed its header or checksum validation.
    #[error("corrupt index file: {0}")]
    Corrupt(String),

    /// The index file was written by an incompatible version.
    #[error("unsupported index version {0}")]
    UnsupportedVersion(u32),
}

/// Convenience alias for index results.
pub type IndexResult<T> = Result<T, IndexError>;

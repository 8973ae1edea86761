//! Error types for commit history.

use arbor_types::ObjectId;

/// Errors that can occur during history operations.
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    /// A referenced commit is not in the graph.
    #[error("commit not found: {0:?}")]
    NodeNotFound(ObjectId),

    /// A parent of a new commit is not in the graph.
    #[error("dangling parent reference: commit {node:?} references missing parent {parent:?}")]
    DanglingParent {
        node: ObjectId,
        parent: ObjectId,
    },

    /// Attempted to add a commit whose id already exists.
    #[error("duplicate commit: {0:?}")]
    DuplicateNode(ObjectId),

    /// Serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Convenience alias for history results.
pub type HistoryResult<T> = Result<T, HistoryError>;

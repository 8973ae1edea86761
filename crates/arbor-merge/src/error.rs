//! Error types for the merge crate.
//!
//! A [`MergeError`] is always fatal to the merge that raised it. Conflicts
//! are not errors; they are part of a [`MergeResult`](crate::MergeResult).

use arbor_index::IndexError;

/// Unrecoverable conditions that abort a merge.
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    /// Reading or writing an object failed.
    #[error("store error: {0}")]
    Store(#[from] arbor_store::StoreError),

    /// Building or persisting the index failed.
    #[error("index error: {0}")]
    Index(#[from] IndexError),

    /// Merge-base discovery failed.
    #[error("history error: {0}")]
    History(#[from] arbor_history::HistoryError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The worktree update stopped part way.
    #[error("worktree update failed after {written} of {total} paths: {source}")]
    Worktree {
        written: usize,
        total: usize,
        #[source]
        source: IndexError,
    },

    /// The options' internal slot already belongs to a running merge.
    #[error("merge options are already in use by another merge")]
    OptionsInUse,

    /// A tree could not be merged into a consistent shape.
    #[error("corrupt tree structure: {0}")]
    Corrupt(String),
}

/// Convenience alias for fallible merge steps.
pub type MergeFallible<T> = Result<T, MergeError>;

/// A merge option string or config value was not understood.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OptionParseError {
    #[error("unknown merge option: {0}")]
    Unknown(String),

    #[error("invalid value for {option}: {value}")]
    InvalidValue { option: String, value: String },
}

/// Loading a merge configuration file failed.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Invalid(#[from] OptionParseError),
}

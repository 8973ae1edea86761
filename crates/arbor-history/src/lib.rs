//! Commit history for arbor.
//!
//! Commits link to their parents through shared references, so history can
//! be walked from any commit without a central registry. [`CommitGraph`]
//! adds an id index with validation on insert and answers merge-base
//! queries only for commits it holds. Merge bases are found by
//! [`HistoryWalker::common_ancestors`], which returns the best common
//! ancestors oldest first.
//!
//! # Key Types
//!
//! - [`Commit`] / [`CommitRef`] -- a snapshot tree plus parent links
//! - [`CommitGraph`] -- id-indexed, validated commit set
//! - [`HistoryWalker`] / [`LinkWalker`] -- merge-base discovery

pub mod commit;
pub mod error;
pub mod graph;
pub mod walker;

pub use commit::{Commit, CommitRef};
pub use error::{HistoryError, HistoryResult};
pub use graph::CommitGraph;
pub use walker::{common_ancestors, HistoryWalker, LinkWalker};

//! Merge index for arbor.
//!
//! The index records the outcome of a merge path by path: cleanly merged
//! paths at stage 0 and unresolved paths as up to three entries at stages
//! 1 (base), 2 (ours) and 3 (theirs). It can be built into a tree once all
//! conflicts are resolved, persisted to a durable index file, and replayed
//! onto a [`Worktree`].
//!
//! # Key Types
//!
//! - [`Index`] -- in-memory staged index (BTreeMap-backed)
//! - [`IndexEntry`] / [`Stage`] -- one `(path, stage)` record
//! - [`Worktree`] -- sink for merged file content; [`FsWorktree`] and [`MemoryWorktree`]

pub mod entry;
pub mod error;
pub mod file;
pub mod index;
pub mod worktree;

pub use entry::{IndexEntry, Stage};
pub use error::{IndexError, IndexResult};
pub use index::Index;
pub use worktree::{FsWorktree, MemoryWorktree, Worktree};

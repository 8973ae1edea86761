//! Rename-aware recursive three-way merge for arbor.
//!
//! Two trees are merged against a common base path by path. Renames are
//! detected on each side by content similarity, so an edit on one side
//! follows a file the other side moved. Paths added inside a directory that
//! the other side renamed can follow the directory too. When two commits
//! have several merge bases, the bases are first folded into one virtual
//! base by merging them with each other.
//!
//! Conflicts are part of a successful result: the merged tree carries
//! conflict markers, the index records the base/ours/theirs stages of every
//! unresolved path, and [`MergeResult::conflicts`] lists each one with its
//! kind. Only missing objects, failed writes and similar conditions are
//! fatal.
//!
//! # Key Types
//!
//! - [`MergeOptions`] -- labels, rename and content settings, output control
//! - [`Repo`] -- object store, index, worktree and history a merge runs against
//! - [`MergeResult`] / [`MergeStatus`] -- merged tree, conflicts and renames
//! - [`ConflictEntry`] / [`ConflictKind`] -- one unresolved path
//! - [`MergeConfig`] -- options loaded from a TOML file
//!
//! # Entry Points
//!
//! - [`merge_trees`] -- merge three trees directly
//! - [`merge_recursive`] -- merge two commits, consolidating their merge bases
//! - [`merge_recursive_generic`] -- the same for bare trees, persisting the index
//! - [`consolidate_bases`] -- fold merge bases into one virtual base
//!
//! # Design Rules
//!
//! 1. One [`MergeOptions`] drives at most one merge at a time.
//! 2. Virtual-base merges never touch the index or worktree.
//! 3. The index and worktree are left untouched by a fatal merge.

pub mod config;
pub mod error;
pub mod options;
pub mod parse;
pub mod recursive;
pub mod repo;
pub mod result;
pub mod virtual_commit;

mod content;
mod dir_rename;
mod internal;
mod output;
mod rename;
mod subtree;
mod tree_merge;

pub use config::MergeConfig;
pub use error::{ConfigError, MergeError, MergeFallible, OptionParseError};
pub use options::{
    BufferOutput, DirectoryRenames, MergeOptions, OutputTarget, DEFAULT_RENAME_LIMIT, DEFAULT_RENAME_SCORE,
    MAX_VERBOSITY, VERBOSITY_ENV,
};
pub use parse::parse_merge_opt;
pub use recursive::{
    consolidate_bases, merge_recursive, merge_trees, MERGED_ANCESTORS_LABEL, TEMPORARY_BRANCH_1, TEMPORARY_BRANCH_2,
};
pub use repo::Repo;
pub use result::{ConflictEntry, ConflictKind, MergeResult, MergeStatus, RenameMapping, Side, Variant};
pub use virtual_commit::merge_recursive_generic;

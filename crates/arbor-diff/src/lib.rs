//! Diff services for arbor.
//!
//! Everything the merge engine needs to compare content: path-level tree
//! diffs, a similarity score used for rename pairing, and a line-level
//! three-way merge that renders conflict markers.
//!
//! # Key Types
//!
//! - [`TreeDiff`] / [`TreeChange`] -- path-level diff of two flat trees
//! - [`similarity`] -- percent score of shared content between two blobs
//! - [`merge_blobs`] / [`MergeFileOptions`] / [`MergeFileOutcome`] -- three-way content merge
//! - [`MergeVariant`] / [`ConflictStyle`] / [`DiffAlgorithm`] / [`WhitespaceFlags`] -- merge knobs

pub mod merge3;
pub mod similarity;
pub mod tree_diff;

pub use merge3::{
    is_binary, merge_blobs, ConflictStyle, DiffAlgorithm, MergeFileOptions, MergeFileOutcome,
    MergeVariant, WhitespaceFlags, DEFAULT_MARKER_SIZE,
};
pub use similarity::similarity;
pub use tree_diff::{diff_flat_trees, TreeChange, TreeDiff};

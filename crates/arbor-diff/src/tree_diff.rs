//! Path-level tree diff.
//!
//! Compares two flattened trees and reports added, deleted, modified and
//! mode-changed paths. Renames are not inferred here; pairing deletions with
//! additions is the rename detector's job in the merge crate.

use arbor_store::{EntryMode, FlatTree};
use arbor_types::ObjectId;

/// The result of comparing two trees.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TreeDiff {
    /// Changes in path order.
    pub changes: Vec<TreeChange>,
}

impl TreeDiff {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Paths (with entries) that only exist in the new tree.
    pub fn added(&self) -> impl Iterator<Item = (&str, EntryMode, ObjectId)> {
        self.changes.iter().filter_map(|c| match c {
            TreeChange::Added { path, mode, new_id } => Some((path.as_str(), *mode, *new_id)),
            _ => None,
        })
    }

    /// Paths (with entries) that only exist in the old tree.
    pub fn deleted(&self) -> impl Iterator<Item = (&str, EntryMode, ObjectId)> {
        self.changes.iter().filter_map(|c| match c {
            TreeChange::Deleted { path, mode, old_id } => Some((path.as_str(), *mode, *old_id)),
            _ => None,
        })
    }
}

/// A single change between two trees.
#[derive(Clone, Debug, PartialEq)]
pub enum TreeChange {
    Added {
        path: String,
        new_id: ObjectId,
        mode: EntryMode,
    },
    Deleted {
        path: String,
        old_id: ObjectId,
        mode: EntryMode,
    },
    /// Same path, different object id (the mode may change too).
    Modified {
        path: String,
        old_id: ObjectId,
        new_id: ObjectId,
        old_mode: EntryMode,
        new_mode: EntryMode,
    },
    /// Same content, different mode.
    ModeChanged {
        path: String,
        id: ObjectId,
        old_mode: EntryMode,
        new_mode: EntryMode,
    },
}

impl TreeChange {
    pub fn path(&self) -> &str {
        match self {
            Self::Added { path, .. }
            | Self::Deleted { path, .. }
            | Self::Modified { path, .. }
            | Self::ModeChanged { path, .. } => path,
        }
    }
}

/// Compare two flattened trees.
pub fn diff_flat_trees(old: &FlatTree, new: &FlatTree) -> TreeDiff {
    let mut changes = Vec::new();
    let mut old_iter = old.iter().peekable();
    let mut new_iter = new.iter().peekable();

    // Both maps are sorted by path, so a single merge walk suffices.
    loop {
        let ordering = match (old_iter.peek(), new_iter.peek()) {
            (None, None) => break,
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (Some((op, _)), Some((np, _))) => op.cmp(np),
        };
        match ordering {
            std::cmp::Ordering::Less => {
                if let Some((path, entry)) = old_iter.next() {
                    changes.push(TreeChange::Deleted {
                        path: path.clone(),
                        old_id: entry.id,
                        mode: entry.mode,
                    });
                }
            }
            std::cmp::Ordering::Greater => {
                if let Some((path, entry)) = new_iter.next() {
                    changes.push(TreeChange::Added {
                        path: path.clone(),
                        new_id: entry.id,
                        mode: entry.mode,
                    });
                }
            }
            std::cmp::Ordering::Equal => {
                if let (Some((path, o)), Some((_, n))) = (old_iter.next(), new_iter.next()) {
                    if o.id != n.id {
                        changes.push(TreeChange::Modified {
                            path: path.clone(),
                            old_id: o.id,
                            new_id: n.id,
                            old_mode: o.mode,
                            new_mode: n.mode,
                        });
                    } else if o.mode != n.mode {
                        changes.push(TreeChange::ModeChanged {
                            path: path.clone(),
                            id: o.id,
                            old_mode: o.mode,
                            new_mode: n.mode,
                        });
                    }
                }
            }
        }
    }

    TreeDiff { changes }
}

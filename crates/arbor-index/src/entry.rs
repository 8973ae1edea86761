//! Index entry types.

use serde::{Deserialize, Serialize};
use arbor_store::EntryMode;
use arbor_types::ObjectId;

/// Merge stage of an index entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Stage {
    /// Resolved content.
    Merged = 0,
    /// Common ancestor version of a conflicted path.
    Base = 1,
    /// Our version of a conflicted path.
    Ours = 2,
    /// Their version of a conflicted path.
    Theirs = 3,
}

impl Stage {
    pub fn number(self) -> u8 {
        self as u8
    }

    pub fn is_conflict(self) -> bool {
        self != Self::Merged
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.number())
    }
}

/// An entry in the index: one version of one path.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Slash-separated path from the tree root.
    pub path: String,
    pub stage: Stage,
    /// Blob holding this version's content.
    pub object_id: ObjectId,
    pub mode: EntryMode,
    /// Content size in bytes (0 when unknown).
    pub size: u64,
}

impl IndexEntry {
    pub fn new(path: impl Into<String>, stage: Stage, object_id: ObjectId, mode: EntryMode, size: u64) -> Self {
        Self {
            path: path.into(),
            stage,
            object_id,
            mode,
            size,
        }
    }

    pub fn is_conflict(&self) -> bool {
        self.stage.is_conflict()
    }
}

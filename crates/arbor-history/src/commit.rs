//! Commit records.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arbor_store::ContentHasher;
use arbor_types::ObjectId;
use serde::Serialize;

use crate::error::{HistoryError, HistoryResult};

/// Shared handle to a commit. Parents are held the same way, so a commit
/// keeps its whole history alive.
pub type CommitRef = Arc<Commit>;

/// Sequence for virtual commit ids.
static VIRTUAL_SEQ: AtomicU64 = AtomicU64::new(1);

/// A snapshot tree with its parent links.
#[derive(Debug)]
pub struct Commit {
    pub id: ObjectId,
    /// Root tree of the snapshot.
    pub tree: ObjectId,
    pub parents: Vec<CommitRef>,
    /// Commit time; orders merge bases oldest first.
    pub timestamp: u64,
    pub summary: String,
    /// Transient commit made during a merge, not part of any history.
    pub is_virtual: bool,
}

/// Hashed form of a commit.
#[derive(Serialize)]
struct CommitHeader<'a> {
    tree: &'a ObjectId,
    parents: Vec<ObjectId>,
    timestamp: u64,
    summary: &'a str,
}

impl Commit {
    /// Create a commit whose id is the hash of its tree, parents, time and
    /// summary.
    pub fn new(
        tree: ObjectId,
        parents: Vec<CommitRef>,
        timestamp: u64,
        summary: impl Into<String>,
    ) -> HistoryResult<CommitRef> {
        let summary = summary.into();
        let header = CommitHeader {
            tree: &tree,
            parents: parents.iter().map(|p| p.id).collect(),
            timestamp,
            summary: &summary,
        };
        let bytes = bincode::serialize(&header)
            .map_err(|e| HistoryError::Serialization(e.to_string()))?;
        let id = ContentHasher::COMMIT.hash(&bytes);
        Ok(Arc::new(Self {
            id,
            tree,
            parents,
            timestamp,
            summary,
            is_virtual: false,
        }))
    }

    /// Create a transient commit carrying `tree`.
    ///
    /// Every call yields a distinct id, even for the same tree. The timestamp
    /// is the newest parent timestamp (0 without parents).
    pub fn new_virtual(tree: ObjectId, description: impl Into<String>, parents: Vec<CommitRef>) -> CommitRef {
        let seq = VIRTUAL_SEQ.fetch_add(1, Ordering::Relaxed);
        let mut material = Vec::with_capacity(48);
        material.extend_from_slice(b"virtual:");
        material.extend_from_slice(&seq.to_le_bytes());
        material.extend_from_slice(tree.as_bytes());
        let timestamp = parents.iter().map(|p| p.timestamp).max().unwrap_or(0);
        Arc::new(Self {
            id: ContentHasher::COMMIT.hash(&material),
            tree,
            parents,
            timestamp,
            summary: description.into(),
            is_virtual: true,
        })
    }

    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }

    pub fn parent_ids(&self) -> Vec<ObjectId> {
        self.parents.iter().map(|p| p.id).collect()
    }

    /// One-line description: short id and summary.
    pub fn describe(&self) -> String {
        if self.is_virtual {
            format!("virtual {}", self.summary)
        } else {
            format!("{} {}", self.id.short_hex(), self.summary)
        }
    }
}

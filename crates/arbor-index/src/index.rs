//! The core Index structure.
//!
//! [`Index`] keeps a `BTreeMap<(path, stage), IndexEntry>`. A path is either
//! resolved (a single stage-0 entry) or conflicted (one to three entries at
//! stages 1..=3). Staging a resolved version drops the conflict stages and
//! recording a conflict drops the resolved entry.

use std::collections::BTreeMap;
use std::sync::Arc;

use arbor_store::{EntryMode, FlatEntry, FlatTree, ObjectStore};
use arbor_types::ObjectId;
use tracing::debug;

use crate::entry::{IndexEntry, Stage};
use crate::error::{IndexError, IndexResult};

/// One side of a conflicted path: `(mode, id)`.
pub type ConflictSide = Option<(EntryMode, ObjectId)>;

/// The merge index.
///
/// Purely in-memory. The `store` is used for writing blobs staged from
/// content and for building or reading trees.
pub struct Index {
    /// Format version written to the index file.
    pub version: u32,
    pub(crate) entries: BTreeMap<(String, Stage), IndexEntry>,
    /// Tree id of the current resolved state (invalidated on changes).
    pub tree_cache: Option<ObjectId>,
    store: Arc<dyn ObjectStore>,
}

impl std::fmt::Debug for Index {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Index")
            .field("version", &self.version)
            .field("entries", &self.entries.len())
            .field("tree_cache", &self.tree_cache)
            .finish()
    }
}

impl Index {
    /// Current index format version.
    pub const VERSION: u32 = 2;

    /// Create a new empty index backed by the given store.
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            version: Self::VERSION,
            entries: BTreeMap::new(),
            tree_cache: None,
            store,
        }
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Number of entries (all stages).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolved (stage 0) entry for `path`.
    pub fn get(&self, path: &str) -> Option<&IndexEntry> {
        self.get_stage(path, Stage::Merged)
    }

    pub fn get_stage(&self, path: &str, stage: Stage) -> Option<&IndexEntry> {
        self.entries.get(&(path.to_string(), stage))
    }

    /// All entries of `path`, in stage order.
    pub fn stages(&self, path: &str) -> Vec<&IndexEntry> {
        self.entries
            .range((path.to_string(), Stage::Merged)..=(path.to_string(), Stage::Theirs))
            .map(|(_, e)| e)
            .collect()
    }

    /// Every entry in `(path, stage)` order.
    pub fn entries(&self) -> impl Iterator<Item = &IndexEntry> {
        self.entries.values()
    }

    // ---------------------------------------------------------------
    // Stage operations
    // ---------------------------------------------------------------

    /// Write `content` as a blob and stage it as the resolved version.
    pub fn stage_file(&mut self, path: &str, content: &[u8], mode: EntryMode) -> IndexResult<ObjectId> {
        let object_id = self.store.write_blob(content)?;
        self.stage_object(path, object_id, mode, content.len() as u64)?;
        Ok(object_id)
    }

    /// Stage an already-stored object as the resolved version of `path`.
    pub fn stage_object(&mut self, path: &str, object_id: ObjectId, mode: EntryMode, size: u64) -> IndexResult<()> {
        validate_path(path)?;
        self.drop_path(path);
        self.entries.insert(
            (path.to_string(), Stage::Merged),
            IndexEntry::new(path, Stage::Merged, object_id, mode, size),
        );
        self.tree_cache = None;
        Ok(())
    }

    /// Record `path` as conflicted with the versions present on each side.
    pub fn add_conflict(
        &mut self,
        path: &str,
        base: ConflictSide,
        ours: ConflictSide,
        theirs: ConflictSide,
    ) -> IndexResult<()> {
        validate_path(path)?;
        if base.is_none() && ours.is_none() && theirs.is_none() {
            return Err(IndexError::InvalidPath(format!(
                "conflict at {path} has no versions"
            )));
        }
        self.drop_path(path);
        for (stage, side) in [(Stage::Base, base), (Stage::Ours, ours), (Stage::Theirs, theirs)] {
            if let Some((mode, id)) = side {
                self.entries.insert(
                    (path.to_string(), stage),
                    IndexEntry::new(path, stage, id, mode, 0),
                );
            }
        }
        debug!(path, "recorded conflict");
        self.tree_cache = None;
        Ok(())
    }

    /// Remove every stage of `path`.
    pub fn remove(&mut self, path: &str) -> IndexResult<Vec<IndexEntry>> {
        let removed = self.drop_path(path);
        if removed.is_empty() {
            return Err(IndexError::PathNotFound(path.to_string()));
        }
        self.tree_cache = None;
        Ok(removed)
    }

    fn drop_path(&mut self, path: &str) -> Vec<IndexEntry> {
        [Stage::Merged, Stage::Base, Stage::Ours, Stage::Theirs]
            .into_iter()
            .filter_map(|stage| self.entries.remove(&(path.to_string(), stage)))
            .collect()
    }

    /// Drop all entries.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.tree_cache = None;
    }

    // ---------------------------------------------------------------
    // Conflict management
    // ---------------------------------------------------------------

    /// Replace the conflict stages of `path` with a resolved version.
    pub fn resolve_conflict(&mut self, path: &str, object_id: ObjectId, mode: EntryMode, size: u64) -> IndexResult<()> {
        if !self.stages(path).iter().any(|e| e.is_conflict()) {
            return Err(IndexError::PathNotFound(format!("no conflict at path: {path}")));
        }
        self.stage_object(path, object_id, mode, size)
    }

    pub fn has_conflicts(&self) -> bool {
        self.entries.values().any(IndexEntry::is_conflict)
    }

    /// Paths with unresolved conflicts, sorted and without duplicates.
    pub fn conflict_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self
            .entries
            .values()
            .filter(|e| e.is_conflict())
            .map(|e| e.path.clone())
            .collect();
        paths.dedup();
        paths
    }

    // ---------------------------------------------------------------
    // Tree building
    // ---------------------------------------------------------------

    /// Build and store the tree of all resolved entries.
    pub fn write_tree(&mut self) -> IndexResult<ObjectId> {
        if self.has_conflicts() {
            return Err(IndexError::UnresolvedConflict(self.conflict_paths().join(", ")));
        }
        let tree_id = self.to_flat_tree().write(self.store.as_ref())?;
        self.tree_cache = Some(tree_id);
        Ok(tree_id)
    }

    /// Resolved entries as a flat tree (conflict stages are skipped).
    pub fn to_flat_tree(&self) -> FlatTree {
        self.entries
            .values()
            .filter(|e| !e.is_conflict())
            .map(|e| (e.path.clone(), FlatEntry::new(e.mode, e.object_id)))
            .collect()
    }

    /// Replace the index contents with the files of `tree_id`.
    pub fn read_tree(&mut self, tree_id: &ObjectId) -> IndexResult<()> {
        let flat = FlatTree::load(self.store.as_ref(), tree_id)?;
        self.entries.clear();
        for (path, entry) in flat.iter() {
            self.entries.insert(
                (path.clone(), Stage::Merged),
                IndexEntry::new(path.clone(), Stage::Merged, entry.id, entry.mode, 0),
            );
        }
        self.tree_cache = Some(*tree_id);
        Ok(())
    }
}

fn validate_path(path: &str) -> IndexResult<()> {
    if path.is_empty() {
        return Err(IndexError::InvalidPath("empty path".to_string()));
    }
    if path.starts_with('/') || path.ends_with('/') || path.split('/').any(|c| c.is_empty() || c == "." || c == "..") {
        return Err(IndexError::InvalidPath(path.to_string()));
    }
    Ok(())
}

//! The collaborators a merge runs against.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use arbor_history::{HistoryWalker, LinkWalker};
use arbor_index::{Index, Worktree};
use arbor_store::{FlatTree, ObjectStore};
use tracing::debug;

use crate::error::{MergeError, MergeFallible};
use crate::tree_merge::TreeMerge;

/// Object store, index, optional worktree and history walker.
///
/// Only the top-level merge touches `index` and the worktree; merges that
/// build virtual bases work on their own scratch products.
pub struct Repo {
    store: Arc<dyn ObjectStore>,
    pub index: Index,
    worktree: Option<Box<dyn Worktree>>,
    history: Arc<dyn HistoryWalker>,
    index_file: Option<PathBuf>,
}

impl std::fmt::Debug for Repo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repo")
            .field("index", &self.index)
            .field("worktree", &self.worktree.is_some())
            .field("index_file", &self.index_file)
            .finish()
    }
}

impl Repo {
    /// A repo with an empty index, no worktree, and parent-link history.
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            index: Index::new(Arc::clone(&store)),
            store,
            worktree: None,
            history: Arc::new(LinkWalker),
            index_file: None,
        }
    }

    pub fn with_worktree(mut self, worktree: Box<dyn Worktree>) -> Self {
        self.worktree = Some(worktree);
        self
    }

    pub fn with_history(mut self, history: Arc<dyn HistoryWalker>) -> Self {
        self.history = history;
        self
    }

    /// Where the tree-based entry point persists the index.
    pub fn with_index_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.index_file = Some(path.into());
        self
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    pub fn history(&self) -> &Arc<dyn HistoryWalker> {
        &self.history
    }

    pub fn worktree(&self) -> Option<&dyn Worktree> {
        self.worktree.as_deref()
    }

    pub fn index_file(&self) -> Option<&Path> {
        self.index_file.as_deref()
    }

    /// Record a finished top-level merge: rebuild the index from the
    /// outcome and bring the worktree from `ours` to the merged content.
    ///
    /// The new index is built completely before anything is written. A
    /// worktree failure leaves the previous index in place and reports how
    /// many paths were already written.
    pub(crate) fn record_merge(&mut self, merge: &TreeMerge, ours: &FlatTree) -> MergeFallible<()> {
        let mut index = Index::new(Arc::clone(&self.store));
        for (path, entry) in merge.merged.iter() {
            if !merge.stages.contains_key(path) {
                index.stage_object(path, entry.id, entry.mode, 0)?;
            }
        }
        for (path, stages) in &merge.stages {
            index.add_conflict(
                path,
                stages.base.map(|e| (e.mode, e.id)),
                stages.ours.map(|e| (e.mode, e.id)),
                stages.theirs.map(|e| (e.mode, e.id)),
            )?;
        }

        if let Some(worktree) = self.worktree.as_mut() {
            let updates = worktree_updates(ours, &merge.merged);
            let total = updates.len();
            for (written, (path, target)) in updates.into_iter().enumerate() {
                let step: arbor_index::IndexResult<()> = match target {
                    Some(entry) => self
                        .store
                        .read_blob(&entry.id)
                        .map_err(Into::into)
                        .and_then(|content| worktree.write_file(path, &content, entry.mode)),
                    None => worktree.remove_file(path),
                };
                if let Err(source) = step {
                    return Err(MergeError::Worktree {
                        written,
                        total,
                        source,
                    });
                }
            }
            debug!(paths = total, "worktree updated");
        }

        self.index = index;
        Ok(())
    }
}

/// Paths whose worktree content differs between `ours` and `merged`:
/// `Some` to write, `None` to remove. Removals come first so a file can be
/// replaced by a directory of the same name.
fn worktree_updates<'a>(
    ours: &'a FlatTree,
    merged: &'a FlatTree,
) -> Vec<(&'a str, Option<arbor_store::FlatEntry>)> {
    let removals = ours
        .iter()
        .filter(|(path, _)| !merged.contains(path))
        .map(|(path, _)| (path.as_str(), None));
    let writes = merged
        .iter()
        .filter(|(path, entry)| ours.get(path) != Some(*entry))
        .map(|(path, entry)| (path.as_str(), Some(*entry)));
    removals.chain(writes).collect()
}

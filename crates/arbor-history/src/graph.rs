//! Id-indexed commit graph.
//!
//! # Invariants
//!
//! - Every parent of a stored commit is itself stored.
//! - Commit ids are unique within the graph.
//! - The graph is acyclic (a commit's id covers its parents' ids).

use std::collections::HashMap;

use arbor_types::ObjectId;
use tracing::debug;

use crate::commit::CommitRef;
use crate::error::{HistoryError, HistoryResult};
use crate::walker::{common_ancestors, HistoryWalker};

/// A validated set of commits.
///
/// As a [`HistoryWalker`] it only answers for commits it holds, so a merge
/// between histories the caller never registered fails instead of guessing.
#[derive(Debug, Default)]
pub struct CommitGraph {
    commits: HashMap<ObjectId, CommitRef>,
}

impl CommitGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.commits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commits.is_empty()
    }

    /// Add a commit whose parents are already in the graph.
    pub fn add_commit(&mut self, commit: CommitRef) -> HistoryResult<()> {
        if self.commits.contains_key(&commit.id) {
            return Err(HistoryError::DuplicateNode(commit.id));
        }
        if let Some(parent) = commit.parents.iter().find(|p| !self.commits.contains_key(&p.id)) {
            return Err(HistoryError::DanglingParent {
                node: commit.id,
                parent: parent.id,
            });
        }
        debug!(commit = %commit.id.short_hex(), parents = commit.parents.len(), "added commit");
        self.commits.insert(commit.id, commit);
        Ok(())
    }

    pub fn get(&self, id: &ObjectId) -> Option<&CommitRef> {
        self.commits.get(id)
    }

    fn require(&self, id: &ObjectId) -> HistoryResult<&CommitRef> {
        self.commits.get(id).ok_or(HistoryError::NodeNotFound(*id))
    }
}

impl HistoryWalker for CommitGraph {
    fn common_ancestors(&self, a: &CommitRef, b: &CommitRef) -> HistoryResult<Vec<CommitRef>> {
        // Virtual commits are not registered; their parents are.
        for commit in [a, b] {
            if !commit.is_virtual {
                self.require(&commit.id)?;
            }
        }
        Ok(common_ancestors(a, b))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::commit::Commit;

    fn tree(b: u8) -> ObjectId {
        ObjectId::from_hash([b; 32])
    }

    /// Diamond: a <- b, a <- c, (b, c) <- d.
    fn diamond() -> (CommitGraph, Vec<CommitRef>) {
        let mut graph = CommitGraph::new();
        let a = Commit::new(tree(1), vec![], 1, "a").unwrap();
        let b = Commit::new(tree(2), vec![Arc::clone(&a)], 2, "b").unwrap();
        let c = Commit::new(tree(3), vec![Arc::clone(&a)], 3, "c").unwrap();
        let d = Commit::new(tree(4), vec![Arc::clone(&b), Arc::clone(&c)], 4, "d").unwrap();
        for commit in [&a, &b, &c, &d] {
            graph.add_commit(Arc::clone(commit)).unwrap();
        }
        (graph, vec![a, b, c, d])
    }

    #[test]
    fn duplicate_commit_is_rejected() {
        let (mut graph, commits) = diamond();
        let err = graph.add_commit(Arc::clone(&commits[0])).unwrap_err();
        assert!(matches!(err, HistoryError::DuplicateNode(_)));
        assert_eq!(graph.len(), 4);
    }

    #[test]
    fn dangling_parent_is_rejected() {
        let mut graph = CommitGraph::new();
        let orphan_parent = Commit::new(tree(1), vec![], 1, "p").unwrap();
        let child = Commit::new(tree(2), vec![orphan_parent], 2, "c").unwrap();
        assert!(matches!(
            graph.add_commit(child),
            Err(HistoryError::DanglingParent { .. })
        ));
        assert!(graph.is_empty());
    }

    #[test]
    fn lookup_by_id() {
        let (graph, commits) = diamond();
        assert_eq!(graph.get(&commits[3].id).map(|c| c.timestamp), Some(4));
        assert!(graph.get(&tree(99)).is_none());
    }

    #[test]
    fn unregistered_commit_errors() {
        let (graph, commits) = diamond();
        let stranger = Commit::new(tree(7), vec![], 7, "x").unwrap();
        assert!(matches!(
            graph.common_ancestors(&stranger, &commits[1]),
            Err(HistoryError::NodeNotFound(_))
        ));
    }

    #[test]
    fn virtual_commits_over_registered_parents_are_walkable() {
        let (graph, commits) = diamond();
        let v = Commit::new_virtual(tree(8), "merged", vec![Arc::clone(&commits[1])]);
        let bases = graph.common_ancestors(&v, &commits[2]).unwrap();
        assert_eq!(bases.iter().map(|c| c.id).collect::<Vec<_>>(), vec![commits[0].id]);
    }

    #[test]
    fn graph_common_ancestors() {
        let (graph, commits) = diamond();
        let bases = graph.common_ancestors(&commits[1], &commits[2]).unwrap();
        assert_eq!(bases.len(), 1);
        assert_eq!(bases[0].id, commits[0].id);
    }
}

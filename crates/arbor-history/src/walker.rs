//! Merge-base discovery.
//!
//! The merge bases of two commits are their best common ancestors: common
//! ancestors that are not themselves ancestors of another common ancestor.
//! A criss-cross history has more than one. They are returned oldest first,
//! ordered by `(timestamp, id)`, which is the order a recursive merge folds
//! them in.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use arbor_types::ObjectId;

use crate::commit::CommitRef;
use crate::error::HistoryResult;

/// Source of merge bases for the recursive merge.
pub trait HistoryWalker: Send + Sync {
    /// Best common ancestors of `a` and `b`, oldest first.
    fn common_ancestors(&self, a: &CommitRef, b: &CommitRef) -> HistoryResult<Vec<CommitRef>>;
}

/// Walker that follows the parent links carried by the commits themselves.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinkWalker;

impl HistoryWalker for LinkWalker {
    fn common_ancestors(&self, a: &CommitRef, b: &CommitRef) -> HistoryResult<Vec<CommitRef>> {
        Ok(common_ancestors(a, b))
    }
}

/// Every commit reachable from any of `starts`, the starts included (BFS upward).
fn reachable<'a>(starts: impl IntoIterator<Item = &'a CommitRef>) -> HashMap<ObjectId, CommitRef> {
    let mut visited = HashMap::new();
    let mut queue = VecDeque::new();
    for start in starts {
        if visited.insert(start.id, Arc::clone(start)).is_none() {
            queue.push_back(Arc::clone(start));
        }
    }

    while let Some(current) = queue.pop_front() {
        for parent in &current.parents {
            if !visited.contains_key(&parent.id) {
                visited.insert(parent.id, Arc::clone(parent));
                queue.push_back(Arc::clone(parent));
            }
        }
    }

    visited
}

/// Best common ancestors of `a` and `b`, oldest first.
pub fn common_ancestors(a: &CommitRef, b: &CommitRef) -> Vec<CommitRef> {
    if a.id == b.id {
        return vec![Arc::clone(a)];
    }
    let from_a = reachable([a]);
    let from_b = reachable([b]);

    let common: HashMap<ObjectId, CommitRef> = from_a
        .into_iter()
        .filter(|(id, _)| from_b.contains_key(id))
        .collect();

    // Every parent of a common ancestor is common too; whatever they reach
    // is not a best ancestor.
    let redundant = reachable(common.values().flat_map(|c| c.parents.iter()));

    let mut bases: Vec<CommitRef> = common
        .into_values()
        .filter(|c| !redundant.contains_key(&c.id))
        .collect();
    bases.sort_by_key(|c| (c.timestamp, c.id));
    bases
}

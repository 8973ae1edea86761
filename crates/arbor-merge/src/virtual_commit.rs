//! Tree-based entry point for callers that have no commits.
//!
//! The head, merge and base trees are wrapped in transient commits so the
//! commit-level recursive merge can run on them unchanged.

use arbor_history::{Commit, CommitRef};
use arbor_types::ObjectId;
use tracing::debug;

use crate::options::MergeOptions;
use crate::recursive::merge_recursive;
use crate::repo::Repo;
use crate::result::MergeResult;

/// Merge the trees `head` and `merge` given their merge-base trees, oldest
/// first.
///
/// On a clean or conflicted outcome the index is persisted to the repo's
/// index file, when one is configured. Failing to persist it is fatal.
pub fn merge_recursive_generic(
    opts: &mut MergeOptions,
    repo: &mut Repo,
    head: &ObjectId,
    merge: &ObjectId,
    bases: &[ObjectId],
) -> MergeResult {
    let h1 = wrap(*head, &opts.branch1);
    let h2 = wrap(*merge, &opts.branch2);
    let bases: Vec<CommitRef> = bases
        .iter()
        .map(|tree| Commit::new_virtual(*tree, "ancestor", Vec::new()))
        .collect();
    debug!(head = %head.short_hex(), merge = %merge.short_hex(), bases = bases.len(), "merging trees as commits");

    let result = merge_recursive(opts, repo, &h1, &h2, bases);
    if result.status.is_fatal() {
        return result;
    }

    let Some(path) = repo.index_file().map(|p| p.to_path_buf()) else {
        return result;
    };
    match repo.index.save(&path) {
        Ok(()) => {
            debug!(path = %path.display(), entries = repo.index.len(), "index saved");
            result
        }
        Err(e) => MergeResult::fatal(e.into()),
    }
}

fn wrap(tree: ObjectId, label: &str) -> CommitRef {
    Commit::new_virtual(tree, label.to_string(), Vec::new())
}

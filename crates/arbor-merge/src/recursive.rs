//! Recursive merge and merge-base consolidation.
//!
//! Two commits with several merge bases are merged against a virtual base
//! built by folding the bases oldest to newest: the running virtual base
//! and the next ancestor are merged (against their own merge bases) and the
//! result, conflict markers and all, becomes the new virtual base. Virtual
//! merges use their own labels, a deeper marker size and never touch the
//! index or worktree.
//!
//! Every public entry point owns the options' internal slot for its whole
//! run and releases it exactly once, whatever the outcome.

use std::mem;
use std::sync::Arc;

use arbor_diff::MergeVariant;
use arbor_history::{Commit, CommitRef};
use arbor_store::FlatTree;
use arbor_types::ObjectId;
use tracing::{debug, info};

use crate::error::MergeFallible;
use crate::internal::{begin, finish};
use crate::options::MergeOptions;
use crate::repo::Repo;
use crate::result::{MergeResult, MergeStatus};
use crate::tree_merge::{merge_tree_ids, TreeMerge};

/// Label of a virtual merge base made from several ancestors.
pub const MERGED_ANCESTORS_LABEL: &str = "merged common ancestors";

/// Our label inside a virtual-base merge.
pub const TEMPORARY_BRANCH_1: &str = "Temporary merge branch 1";

/// Their label inside a virtual-base merge.
pub const TEMPORARY_BRANCH_2: &str = "Temporary merge branch 2";

/// Merge the trees `head` and `merge` against `base`, then record the
/// outcome in the repo's index and worktree.
pub fn merge_trees(
    opts: &mut MergeOptions,
    repo: &mut Repo,
    head: &ObjectId,
    merge: &ObjectId,
    base: &ObjectId,
) -> MergeResult {
    if let Err(e) = begin(opts) {
        return MergeResult::fatal(e);
    }
    let outcome = merge_and_record(opts, repo, head, merge, base);
    finish(opts);
    into_result(outcome.map(|m| (m, None)))
}

fn merge_and_record(
    opts: &mut MergeOptions,
    repo: &mut Repo,
    head: &ObjectId,
    merge: &ObjectId,
    base: &ObjectId,
) -> MergeFallible<TreeMerge> {
    let store = Arc::clone(repo.store());
    let merged = merge_tree_ids(opts, store.as_ref(), base, head, merge)?;
    let ours = FlatTree::load(store.as_ref(), head)?;
    repo.record_merge(&merged, &ours)?;
    Ok(merged)
}

/// Merge the commits `h1` and `h2`.
///
/// `bases` is consumed: its commits are folded left to right, so it must be
/// ordered oldest first. When it is empty the repo's history walker finds
/// the merge bases; when there are none an empty tree is used. The outcome
/// is recorded in the repo's index and worktree, and the result carries a
/// virtual commit for the merged tree.
pub fn merge_recursive(
    opts: &mut MergeOptions,
    repo: &mut Repo,
    h1: &CommitRef,
    h2: &CommitRef,
    bases: Vec<CommitRef>,
) -> MergeResult {
    if let Err(e) = begin(opts) {
        return MergeResult::fatal(e);
    }
    let outcome = merge_commits(opts, repo, h1, h2, bases).and_then(|(merged, commit)| {
        let ours = FlatTree::load(repo.store().as_ref(), &h1.tree)?;
        repo.record_merge(&merged, &ours)?;
        Ok((merged, Some(commit)))
    });
    finish(opts);
    into_result(outcome)
}

/// Fold `bases` (oldest first) into one virtual merge base.
pub fn consolidate_bases(
    opts: &mut MergeOptions,
    repo: &Repo,
    bases: Vec<CommitRef>,
) -> MergeFallible<CommitRef> {
    begin(opts)?;
    let consolidated = consolidate(opts, repo, bases);
    finish(opts);
    consolidated
}

fn into_result(outcome: MergeFallible<(TreeMerge, Option<CommitRef>)>) -> MergeResult {
    match outcome {
        Ok((merged, commit)) => MergeResult {
            status: if merged.is_clean() {
                MergeStatus::Clean
            } else {
                MergeStatus::Conflicted
            },
            tree: Some(merged.tree),
            commit,
            conflicts: merged.conflicts,
            renames: merged.renames,
        },
        Err(e) => {
            tracing::error!(error = %e, "merge failed");
            MergeResult::fatal(e)
        }
    }
}

/// Merge two commits without recording anything.
fn merge_commits(
    opts: &mut MergeOptions,
    repo: &Repo,
    h1: &CommitRef,
    h2: &CommitRef,
    mut bases: Vec<CommitRef>,
) -> MergeFallible<(TreeMerge, CommitRef)> {
    opts.output(4, "Merging:");
    opts.output(4, h1.describe());
    opts.output(4, h2.describe());

    if bases.is_empty() {
        bases = repo.history().common_ancestors(h1, h2)?;
    }
    opts.output(5, format!("found {} common ancestor(s):", bases.len()));
    for base in &bases {
        opts.output(5, base.describe());
    }
    let several = bases.len() > 1;

    let merged_base = consolidate(opts, repo, bases)?;

    let saved_ancestor = several.then(|| opts.ancestor.replace(MERGED_ANCESTORS_LABEL.to_string()));
    let merged = merge_tree_ids(opts, repo.store().as_ref(), &merged_base.tree, &h1.tree, &h2.tree);
    if let Some(previous) = saved_ancestor {
        opts.ancestor = previous;
    }
    let merged = merged?;

    debug!(
        depth = opts.call_depth(),
        tree = %merged.tree.short_hex(),
        clean = merged.is_clean(),
        "commits merged"
    );
    let commit = Commit::new_virtual(merged.tree, "merged tree", vec![Arc::clone(h1), Arc::clone(h2)]);
    Ok((merged, commit))
}

/// Reduce `bases` to one commit, draining it left to right.
fn consolidate(opts: &mut MergeOptions, repo: &Repo, bases: Vec<CommitRef>) -> MergeFallible<CommitRef> {
    let count = bases.len();
    let mut pending = bases.into_iter();
    let mut merged_base = match pending.next() {
        Some(first) => first,
        None => {
            let empty = repo.store().empty_tree()?;
            return Ok(Commit::new_virtual(empty, "ancestor", Vec::new()));
        }
    };

    for next in pending {
        let saved = enter_virtual(opts);
        let inner = merge_commits(opts, repo, &merged_base, &next, Vec::new());
        leave_virtual(opts, saved);
        let (inner, _) = inner?;
        if !inner.is_clean() {
            info!(conflicts = inner.conflicts.len(), "virtual merge base keeps conflicts");
        }
        merged_base = Commit::new_virtual(inner.tree, MERGED_ANCESTORS_LABEL, vec![merged_base, next]);
    }
    debug!(bases = count, tree = %merged_base.tree.short_hex(), "merge bases consolidated");
    Ok(merged_base)
}

/// Settings a virtual-base merge overrides.
struct Saved {
    branch1: String,
    branch2: String,
    variant: MergeVariant,
}

fn enter_virtual(opts: &mut MergeOptions) -> Saved {
    opts.enter_nested();
    Saved {
        branch1: mem::replace(&mut opts.branch1, TEMPORARY_BRANCH_1.to_string()),
        branch2: mem::replace(&mut opts.branch2, TEMPORARY_BRANCH_2.to_string()),
        variant: mem::replace(&mut opts.variant, MergeVariant::Normal),
    }
}

fn leave_virtual(opts: &mut MergeOptions, saved: Saved) {
    opts.branch1 = saved.branch1;
    opts.branch2 = saved.branch2;
    opts.variant = saved.variant;
    opts.leave_nested();
}

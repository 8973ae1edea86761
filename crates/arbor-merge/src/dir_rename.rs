//! Directory renames inferred from file renames.
//!
//! Every rename on a side votes for `old_dir -> new_dir`, the parent
//! directories with their common trailing components removed. A directory
//! counts as renamed only when the side no longer has it; one that both
//! sides renamed is left alone. The destination with the most votes wins,
//! and a tie makes the rename ambiguous.
//!
//! Paths the other side added under a renamed directory are then handled
//! according to [`DirectoryRenames`]: moved, moved with a conflict, or left
//! in place with a conflict.

use std::collections::BTreeMap;

use arbor_store::{file_name, join, parent_dir, FlatTree};
use tracing::debug;

use crate::options::{DirectoryRenames, MergeOptions};
use crate::result::{ConflictKind, RenameMapping, Side};

/// A conflict the tree merger must record at a path whatever its content
/// resolution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct ForcedConflict {
    pub(crate) kind: ConflictKind,
    pub(crate) message: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Target {
    Unique(String),
    Split,
}

/// Directory part of a rename: `(old_dir, new_dir)`, or `None` when the
/// file stayed in its directory or moved out of the root.
fn renamed_dir_portion<'a>(source: &'a str, destination: &'a str) -> Option<(&'a str, &'a str)> {
    let mut old = parent_dir(source);
    let mut new = parent_dir(destination);
    while !old.is_empty() && !new.is_empty() && file_name(old) == file_name(new) {
        old = parent_dir(old);
        new = parent_dir(new);
    }
    (!old.is_empty() && old != new).then_some((old, new))
}

/// Directories a side renamed, keyed by old name.
fn renamed_dirs(renames: &[RenameMapping], side_tree: &FlatTree) -> BTreeMap<String, Target> {
    let mut votes: BTreeMap<&str, BTreeMap<&str, usize>> = BTreeMap::new();
    for rename in renames {
        if let Some((old, new)) = renamed_dir_portion(&rename.source, &rename.destination) {
            if !side_tree.has_directory(old) {
                *votes.entry(old).or_default().entry(new).or_default() += 1;
            }
        }
    }

    votes
        .into_iter()
        .map(|(old, counts)| {
            let best = counts.values().copied().max().unwrap_or(0);
            let mut winners = counts.iter().filter(|(_, n)| **n == best).map(|(new, _)| *new);
            let target = match (winners.next(), winners.next()) {
                (Some(new), None) => Target::Unique(new.to_string()),
                _ => Target::Split,
            };
            (old.to_string(), target)
        })
        .collect()
}

/// Longest renamed directory containing `path`.
fn containing_dir<'a>(dirs: &'a BTreeMap<String, Target>, path: &str) -> Option<(&'a str, &'a Target)> {
    let mut dir = parent_dir(path);
    while !dir.is_empty() {
        if let Some((old, target)) = dirs.get_key_value(dir) {
            return Some((old.as_str(), target));
        }
        dir = parent_dir(dir);
    }
    None
}

fn branch(opts: &MergeOptions, side: Side) -> &str {
    match side {
        Side::Theirs => &opts.branch2,
        _ => &opts.branch1,
    }
}

/// Apply the directory renames of each side to the paths the other side
/// added, moving entries in `ours`/`theirs` and updating rename
/// destinations. Returns the conflicts to record, keyed by final path.
pub(crate) fn apply_directory_renames(
    opts: &mut MergeOptions,
    base: &FlatTree,
    ours: &mut FlatTree,
    theirs: &mut FlatTree,
    ours_renames: &mut [RenameMapping],
    theirs_renames: &mut [RenameMapping],
) -> BTreeMap<String, ForcedConflict> {
    let mut ours_dirs = renamed_dirs(ours_renames, ours);
    let mut theirs_dirs = renamed_dirs(theirs_renames, theirs);
    let both: Vec<String> = ours_dirs
        .keys()
        .filter(|dir| theirs_dirs.contains_key(*dir))
        .cloned()
        .collect();
    for dir in &both {
        ours_dirs.remove(dir);
        theirs_dirs.remove(dir);
    }

    let mut forced = BTreeMap::new();
    if !ours_dirs.is_empty() {
        relocate(opts, Side::Ours, &ours_dirs, base, ours, theirs, theirs_renames, &mut forced);
    }
    if !theirs_dirs.is_empty() {
        relocate(opts, Side::Theirs, &theirs_dirs, base, theirs, ours, ours_renames, &mut forced);
    }
    forced
}

/// Move the paths `added_tree` added under directories `renamer` renamed.
#[allow(clippy::too_many_arguments)]
fn relocate(
    opts: &mut MergeOptions,
    renamer: Side,
    dirs: &BTreeMap<String, Target>,
    base: &FlatTree,
    renamer_tree: &FlatTree,
    added_tree: &mut FlatTree,
    added_renames: &mut [RenameMapping],
    forced: &mut BTreeMap<String, ForcedConflict>,
) {
    let adder = renamer.other();
    let added: Vec<String> = added_tree
        .paths()
        .filter(|path| !base.contains(path))
        .cloned()
        .collect();

    for path in added {
        let Some((old_dir, target)) = containing_dir(dirs, &path) else {
            continue;
        };
        let renamer_label = branch(opts, renamer).to_string();
        let adder_label = branch(opts, adder).to_string();

        let new_dir = match target {
            Target::Split => {
                let message = format!(
                    "CONFLICT (directory rename split): Unclear where to place {path} because directory {old_dir} \
                     was renamed to multiple other directories, with no destination getting a majority of the files."
                );
                opts.conflict_msg(&path, &message);
                forced.entry(path).or_insert(ForcedConflict {
                    kind: ConflictKind::DirectoryRenameSplit,
                    message,
                });
                continue;
            }
            Target::Unique(new_dir) => new_dir,
        };
        let new_path = join(new_dir, &path[old_dir.len() + 1..]);

        if opts.detect_directory_renames == DirectoryRenames::None {
            let message = format!(
                "CONFLICT (directory rename): {path} added in {adder_label} inside directory {old_dir}, \
                 which was renamed to {new_dir} in {renamer_label}; left in place."
            );
            opts.conflict_msg(&path, &message);
            forced.entry(path).or_insert(ForcedConflict {
                kind: ConflictKind::DirectoryRename,
                message,
            });
            continue;
        }

        if added_tree.contains(&new_path)
            || renamer_tree.contains(&new_path)
            || added_tree.has_directory(&new_path)
            || renamer_tree.has_directory(&new_path)
        {
            let message = format!(
                "CONFLICT (implicit dir rename): Existing file/dir at {new_path} in the way of implicit \
                 directory rename(s) putting the following path(s) there: {path}."
            );
            opts.conflict_msg(&path, &message);
            forced.entry(path).or_insert(ForcedConflict {
                kind: ConflictKind::FileLocation,
                message,
            });
            continue;
        }

        let Some(entry) = added_tree.remove(&path) else {
            continue;
        };
        added_tree.insert(new_path.clone(), entry);
        for rename in added_renames.iter_mut().filter(|r| r.destination == path) {
            rename.destination = new_path.clone();
        }
        debug!(from = %path, to = %new_path, "directory rename applied");

        if opts.detect_directory_renames == DirectoryRenames::Apply {
            opts.output(
                2,
                format!(
                    "Path updated: {path} added in {adder_label} inside a directory that was renamed in \
                     {renamer_label}; moving it to {new_path}."
                ),
            );
        } else {
            let message = format!(
                "CONFLICT (file location): {path} added in {adder_label} inside a directory that was renamed \
                 in {renamer_label}, suggesting it should perhaps be moved to {new_path}."
            );
            opts.conflict_msg(&new_path, &message);
            forced.entry(new_path).or_insert(ForcedConflict {
                kind: ConflictKind::FileLocation,
                message,
            });
        }
    }
}

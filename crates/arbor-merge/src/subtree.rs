//! Subtree shift: line up trees that live at different levels.
//!
//! When their tree is a project that ours carries in a subdirectory, their
//! tree and the base are spliced into ours at that prefix before merging.
//! When it is the other way round, their tree and the base are cut down to
//! the subdirectory instead.

use std::collections::BTreeSet;

use arbor_store::FlatTree;
use tracing::debug;

use crate::options::MergeOptions;

/// How well a directory of ours matches their root: identical entries
/// first, then shared top-level names.
type Score = (usize, usize);

/// Shift `base` and `theirs` to line up with `ours`. An empty `prefix` asks
/// for the prefix to be detected.
pub(crate) fn shift_trees(
    opts: &mut MergeOptions,
    prefix: &str,
    ours: &FlatTree,
    base: &mut FlatTree,
    theirs: &mut FlatTree,
) {
    let prefix = prefix.trim_matches('/');
    let prefix = if prefix.is_empty() {
        match detect_prefix(ours, theirs) {
            Some(found) => found,
            None => {
                debug!("no subtree prefix detected");
                return;
            }
        }
    } else {
        prefix.to_string()
    };

    let ours_has = ours.has_directory(&prefix);
    let theirs_has = theirs.has_directory(&prefix);
    if ours_has && !theirs_has {
        opts.output(3, format!("Shifting their tree into {prefix}"));
        *theirs = splice(ours, theirs, &prefix);
        *base = splice(ours, base, &prefix);
    } else if theirs_has && !ours_has {
        opts.output(3, format!("Shifting their tree out of {prefix}"));
        *theirs = theirs.subtree(&prefix);
        *base = base.subtree(&prefix);
    } else {
        debug!(%prefix, "subtree shift not applicable");
    }
}

/// `ours` with everything under `prefix` replaced by `inner`.
fn splice(ours: &FlatTree, inner: &FlatTree, prefix: &str) -> FlatTree {
    let lead = format!("{prefix}/");
    ours.iter()
        .filter(|(path, _)| !path.starts_with(&lead))
        .map(|(path, entry)| (path.clone(), *entry))
        .chain(
            inner
                .with_prefix(prefix)
                .iter()
                .map(|(path, entry)| (path.clone(), *entry)),
        )
        .collect()
}

fn score(ours: &FlatTree, dir: &str, theirs: &FlatTree, top_level: &BTreeSet<&str>) -> Score {
    let located = |path: &str| {
        if dir.is_empty() {
            path.to_string()
        } else {
            format!("{dir}/{path}")
        }
    };
    let identical = theirs
        .iter()
        .filter(|(path, entry)| ours.get(&located(path)) == Some(*entry))
        .count();
    let names = top_level
        .iter()
        .filter(|name| {
            let path = located(name);
            ours.contains(&path) || ours.has_directory(&path)
        })
        .count();
    (identical, names)
}

/// The directory of ours that matches their root better than ours' own
/// root does.
fn detect_prefix(ours: &FlatTree, theirs: &FlatTree) -> Option<String> {
    if theirs.is_empty() {
        return None;
    }
    let top_level: BTreeSet<&str> = theirs
        .paths()
        .map(|p| p.split('/').next().unwrap_or(p.as_str()))
        .collect();

    let mut best = score(ours, "", theirs, &top_level);
    let mut found = None;
    for dir in ours.directories() {
        let s = score(ours, &dir, theirs, &top_level);
        if s > best {
            best = s;
            found = Some(dir);
        }
    }
    debug!(prefix = ?found, identical = best.0, names = best.1, "subtree prefix detection");
    found
}

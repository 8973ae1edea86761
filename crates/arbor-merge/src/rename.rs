//! Rename detection for one side of a merge.
//!
//! Paths the side deleted are paired with paths it added. Every
//! `(deleted, added)` pair of the same entry kind is scored with
//! [`similarity`]; identical ids score 100 without reading content. Pairs
//! at or above the threshold are assigned greedily, best score first, with
//! ties broken by source then destination path, so each source and each
//! destination is used at most once.
//!
//! The number of scored pairs is bounded by the rename limit. A side over
//! the limit is skipped with a note; the merge carries on without renames
//! for that side.

use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap};

use arbor_diff::{diff_flat_trees, similarity};
use arbor_store::{EntryMode, FlatTree, ObjectStore};
use arbor_types::ObjectId;
use tracing::debug;

use crate::error::MergeFallible;
use crate::options::MergeOptions;
use crate::result::{RenameMapping, Side};

/// Progress is reported after this many scored pairs.
const PROGRESS_INTERVAL: usize = 1000;

struct Candidate<'a> {
    score: u8,
    source: &'a str,
    destination: &'a str,
}

/// Renames made by `side` (whose tree is `tree`) relative to `base`.
pub(crate) fn detect_renames(
    opts: &mut MergeOptions,
    store: &dyn ObjectStore,
    side: Side,
    base: &FlatTree,
    tree: &FlatTree,
) -> MergeFallible<Vec<RenameMapping>> {
    let diff = diff_flat_trees(base, tree);
    let deleted: Vec<(&str, EntryMode, ObjectId)> = diff.deleted().collect();
    let added: Vec<(&str, EntryMode, ObjectId)> = diff.added().collect();
    if deleted.is_empty() || added.is_empty() {
        return Ok(Vec::new());
    }

    let pairs = deleted.len().saturating_mul(added.len());
    if opts.rename_limit > 0 && pairs > opts.rename_limit {
        debug!(%side, pairs, limit = opts.rename_limit, "rename detection skipped");
        opts.output(
            2,
            format!(
                "Skipping inexact rename detection for {side}: {} deletions x {} additions exceeds the rename limit of {}.",
                deleted.len(),
                added.len(),
                opts.rename_limit
            ),
        );
        opts.note_rename_limit(pairs);
        return Ok(Vec::new());
    }

    let progress = opts.show_rename_progress;
    let mut blobs: HashMap<ObjectId, Vec<u8>> = HashMap::new();
    let mut candidates = Vec::new();
    let mut scored = 0usize;

    for &(source, old_mode, old_id) in &deleted {
        for &(destination, new_mode, new_id) in &added {
            if !old_mode.same_kind(&new_mode) {
                continue;
            }
            let score = if old_id == new_id {
                100
            } else {
                load(store, &mut blobs, &old_id)?;
                load(store, &mut blobs, &new_id)?;
                match (blobs.get(&old_id), blobs.get(&new_id)) {
                    (Some(a), Some(b)) => similarity(a, b),
                    _ => 0,
                }
            };
            scored += 1;
            if progress && scored % PROGRESS_INTERVAL == 0 {
                opts.output(3, format!("Performing inexact rename detection: {scored}/{pairs}"));
            }
            if score >= opts.rename_score {
                candidates.push(Candidate {
                    score,
                    source,
                    destination,
                });
            }
        }
    }
    if progress {
        opts.output(3, format!("Performing inexact rename detection: {scored}/{pairs}, done."));
    }

    candidates.sort_by(|a, b| {
        (Reverse(a.score), a.source, a.destination).cmp(&(Reverse(b.score), b.source, b.destination))
    });

    let mut used_sources = BTreeSet::new();
    let mut used_destinations = BTreeSet::new();
    let mut renames = Vec::new();
    for c in candidates {
        if used_sources.contains(c.source) || used_destinations.contains(c.destination) {
            continue;
        }
        used_sources.insert(c.source);
        used_destinations.insert(c.destination);
        renames.push(RenameMapping {
            side,
            source: c.source.to_string(),
            destination: c.destination.to_string(),
            score: c.score,
        });
    }
    renames.sort_by(|a, b| a.source.cmp(&b.source));

    debug!(%side, renames = renames.len(), pairs, "rename detection done");
    Ok(renames)
}

fn load(store: &dyn ObjectStore, cache: &mut HashMap<ObjectId, Vec<u8>>, id: &ObjectId) -> MergeFallible<()> {
    if !cache.contains_key(id) {
        cache.insert(*id, store.read_blob(id)?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_store::{FlatEntry, InMemoryObjectStore};

    fn tree(store: &InMemoryObjectStore, files: &[(&str, &str)]) -> FlatTree {
        files
            .iter()
            .map(|(path, content)| {
                let id = store.write_blob(content.as_bytes()).unwrap();
                (path.to_string(), FlatEntry::new(EntryMode::Regular, id))
            })
            .collect()
    }

    fn detect(opts: &mut MergeOptions, store: &InMemoryObjectStore, base: &FlatTree, side: &FlatTree) -> Vec<RenameMapping> {
        detect_renames(opts, store, Side::Ours, base, side).unwrap()
    }

    const TEXT: &str = "alpha\nbeta\ngamma\ndelta\nepsilon\nzeta\neta\ntheta\n";

    #[test]
    fn exact_rename() {
        let store = InMemoryObjectStore::new();
        let base = tree(&store, &[("a.txt", TEXT)]);
        let ours = tree(&store, &[("b.txt", TEXT)]);
        let renames = detect(&mut MergeOptions::default(), &store, &base, &ours);
        assert_eq!(renames.len(), 1);
        assert_eq!(renames[0].source, "a.txt");
        assert_eq!(renames[0].destination, "b.txt");
        assert_eq!(renames[0].score, 100);
    }

    #[test]
    fn similar_content_above_threshold() {
        let store = InMemoryObjectStore::new();
        let edited = TEXT.replace("theta", "THETA");
        let base = tree(&store, &[("a.txt", TEXT)]);
        let ours = tree(&store, &[("b.txt", &edited)]);
        let renames = detect(&mut MergeOptions::default(), &store, &base, &ours);
        assert_eq!(renames.len(), 1);
        assert!(renames[0].score >= 50 && renames[0].score < 100);
    }

    #[test]
    fn unrelated_content_is_not_a_rename() {
        let store = InMemoryObjectStore::new();
        let base = tree(&store, &[("a.txt", TEXT)]);
        let ours = tree(&store, &[("b.txt", "something\nelse\nentirely\n")]);
        assert!(detect(&mut MergeOptions::default(), &store, &base, &ours).is_empty());
    }

    #[test]
    fn greedy_assignment_uses_each_path_once() {
        let store = InMemoryObjectStore::new();
        let other = TEXT.replace("alpha", "ALPHA");
        let base = tree(&store, &[("a.txt", TEXT), ("b.txt", &other)]);
        // Both destinations resemble both sources; exact matches win.
        let ours = tree(&store, &[("x.txt", &other), ("y.txt", TEXT)]);
        let renames = detect(&mut MergeOptions::default(), &store, &base, &ours);
        assert_eq!(renames.len(), 2);
        assert_eq!((renames[0].source.as_str(), renames[0].destination.as_str()), ("a.txt", "y.txt"));
        assert_eq!((renames[1].source.as_str(), renames[1].destination.as_str()), ("b.txt", "x.txt"));
    }

    #[test]
    fn ties_break_by_path() {
        let store = InMemoryObjectStore::new();
        let base = tree(&store, &[("a.txt", TEXT)]);
        let ours = tree(&store, &[("c.txt", TEXT), ("b.txt", TEXT)]);
        let renames = detect(&mut MergeOptions::default(), &store, &base, &ours);
        assert_eq!(renames.len(), 1);
        assert_eq!(renames[0].destination, "b.txt");
    }

    #[test]
    fn paths_kept_in_place_are_not_sources() {
        let store = InMemoryObjectStore::new();
        let edited = TEXT.replace("beta", "BETA");
        let base = tree(&store, &[("a.txt", TEXT), ("gone.txt", "one\ntwo\n")]);
        // a.txt is modified in place and copied; only gone.txt was deleted.
        let ours = tree(&store, &[("a.txt", &edited), ("copy.txt", TEXT)]);
        assert!(detect(&mut MergeOptions::default(), &store, &base, &ours).is_empty());
    }

    #[test]
    fn symlinks_do_not_pair_with_files() {
        let store = InMemoryObjectStore::new();
        let base = tree(&store, &[("a", TEXT)]);
        let id = store.write_blob(TEXT.as_bytes()).unwrap();
        let ours: FlatTree = [("b".to_string(), FlatEntry::new(EntryMode::Symlink, id))].into_iter().collect();
        assert!(detect(&mut MergeOptions::default(), &store, &base, &ours).is_empty());
    }

    #[test]
    fn over_limit_is_skipped_and_noted() {
        let store = InMemoryObjectStore::new();
        let base = tree(&store, &[("a.txt", TEXT), ("b.txt", "x\n")]);
        let ours = tree(&store, &[("c.txt", TEXT)]);
        let mut opts = MergeOptions {
            rename_limit: 1,
            ..MergeOptions::default()
        };
        crate::internal::begin(&mut opts).unwrap();
        assert!(detect(&mut opts, &store, &base, &ours).is_empty());
        assert_eq!(opts.internal.as_ref().unwrap().needed_rename_limit, 2);
        crate::internal::finish(&mut opts);

        opts.rename_limit = 0;
        assert_eq!(detect(&mut opts, &store, &base, &ours).len(), 1);
    }

    #[test]
    fn missing_blob_is_an_error() {
        let store = InMemoryObjectStore::new();
        let base: FlatTree = [("a".to_string(), FlatEntry::new(EntryMode::Regular, ObjectId::from_bytes(b"gone")))]
            .into_iter()
            .collect();
        let ours = tree(&store, &[("b", TEXT)]);
        assert!(detect_renames(&mut MergeOptions::default(), &store, Side::Ours, &base, &ours).is_err());
    }
}

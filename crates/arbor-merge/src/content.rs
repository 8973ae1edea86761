//! Merging the versions of a single path.
//!
//! A version remembers the path it has in its own tree, which differs from
//! the merged path when it arrived through a rename. Conflict markers then
//! carry `branch:path` labels so the reader can tell where each side came
//! from.

use arbor_diff::{merge_blobs, MergeFileOptions, MergeFileOutcome, MergeVariant};
use arbor_store::{EntryMode, FlatEntry, ObjectStore};
use tracing::debug;

use crate::error::MergeFallible;
use crate::options::MergeOptions;
use crate::result::Variant;

/// Ancestor label used when none is configured.
const DEFAULT_ANCESTOR_LABEL: &str = "base";

/// One side's entry for a path, with the path it has on that side.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Version {
    pub(crate) path: String,
    pub(crate) entry: FlatEntry,
}

impl Version {
    pub(crate) fn new(path: impl Into<String>, entry: FlatEntry) -> Self {
        Self {
            path: path.into(),
            entry,
        }
    }

    pub(crate) fn variant(&self) -> Variant {
        Variant {
            path: self.path.clone(),
            mode: self.entry.mode,
            id: self.entry.id,
        }
    }
}

/// Outcome of [`merge_entries`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct EntryMerge {
    pub(crate) entry: FlatEntry,
    pub(crate) content_clean: bool,
    pub(crate) mode_clean: bool,
    /// Content could not be line-merged because it is binary.
    pub(crate) binary: bool,
}

impl EntryMerge {
    pub(crate) fn is_clean(&self) -> bool {
        self.content_clean && self.mode_clean
    }
}

/// Merge two versions of the same kind against an optional base and write
/// the merged blob. `path` is where the result will live.
///
/// A base of another kind (a file that both sides turned into a symlink,
/// say) does not take part in the content merge.
pub(crate) fn merge_entries(
    opts: &mut MergeOptions,
    store: &dyn ObjectStore,
    path: &str,
    base: Option<&Version>,
    ours: &Version,
    theirs: &Version,
) -> MergeFallible<EntryMerge> {
    let base = base.filter(|b| b.entry.mode.same_kind(&ours.entry.mode));
    let (mode, mode_clean) = merge_modes(base.map(|b| b.entry.mode), ours.entry.mode, theirs.entry.mode);

    let (o, t) = (ours.entry.id, theirs.entry.id);
    let b = base.map(|b| b.entry.id);
    let mut binary = false;

    let (id, content_clean) = if o == t {
        (o, true)
    } else if b == Some(o) {
        (t, true)
    } else if b == Some(t) {
        (o, true)
    } else if ours.entry.mode.is_symlink() {
        match opts.variant {
            MergeVariant::Ours => (o, true),
            MergeVariant::Theirs => (t, true),
            MergeVariant::Normal if opts.call_depth() > 0 => (b.unwrap_or(o), false),
            MergeVariant::Normal => (o, false),
        }
    } else {
        let outcome = merge_blobs_at(opts, store, path, base, ours, theirs)?;
        binary = outcome.binary;
        (store.write_blob(&outcome.content)?, outcome.is_clean())
    };

    Ok(EntryMerge {
        entry: FlatEntry::new(mode, id),
        content_clean,
        mode_clean,
        binary,
    })
}

fn merge_blobs_at(
    opts: &mut MergeOptions,
    store: &dyn ObjectStore,
    path: &str,
    base: Option<&Version>,
    ours: &Version,
    theirs: &Version,
) -> MergeFallible<MergeFileOutcome> {
    opts.output(2, format!("Auto-merging {path}"));

    let base_content = match base {
        Some(b) => store.read_blob(&b.entry.id)?,
        None => Vec::new(),
    };
    let ours_content = store.read_blob(&ours.entry.id)?;
    let theirs_content = store.read_blob(&theirs.entry.id)?;

    let file_opts = file_options(opts, path, base, ours, theirs);
    let outcome = merge_blobs(&base_content, &ours_content, &theirs_content, &file_opts);
    debug!(path, conflicts = outcome.conflicts, binary = outcome.binary, "content merged");

    if outcome.binary && !outcome.is_clean() {
        opts.output(
            0,
            format!(
                "warning: Cannot merge binary files: {path} ({} vs. {})",
                file_opts.ours_label.as_deref().unwrap_or_default(),
                file_opts.theirs_label.as_deref().unwrap_or_default()
            ),
        );
    }
    Ok(outcome)
}

/// Content-merge settings for `path`, with labels naming the original paths
/// of renamed versions.
pub(crate) fn file_options(
    opts: &MergeOptions,
    path: &str,
    base: Option<&Version>,
    ours: &Version,
    theirs: &Version,
) -> MergeFileOptions {
    let moved = ours.path != path || theirs.path != path || base.is_some_and(|b| b.path != path);
    let label = |name: &str, version: Option<&Version>| match version {
        Some(v) if moved => format!("{name}:{}", v.path),
        _ => name.to_string(),
    };
    let ancestor = opts.ancestor.as_deref().unwrap_or(DEFAULT_ANCESTOR_LABEL);

    MergeFileOptions {
        ancestor_label: Some(label(ancestor, base)),
        ours_label: Some(label(&opts.branch1, Some(ours))),
        theirs_label: Some(label(&opts.branch2, Some(theirs))),
        variant: opts.variant,
        style: opts.conflict_style,
        algorithm: opts.algorithm,
        whitespace: opts.whitespace,
        renormalize: opts.renormalize,
        call_depth: opts.call_depth(),
    }
}

/// A mode changed on one side wins; two different changes keep ours.
fn merge_modes(base: Option<EntryMode>, ours: EntryMode, theirs: EntryMode) -> (EntryMode, bool) {
    if ours == theirs {
        (ours, true)
    } else if base == Some(ours) {
        (theirs, true)
    } else if base == Some(theirs) {
        (ours, true)
    } else {
        (ours, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_store::InMemoryObjectStore;

    fn version(store: &InMemoryObjectStore, path: &str, mode: EntryMode, content: &str) -> Version {
        Version::new(path, FlatEntry::new(mode, store.write_blob(content.as_bytes()).unwrap()))
    }

    fn text(store: &InMemoryObjectStore, merged: &EntryMerge) -> String {
        String::from_utf8(store.read_blob(&merged.entry.id).unwrap()).unwrap()
    }

    // -----------------------------------------------------------------------
    // Content
    // -----------------------------------------------------------------------

    #[test]
    fn disjoint_line_changes_merge_cleanly() {
        let store = InMemoryObjectStore::new();
        let base = version(&store, "f", EntryMode::Regular, "A\nB\nC\n");
        let ours = version(&store, "f", EntryMode::Regular, "A\nB1\nC\n");
        let theirs = version(&store, "f", EntryMode::Regular, "A\nB\nC1\n");

        let merged = merge_entries(&mut MergeOptions::default(), &store, "f", Some(&base), &ours, &theirs).unwrap();
        assert!(merged.is_clean());
        assert_eq!(text(&store, &merged), "A\nB1\nC1\n");
    }

    #[test]
    fn overlapping_changes_conflict_with_branch_labels() {
        let store = InMemoryObjectStore::new();
        let base = version(&store, "f", EntryMode::Regular, "x\n");
        let ours = version(&store, "f", EntryMode::Regular, "ours\n");
        let theirs = version(&store, "f", EntryMode::Regular, "theirs\n");

        let merged = merge_entries(&mut MergeOptions::default(), &store, "f", Some(&base), &ours, &theirs).unwrap();
        assert!(!merged.content_clean);
        let out = text(&store, &merged);
        assert!(out.contains("<<<<<<< HEAD\n"));
        assert!(out.contains(">>>>>>> MERGE_HEAD\n"));
    }

    #[test]
    fn renamed_versions_get_path_labels() {
        let store = InMemoryObjectStore::new();
        let base = version(&store, "old", EntryMode::Regular, "x\n");
        let ours = version(&store, "new", EntryMode::Regular, "ours\n");
        let theirs = version(&store, "old", EntryMode::Regular, "theirs\n");

        let file_opts = file_options(&MergeOptions::default(), "new", Some(&base), &ours, &theirs);
        assert_eq!(file_opts.ours_label.as_deref(), Some("HEAD:new"));
        assert_eq!(file_opts.theirs_label.as_deref(), Some("MERGE_HEAD:old"));
        assert_eq!(file_opts.ancestor_label.as_deref(), Some("base:old"));
    }

    #[test]
    fn bias_resolves_conflicting_hunks() {
        let store = InMemoryObjectStore::new();
        let base = version(&store, "f", EntryMode::Regular, "x\n");
        let ours = version(&store, "f", EntryMode::Regular, "ours\n");
        let theirs = version(&store, "f", EntryMode::Regular, "theirs\n");
        let mut opts = MergeOptions {
            variant: MergeVariant::Theirs,
            ..MergeOptions::default()
        };

        let merged = merge_entries(&mut opts, &store, "f", Some(&base), &ours, &theirs).unwrap();
        assert!(merged.is_clean());
        assert_eq!(text(&store, &merged), "theirs\n");
    }

    #[test]
    fn symlinks_are_not_line_merged() {
        let store = InMemoryObjectStore::new();
        let base = version(&store, "l", EntryMode::Symlink, "target");
        let ours = version(&store, "l", EntryMode::Symlink, "ours-target");
        let theirs = version(&store, "l", EntryMode::Symlink, "theirs-target");

        let merged = merge_entries(&mut MergeOptions::default(), &store, "l", Some(&base), &ours, &theirs).unwrap();
        assert!(!merged.content_clean);
        assert_eq!(merged.entry, ours.entry);
    }

    #[test]
    fn binary_conflict_keeps_ours() {
        let store = InMemoryObjectStore::new();
        let base = version(&store, "b", EntryMode::Regular, "\0base");
        let ours = version(&store, "b", EntryMode::Regular, "\0ours");
        let theirs = version(&store, "b", EntryMode::Regular, "\0theirs");

        let merged = merge_entries(&mut MergeOptions::default(), &store, "b", Some(&base), &ours, &theirs).unwrap();
        assert!(merged.binary);
        assert!(!merged.content_clean);
        assert_eq!(merged.entry.id, ours.entry.id);
    }

    // -----------------------------------------------------------------------
    // Modes
    // -----------------------------------------------------------------------

    #[test]
    fn one_sided_mode_change_wins() {
        let store = InMemoryObjectStore::new();
        let base = version(&store, "s", EntryMode::Regular, "echo\n");
        let ours = version(&store, "s", EntryMode::Regular, "echo hi\n");
        let theirs = version(&store, "s", EntryMode::Executable, "echo\n");

        let merged = merge_entries(&mut MergeOptions::default(), &store, "s", Some(&base), &ours, &theirs).unwrap();
        assert!(merged.is_clean());
        assert_eq!(merged.entry.mode, EntryMode::Executable);
        assert_eq!(merged.entry.id, ours.entry.id);
    }

    #[test]
    fn add_add_with_different_modes_keeps_ours() {
        assert_eq!(
            merge_modes(None, EntryMode::Executable, EntryMode::Regular),
            (EntryMode::Executable, false)
        );
        assert_eq!(
            merge_modes(Some(EntryMode::Regular), EntryMode::Regular, EntryMode::Executable),
            (EntryMode::Executable, true)
        );
    }
}

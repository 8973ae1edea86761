//! Three-way merge of two trees against a base.
//!
//! The trees are flattened and merged path by path. Before that, renames
//! detected on each side move the base version (and the other side's
//! version) of a renamed path to its destination, so content follows the
//! rename; rename combinations that cannot be expressed that way are
//! resolved directly. Directory renames move paths the other side added.
//!
//! Each path is then classified: unchanged or changed on one side takes the
//! changed side, changes on both sides go through the content merge, and
//! deletion against modification is a conflict. Finally a file that ended
//! up where the other side has a directory is moved aside.
//!
//! The best-effort tree, conflict markers included, is always written so
//! it can serve as a virtual merge base.

use std::collections::{BTreeMap, BTreeSet};

use arbor_store::{FlatEntry, FlatTree, ObjectStore};
use arbor_types::ObjectId;
use tracing::{debug, info};

use crate::content::{merge_entries, Version};
use crate::dir_rename::{apply_directory_renames, ForcedConflict};
use crate::error::MergeFallible;
use crate::options::MergeOptions;
use crate::rename::detect_renames;
use crate::result::{ConflictEntry, ConflictKind, RenameMapping, Side};
use crate::subtree::shift_trees;

/// Index stages of one conflicted path.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct PathStages {
    pub(crate) base: Option<FlatEntry>,
    pub(crate) ours: Option<FlatEntry>,
    pub(crate) theirs: Option<FlatEntry>,
}

/// Product of [`merge_tree_ids`].
#[derive(Debug)]
pub(crate) struct TreeMerge {
    pub(crate) tree: ObjectId,
    pub(crate) merged: FlatTree,
    pub(crate) conflicts: Vec<ConflictEntry>,
    pub(crate) renames: Vec<RenameMapping>,
    /// Conflicted paths with their per-side versions.
    pub(crate) stages: BTreeMap<String, PathStages>,
}

impl TreeMerge {
    pub(crate) fn is_clean(&self) -> bool {
        self.conflicts.is_empty()
    }

    fn unchanged(store: &dyn ObjectStore, tree: ObjectId) -> MergeFallible<Self> {
        Ok(Self::taken(tree, FlatTree::load(store, &tree)?))
    }

    fn taken(tree: ObjectId, merged: FlatTree) -> Self {
        Self {
            tree,
            merged,
            conflicts: Vec::new(),
            renames: Vec::new(),
            stages: BTreeMap::new(),
        }
    }
}

/// Merge the trees `ours` and `theirs` against `base`.
pub(crate) fn merge_tree_ids(
    opts: &mut MergeOptions,
    store: &dyn ObjectStore,
    base: &ObjectId,
    ours: &ObjectId,
    theirs: &ObjectId,
) -> MergeFallible<TreeMerge> {
    debug!(
        base = %base.short_hex(),
        ours = %ours.short_hex(),
        theirs = %theirs.short_hex(),
        depth = opts.call_depth(),
        "merging trees"
    );

    if opts.subtree_shift.is_none() {
        if base == theirs || ours == theirs {
            if base == theirs {
                opts.output(0, "Already up to date.");
            }
            return TreeMerge::unchanged(store, *ours);
        }
        if base == ours {
            return TreeMerge::unchanged(store, *theirs);
        }
    }

    let mut ours_flat = FlatTree::load(store, ours)?;
    let mut base_flat = FlatTree::load(store, base)?;
    let mut theirs_flat = FlatTree::load(store, theirs)?;

    if let Some(prefix) = opts.subtree_shift.clone() {
        shift_trees(opts, &prefix, &ours_flat, &mut base_flat, &mut theirs_flat);
        if base_flat == theirs_flat || ours_flat == theirs_flat {
            if base_flat == theirs_flat {
                opts.output(0, "Already up to date.");
            }
            return Ok(TreeMerge::taken(*ours, ours_flat));
        }
        if base_flat == ours_flat {
            let tree = theirs_flat.write(store)?;
            return Ok(TreeMerge::taken(tree, theirs_flat));
        }
    }

    merge_flat(opts, store, &base_flat, &mut ours_flat, &mut theirs_flat)
}

fn merge_flat(
    opts: &mut MergeOptions,
    store: &dyn ObjectStore,
    base: &FlatTree,
    ours: &mut FlatTree,
    theirs: &mut FlatTree,
) -> MergeFallible<TreeMerge> {
    let (mut ours_renames, mut theirs_renames) = if opts.detect_renames {
        (
            detect_renames(opts, store, Side::Ours, base, ours)?,
            detect_renames(opts, store, Side::Theirs, base, theirs)?,
        )
    } else {
        (Vec::new(), Vec::new())
    };
    let forced = if opts.detect_renames {
        apply_directory_renames(opts, base, ours, theirs, &mut ours_renames, &mut theirs_renames)
    } else {
        BTreeMap::new()
    };

    let mut merger = Merger::new(opts, store, base, ours, theirs);
    merger.resolve_renames(&ours_renames, &theirs_renames)?;
    merger.classify_all()?;
    merger.apply_forced(forced);
    merger.move_files_out_of_the_way(ours);

    let Merger {
        merged,
        conflicts,
        stages,
        ..
    } = merger;
    let tree = merged.write(store)?;
    info!(
        tree = %tree.short_hex(),
        paths = merged.len(),
        conflicts = conflicts.len(),
        "tree merge finished"
    );

    let mut renames = ours_renames;
    renames.extend(theirs_renames);
    Ok(TreeMerge {
        tree,
        merged,
        conflicts,
        renames,
        stages,
    })
}

/// The versions competing for one merged path.
#[derive(Clone, Debug, Default)]
struct Slot {
    base: Option<Version>,
    ours: Option<Version>,
    theirs: Option<Version>,
    /// Already resolved by rename handling.
    settled: bool,
}

impl Slot {
    fn side(&self, side: Side) -> Option<&Version> {
        match side {
            Side::Base => self.base.as_ref(),
            Side::Ours => self.ours.as_ref(),
            Side::Theirs => self.theirs.as_ref(),
        }
    }

    fn side_mut(&mut self, side: Side) -> &mut Option<Version> {
        match side {
            Side::Base => &mut self.base,
            Side::Ours => &mut self.ours,
            Side::Theirs => &mut self.theirs,
        }
    }

    fn with(mut self, side: Side, version: Version) -> Self {
        *self.side_mut(side) = Some(version);
        self
    }

    fn is_empty(&self) -> bool {
        self.base.is_none() && self.ours.is_none() && self.theirs.is_none()
    }

    fn stages(&self) -> PathStages {
        PathStages {
            base: self.base.as_ref().map(|v| v.entry),
            ours: self.ours.as_ref().map(|v| v.entry),
            theirs: self.theirs.as_ref().map(|v| v.entry),
        }
    }
}

/// `(ours, theirs)` from a version on `side` and one on the other side.
fn ordered<'v>(side: Side, mine: &'v Version, other: &'v Version) -> (&'v Version, &'v Version) {
    match side {
        Side::Theirs => (other, mine),
        _ => (mine, other),
    }
}

struct Merger<'a> {
    opts: &'a mut MergeOptions,
    store: &'a dyn ObjectStore,
    slots: BTreeMap<String, Slot>,
    /// Every path in use in any input, for picking unused names.
    taken: BTreeSet<String>,
    merged: FlatTree,
    conflicts: Vec<ConflictEntry>,
    stages: BTreeMap<String, PathStages>,
}

impl<'a> Merger<'a> {
    fn new(
        opts: &'a mut MergeOptions,
        store: &'a dyn ObjectStore,
        base: &FlatTree,
        ours: &FlatTree,
        theirs: &FlatTree,
    ) -> Self {
        let mut slots: BTreeMap<String, Slot> = BTreeMap::new();
        for (side, tree) in [(Side::Base, base), (Side::Ours, ours), (Side::Theirs, theirs)] {
            for (path, entry) in tree.iter() {
                *slots.entry(path.clone()).or_default().side_mut(side) = Some(Version::new(path.clone(), *entry));
            }
        }
        let taken = slots.keys().cloned().collect();
        Self {
            opts,
            store,
            slots,
            taken,
            merged: FlatTree::new(),
            conflicts: Vec::new(),
            stages: BTreeMap::new(),
        }
    }

    fn branch(&self, side: Side) -> String {
        match side {
            Side::Theirs => self.opts.branch2.clone(),
            _ => self.opts.branch1.clone(),
        }
    }

    fn version(&self, path: &str, side: Side) -> Option<Version> {
        self.slots.get(path).and_then(|s| s.side(side)).cloned()
    }

    fn take(&mut self, path: &str, side: Side) -> Option<Version> {
        self.slots.get_mut(path).and_then(|s| s.side_mut(side).take())
    }

    fn is_settled(&self, path: &str) -> bool {
        self.slots.get(path).is_some_and(|s| s.settled)
    }

    fn set(&mut self, path: &str, entry: Option<FlatEntry>) {
        if let Some(entry) = entry {
            self.merged.insert(path, entry);
        }
    }

    fn settle(&mut self, path: &str, entry: Option<FlatEntry>) {
        self.slots.entry(path.to_string()).or_default().settled = true;
        self.set(path, entry);
    }

    fn push_conflict(&mut self, path: &str, kind: ConflictKind, message: String, versions: &Slot) {
        debug!(path, %kind, "conflict");
        self.conflicts.push(ConflictEntry {
            path: path.to_string(),
            kind,
            base: versions.base.as_ref().map(Version::variant),
            ours: versions.ours.as_ref().map(Version::variant),
            theirs: versions.theirs.as_ref().map(Version::variant),
            message,
        });
    }

    fn record(&mut self, path: &str, kind: ConflictKind, message: String, versions: &Slot) {
        self.opts.conflict_msg(path, &message);
        self.push_conflict(path, kind, message, versions);
    }

    fn stage(&mut self, path: &str, versions: &Slot) {
        if !versions.is_empty() {
            self.stages.insert(path.to_string(), versions.stages());
        }
    }

    /// `path~label`, suffixed until it names nothing in use.
    fn unique_path(&mut self, path: &str, label: &str) -> String {
        let label = label.replace('/', "_");
        let mut candidate = format!("{path}~{label}");
        let mut n = 0;
        while self.taken.contains(&candidate)
            || self.merged.contains(&candidate)
            || self.merged.has_directory(&candidate)
        {
            candidate = format!("{path}~{label}_{n}");
            n += 1;
        }
        self.taken.insert(candidate.clone());
        candidate
    }

    // -----------------------------------------------------------------------
    // Renames
    // -----------------------------------------------------------------------

    fn resolve_renames(&mut self, ours: &[RenameMapping], theirs: &[RenameMapping]) -> MergeFallible<()> {
        let ours_by_src: BTreeMap<&str, &RenameMapping> = ours.iter().map(|r| (r.source.as_str(), r)).collect();
        let ours_by_dst: BTreeSet<&str> = ours.iter().map(|r| r.destination.as_str()).collect();
        let theirs_by_src: BTreeMap<&str, &RenameMapping> =
            theirs.iter().map(|r| (r.source.as_str(), r)).collect();
        let theirs_by_dst: BTreeMap<&str, &RenameMapping> =
            theirs.iter().map(|r| (r.destination.as_str(), r)).collect();

        for r in ours {
            if self.is_settled(&r.destination) {
                continue;
            }
            match theirs_by_src.get(r.source.as_str()) {
                Some(t) if t.destination == r.destination => {
                    let base = self.take(&r.source, Side::Base);
                    self.slots.entry(r.destination.clone()).or_default().base = base;
                }
                Some(t) => {
                    if !self.is_settled(&t.destination) {
                        self.rename_split(&r.source, &r.destination, &t.destination)?;
                    }
                }
                None => match theirs_by_dst.get(r.destination.as_str()) {
                    Some(t) => self.rename_collide(&r.source, &t.source, &r.destination)?,
                    None => self.one_sided(Side::Ours, &r.source, &r.destination)?,
                },
            }
        }

        for r in theirs {
            if self.is_settled(&r.destination)
                || ours_by_src.contains_key(r.source.as_str())
                || ours_by_dst.contains(r.destination.as_str())
            {
                continue;
            }
            self.one_sided(Side::Theirs, &r.source, &r.destination)?;
        }
        Ok(())
    }

    /// `renamer` moved `src` to `dst`; the other side did not rename it.
    fn one_sided(&mut self, renamer: Side, src: &str, dst: &str) -> MergeFallible<()> {
        let other = renamer.other();
        let Some(base) = self.take(src, Side::Base) else {
            return Ok(());
        };
        let other_src = self.take(src, other);

        if self.version(dst, other).is_some() {
            return self.rename_add(renamer, src, dst, base, other_src);
        }
        match other_src {
            Some(version) => {
                let slot = self.slots.entry(dst.to_string()).or_default();
                slot.base = Some(base);
                *slot.side_mut(other) = Some(version);
                Ok(())
            }
            None => {
                self.rename_delete(renamer, src, dst, base);
                Ok(())
            }
        }
    }

    fn rename_delete(&mut self, renamer: Side, src: &str, dst: &str, base: Version) {
        let Some(renamed) = self.version(dst, renamer) else {
            return;
        };
        self.settle(dst, Some(renamed.entry));

        let message = format!(
            "CONFLICT (rename/delete): {src} renamed to {dst} in {}, but deleted in {}.",
            self.branch(renamer),
            self.branch(renamer.other())
        );
        let versions = Slot::default().with(Side::Base, base).with(renamer, renamed);
        self.record(dst, ConflictKind::RenameDelete, message, &versions);
        self.stage(dst, &versions);
    }

    /// `renamer` moved `src` onto `dst`, which the other side added.
    fn rename_add(
        &mut self,
        renamer: Side,
        src: &str,
        dst: &str,
        base: Version,
        other_src: Option<Version>,
    ) -> MergeFallible<()> {
        let other = renamer.other();
        let (Some(renamed), Some(added)) = (self.version(dst, renamer), self.version(dst, other)) else {
            return Ok(());
        };

        let followed = match &other_src {
            Some(changed) if changed.entry.mode.same_kind(&renamed.entry.mode) => {
                let (o, t) = ordered(renamer, &renamed, changed);
                merge_entries(self.opts, self.store, dst, Some(&base), o, t)?.entry
            }
            _ => renamed.entry,
        };
        let followed = Version::new(dst, followed);

        let entry = if followed.entry.mode.same_kind(&added.entry.mode) {
            let (o, t) = ordered(renamer, &followed, &added);
            merge_entries(self.opts, self.store, dst, None, o, t)?.entry
        } else {
            followed.entry
        };
        self.settle(dst, Some(entry));

        let message = format!(
            "CONFLICT (rename/add): {src} renamed to {dst} in {}; {dst} added in {}.",
            self.branch(renamer),
            self.branch(other)
        );
        let versions = Slot::default().with(renamer, followed).with(other, added);
        self.record(dst, ConflictKind::RenameAdd, message, &versions);
        self.stage(dst, &versions);
        Ok(())
    }

    /// Ours moved `src` to `ours_dst`, theirs moved it to `theirs_dst`.
    /// The merged content is written at both destinations.
    fn rename_split(&mut self, src: &str, ours_dst: &str, theirs_dst: &str) -> MergeFallible<()> {
        let base = self.take(src, Side::Base);
        let (Some(ours), Some(theirs)) = (self.version(ours_dst, Side::Ours), self.version(theirs_dst, Side::Theirs))
        else {
            return Ok(());
        };

        let (at_ours, at_theirs) = if ours.entry.mode.same_kind(&theirs.entry.mode) {
            let merged = merge_entries(self.opts, self.store, src, base.as_ref(), &ours, &theirs)?;
            (merged.entry, merged.entry)
        } else {
            (ours.entry, theirs.entry)
        };
        self.settle(ours_dst, Some(at_ours));
        self.settle(theirs_dst, Some(at_theirs));

        let message = format!(
            "CONFLICT (rename/rename): {src} renamed to {ours_dst} in {} and to {theirs_dst} in {}.",
            self.opts.branch1, self.opts.branch2
        );
        self.opts.conflict_msg(src, &message);

        let all = Slot {
            base: base.clone(),
            ours: Some(ours.clone()),
            theirs: Some(theirs.clone()),
            settled: true,
        };
        self.push_conflict(ours_dst, ConflictKind::RenameRename, message.clone(), &all);
        self.push_conflict(theirs_dst, ConflictKind::RenameRename, message, &all);

        let at_ours_dst = Slot {
            base: base.clone(),
            ours: Some(ours),
            ..Slot::default()
        };
        let at_theirs_dst = Slot {
            base,
            theirs: Some(theirs),
            ..Slot::default()
        };
        self.stage(ours_dst, &at_ours_dst);
        self.stage(theirs_dst, &at_theirs_dst);
        Ok(())
    }

    /// Ours moved `ours_src` and theirs moved `theirs_src` onto the same
    /// `dst`. Each rename is merged with the other side's edits to its
    /// source, then the two results are merged without a base.
    fn rename_collide(&mut self, ours_src: &str, theirs_src: &str, dst: &str) -> MergeFallible<()> {
        let (Some(ours_dst), Some(theirs_dst)) = (self.version(dst, Side::Ours), self.version(dst, Side::Theirs))
        else {
            return Ok(());
        };
        let ours_base = self.take(ours_src, Side::Base);
        let theirs_edit = self.take(ours_src, Side::Theirs);
        let theirs_base = self.take(theirs_src, Side::Base);
        let ours_edit = self.take(theirs_src, Side::Ours);

        let ours_entry = match (&ours_base, &theirs_edit) {
            (Some(b), Some(t)) if t.entry.mode.same_kind(&ours_dst.entry.mode) => {
                merge_entries(self.opts, self.store, dst, Some(b), &ours_dst, t)?.entry
            }
            _ => ours_dst.entry,
        };
        let theirs_entry = match (&theirs_base, &ours_edit) {
            (Some(b), Some(o)) if o.entry.mode.same_kind(&theirs_dst.entry.mode) => {
                merge_entries(self.opts, self.store, dst, Some(b), o, &theirs_dst)?.entry
            }
            _ => theirs_dst.entry,
        };
        let ours_version = Version::new(dst, ours_entry);
        let theirs_version = Version::new(dst, theirs_entry);

        let entry = if ours_entry == theirs_entry || !ours_entry.mode.same_kind(&theirs_entry.mode) {
            ours_entry
        } else {
            merge_entries(self.opts, self.store, dst, None, &ours_version, &theirs_version)?.entry
        };
        self.settle(dst, Some(entry));

        let message = format!(
            "CONFLICT (rename/rename): {ours_src} renamed to {dst} in {} and {theirs_src} renamed to {dst} in {}.",
            self.opts.branch1, self.opts.branch2
        );
        let versions = Slot::default()
            .with(Side::Ours, ours_version)
            .with(Side::Theirs, theirs_version);
        self.record(dst, ConflictKind::RenameRename, message, &versions);
        self.stage(dst, &versions);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Per-path classification
    // -----------------------------------------------------------------------

    fn classify_all(&mut self) -> MergeFallible<()> {
        let pending: Vec<(String, Slot)> = self
            .slots
            .iter()
            .filter(|(_, slot)| !slot.settled)
            .map(|(path, slot)| (path.clone(), slot.clone()))
            .collect();
        for (path, slot) in pending {
            self.classify(&path, &slot)?;
        }
        Ok(())
    }

    fn classify(&mut self, path: &str, slot: &Slot) -> MergeFallible<()> {
        let entry = |v: Option<&Version>| v.map(|v| v.entry);
        let (b, o, t) = (slot.base.as_ref(), slot.ours.as_ref(), slot.theirs.as_ref());
        let (be, oe, te) = (entry(b), entry(o), entry(t));

        if oe == te || be == te {
            self.set(path, oe);
            return Ok(());
        }
        if be == oe {
            self.set(path, te);
            return Ok(());
        }
        match (o, t) {
            (Some(o), Some(t)) => self.merge_both(path, slot, o, t),
            (Some(modified), None) => {
                self.delete_modify(path, slot, Side::Theirs, modified);
                Ok(())
            }
            (None, Some(modified)) => {
                self.delete_modify(path, slot, Side::Ours, modified);
                Ok(())
            }
            (None, None) => Ok(()),
        }
    }

    fn merge_both(&mut self, path: &str, slot: &Slot, ours: &Version, theirs: &Version) -> MergeFallible<()> {
        if !ours.entry.mode.same_kind(&theirs.entry.mode) {
            let label = self.opts.branch2.clone();
            let aside = self.unique_path(path, &label);
            self.set(path, Some(ours.entry));
            self.merged.insert(aside.clone(), theirs.entry);

            let message = format!(
                "CONFLICT (distinct types): {path} had different types on each side; \
                 moved the version from {label} to {aside}."
            );
            self.record(path, ConflictKind::TypeChange, message, slot);
            let here = Slot {
                base: slot.base.clone(),
                ours: Some(ours.clone()),
                ..Slot::default()
            };
            self.stage(path, &here);
            self.stage(&aside, &Slot::default().with(Side::Theirs, theirs.clone()));
            return Ok(());
        }

        let base = slot.base.as_ref();
        let merged = merge_entries(self.opts, self.store, path, base, ours, theirs)?;
        self.set(path, Some(merged.entry));

        if !merged.content_clean {
            let kind = if base.is_none() {
                ConflictKind::AddAdd
            } else if merged.binary {
                ConflictKind::Binary
            } else {
                ConflictKind::Content
            };
            self.record(path, kind, format!("CONFLICT ({kind}): Merge conflict in {path}"), slot);
        }
        if !merged.mode_clean {
            let message = format!(
                "CONFLICT (mode): {path} has mode {} in {} and {} in {}; keeping {}.",
                ours.entry.mode, self.opts.branch1, theirs.entry.mode, self.opts.branch2, ours.entry.mode
            );
            self.record(path, ConflictKind::ModeConflict, message, slot);
        }
        if !merged.is_clean() {
            self.stage(path, slot);
        }
        Ok(())
    }

    /// The `deleted` side removed the path the other side changed. Virtual
    /// merges keep the base version; the top-level merge keeps the change.
    fn delete_modify(&mut self, path: &str, slot: &Slot, deleted: Side, modified: &Version) {
        let keep = if self.opts.call_depth() > 0 {
            slot.base.as_ref().map(|b| b.entry)
        } else {
            Some(modified.entry)
        };
        self.set(path, keep);

        let modifier = self.branch(deleted.other());
        let message = format!(
            "CONFLICT (modify/delete): {path} deleted in {} and modified in {modifier}. \
             Version {modifier} of {path} left in tree.",
            self.branch(deleted)
        );
        self.record(path, ConflictKind::DeleteModify, message, slot);
        self.stage(path, slot);
    }

    // -----------------------------------------------------------------------
    // Finishing touches
    // -----------------------------------------------------------------------

    /// Record conflicts raised by directory rename handling. Their messages
    /// were reported when they were raised.
    fn apply_forced(&mut self, forced: BTreeMap<String, ForcedConflict>) {
        for (path, conflict) in forced {
            let slot = self.slots.get(&path).cloned().unwrap_or_default();
            self.push_conflict(&path, conflict.kind, conflict.message, &slot);
            if !self.stages.contains_key(&path) {
                self.stage(&path, &slot);
            }
        }
    }

    /// Move every merged file that sits where a merged directory is.
    fn move_files_out_of_the_way(&mut self, ours: &FlatTree) {
        let in_the_way: Vec<String> = self
            .merged
            .paths()
            .filter(|path| self.merged.has_directory(path))
            .cloned()
            .collect();

        for path in in_the_way {
            let Some(entry) = self.merged.remove(&path) else {
                continue;
            };
            let side = if ours.contains(&path) { Side::Ours } else { Side::Theirs };
            let label = self.branch(side);
            let aside = self.unique_path(&path, &label);
            self.merged.insert(aside.clone(), entry);

            let stages = self.stages.remove(&path).unwrap_or_else(|| {
                let mut stages = PathStages::default();
                match side {
                    Side::Theirs => stages.theirs = Some(entry),
                    _ => stages.ours = Some(entry),
                }
                stages
            });
            self.stages.insert(aside.clone(), stages);
            for conflict in self.conflicts.iter_mut().filter(|c| c.path == path) {
                conflict.path = aside.clone();
            }

            let message = format!(
                "CONFLICT (file/directory): directory in the way of {path} from {label}; moving it to {aside} instead."
            );
            let versions = Slot::default().with(side, Version::new(path.clone(), entry));
            self.record(&aside, ConflictKind::DirectoryFile, message, &versions);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{BufferOutput, DirectoryRenames};
    use arbor_store::{EntryMode, InMemoryObjectStore};

    struct Fixture {
        store: InMemoryObjectStore,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                store: InMemoryObjectStore::new(),
            }
        }

        fn tree(&self, files: &[(&str, &str)]) -> ObjectId {
            self.tree_with_modes(&files.iter().map(|(p, c)| (*p, EntryMode::Regular, *c)).collect::<Vec<_>>())
        }

        fn tree_with_modes(&self, files: &[(&str, EntryMode, &str)]) -> ObjectId {
            let flat: FlatTree = files
                .iter()
                .map(|(path, mode, content)| {
                    let id = self.store.write_blob(content.as_bytes()).unwrap();
                    (path.to_string(), FlatEntry::new(*mode, id))
                })
                .collect();
            flat.write(&self.store).unwrap()
        }

        fn merge(&self, opts: &mut MergeOptions, base: ObjectId, ours: ObjectId, theirs: ObjectId) -> TreeMerge {
            merge_tree_ids(opts, &self.store, &base, &ours, &theirs).unwrap()
        }

        fn content(&self, merge: &TreeMerge, path: &str) -> String {
            let entry = merge.merged.get(path).unwrap_or_else(|| panic!("{path} missing"));
            String::from_utf8(self.store.read_blob(&entry.id).unwrap()).unwrap()
        }
    }

    fn kinds(merge: &TreeMerge) -> Vec<(String, ConflictKind)> {
        merge.conflicts.iter().map(|c| (c.path.clone(), c.kind)).collect()
    }

    fn quiet() -> MergeOptions {
        MergeOptions {
            buffer_output: BufferOutput::Keep,
            ..MergeOptions::default()
        }
    }

    const LINES: &str = "one\ntwo\nthree\nfour\nfive\nsix\nseven\neight\n";

    // -----------------------------------------------------------------------
    // Shortcuts and classification
    // -----------------------------------------------------------------------

    #[test]
    fn shortcuts_return_existing_trees() {
        let fx = Fixture::new();
        let base = fx.tree(&[("a", "1\n")]);
        let changed = fx.tree(&[("a", "2\n")]);

        assert_eq!(fx.merge(&mut quiet(), base, changed, base).tree, changed);
        assert_eq!(fx.merge(&mut quiet(), base, base, changed).tree, changed);
        assert_eq!(fx.merge(&mut quiet(), base, changed, changed).tree, changed);
    }

    #[test]
    fn one_sided_changes_and_deletions() {
        let fx = Fixture::new();
        let base = fx.tree(&[("keep", "k\n"), ("edit", "e\n"), ("drop", "d\n")]);
        let ours = fx.tree(&[("keep", "k\n"), ("edit", "e2\n"), ("drop", "d\n"), ("new", "n\n")]);
        let theirs = fx.tree(&[("keep", "k\n"), ("edit", "e\n")]);

        let merge = fx.merge(&mut quiet(), base, ours, theirs);
        assert!(merge.is_clean());
        assert_eq!(fx.content(&merge, "edit"), "e2\n");
        assert_eq!(fx.content(&merge, "new"), "n\n");
        assert!(!merge.merged.contains("drop"));
    }

    #[test]
    fn content_conflict_is_staged() {
        let fx = Fixture::new();
        let base = fx.tree(&[("f", "x\n")]);
        let ours = fx.tree(&[("f", "ours\n")]);
        let theirs = fx.tree(&[("f", "theirs\n")]);

        let merge = fx.merge(&mut quiet(), base, ours, theirs);
        assert_eq!(kinds(&merge), vec![("f".to_string(), ConflictKind::Content)]);
        assert!(fx.content(&merge, "f").contains("<<<<<<< HEAD"));
        let stages = merge.stages["f"];
        assert!(stages.base.is_some() && stages.ours.is_some() && stages.theirs.is_some());
    }

    #[test]
    fn add_add_identical_is_clean_different_conflicts() {
        let fx = Fixture::new();
        let base = fx.tree(&[]);
        let same = fx.merge(&mut quiet(), base, fx.tree(&[("n", "x\n")]), fx.tree(&[("n", "x\n"), ("m", "m\n")]));
        assert!(same.is_clean());

        let diff = fx.merge(&mut quiet(), base, fx.tree(&[("n", "x\n")]), fx.tree(&[("n", "y\n")]));
        assert_eq!(kinds(&diff), vec![("n".to_string(), ConflictKind::AddAdd)]);
        assert!(diff.stages["n"].base.is_none());
    }

    #[test]
    fn modify_delete_keeps_modified_version_at_top_level() {
        let fx = Fixture::new();
        let base = fx.tree(&[("f", "x\n"), ("g", "g\n")]);
        let ours = fx.tree(&[("g", "g\n")]);
        let theirs = fx.tree(&[("f", "x2\n"), ("g", "g\n")]);

        let merge = fx.merge(&mut quiet(), base, ours, theirs);
        assert_eq!(kinds(&merge), vec![("f".to_string(), ConflictKind::DeleteModify)]);
        assert_eq!(fx.content(&merge, "f"), "x2\n");
        assert!(merge.stages["f"].ours.is_none());
    }

    #[test]
    fn modify_delete_keeps_base_in_virtual_merge() {
        let fx = Fixture::new();
        let base = fx.tree(&[("f", "x\n"), ("g", "g\n")]);
        let ours = fx.tree(&[("g", "g\n")]);
        let theirs = fx.tree(&[("f", "x2\n"), ("g", "g\n")]);

        let mut opts = quiet();
        crate::internal::begin(&mut opts).unwrap();
        opts.enter_nested();
        let merge = fx.merge(&mut opts, base, ours, theirs);
        crate::internal::finish(&mut opts);
        assert_eq!(fx.content(&merge, "f"), "x\n");
    }

    #[test]
    fn types_and_modes() {
        let fx = Fixture::new();
        let empty = fx.tree(&[]);
        let ours = fx.tree_with_modes(&[("n", EntryMode::Executable, "x\n")]);
        let theirs = fx.tree_with_modes(&[("n", EntryMode::Regular, "x\n")]);
        let merge = fx.merge(&mut quiet(), empty, ours, theirs);
        assert_eq!(kinds(&merge), vec![("n".to_string(), ConflictKind::ModeConflict)]);
        assert_eq!(merge.merged.get("n").unwrap().mode, EntryMode::Executable);

        let base = fx.tree_with_modes(&[("s", EntryMode::Regular, "a\n")]);
        let ours = fx.tree_with_modes(&[("s", EntryMode::Executable, "a\n")]);
        let theirs = fx.tree_with_modes(&[("s", EntryMode::Symlink, "target")]);
        let merge = fx.merge(&mut quiet(), base, ours, theirs);
        assert_eq!(kinds(&merge)[0].1, ConflictKind::TypeChange);
        assert_eq!(merge.merged.get("s").unwrap().mode, EntryMode::Executable);
        assert_eq!(merge.merged.get("s~MERGE_HEAD").unwrap().mode, EntryMode::Symlink);

        let base = fx.tree_with_modes(&[("s", EntryMode::Executable, "a\n")]);
        let ours = fx.tree_with_modes(&[("s", EntryMode::Regular, "b\n")]);
        let theirs = fx.tree_with_modes(&[("s", EntryMode::Executable, "c\n")]);
        let merge = fx.merge(&mut quiet(), base, ours, theirs);
        assert!(kinds(&merge).iter().all(|(_, k)| *k == ConflictKind::Content));
        assert_eq!(merge.merged.get("s").unwrap().mode, EntryMode::Regular);
    }

    #[test]
    fn file_in_the_way_of_directory_is_moved() {
        let fx = Fixture::new();
        let base = fx.tree(&[("p", "file\n")]);
        let ours = fx.tree(&[("p", "file changed\n")]);
        let theirs = fx.tree(&[("p/inner", "dir\n")]);

        let merge = fx.merge(&mut quiet(), base, ours, theirs);
        assert!(merge.merged.contains("p/inner"));
        assert_eq!(fx.content(&merge, "p~HEAD"), "file changed\n");
        assert!(kinds(&merge).contains(&("p~HEAD".to_string(), ConflictKind::DirectoryFile)));
        assert!(merge.conflicts.iter().all(|c| c.path != "p"));
    }

    // -----------------------------------------------------------------------
    // Renames
    // -----------------------------------------------------------------------

    #[test]
    fn rename_follows_modification() {
        let fx = Fixture::new();
        let edited = LINES.replace("eight", "EIGHT");
        let base = fx.tree(&[("a", LINES)]);
        let ours = fx.tree(&[("b", LINES)]);
        let theirs = fx.tree(&[("a", &edited)]);

        let merge = fx.merge(&mut quiet(), base, ours, theirs);
        assert!(merge.is_clean());
        assert!(!merge.merged.contains("a"));
        assert_eq!(fx.content(&merge, "b"), edited);
        assert_eq!(merge.renames.len(), 1);
    }

    #[test]
    fn same_rename_on_both_sides_is_clean() {
        let fx = Fixture::new();
        let base = fx.tree(&[("a", LINES)]);
        let ours = fx.tree(&[("b", &LINES.replace("one", "ONE"))]);
        let theirs = fx.tree(&[("b", &LINES.replace("eight", "EIGHT"))]);

        let merge = fx.merge(&mut quiet(), base, ours, theirs);
        assert!(merge.is_clean());
        assert_eq!(fx.content(&merge, "b"), LINES.replace("one", "ONE").replace("eight", "EIGHT"));
    }

    #[test]
    fn diverging_renames_keep_both() {
        let fx = Fixture::new();
        let base = fx.tree(&[("a", LINES)]);
        let ours = fx.tree(&[("b", LINES)]);
        let theirs = fx.tree(&[("c", LINES)]);

        let merge = fx.merge(&mut quiet(), base, ours, theirs);
        assert_eq!(
            kinds(&merge),
            vec![
                ("b".to_string(), ConflictKind::RenameRename),
                ("c".to_string(), ConflictKind::RenameRename)
            ]
        );
        assert!(merge.merged.contains("b") && merge.merged.contains("c"));
        assert!(!merge.merged.contains("a"));
        assert!(merge.stages["b"].theirs.is_none());
        assert!(merge.stages["c"].ours.is_none());
    }

    #[test]
    fn rename_delete_keeps_renamed_version() {
        let fx = Fixture::new();
        let base = fx.tree(&[("a", LINES), ("z", "z\n")]);
        let ours = fx.tree(&[("b", LINES), ("z", "z\n")]);
        let theirs = fx.tree(&[("z", "z\n")]);

        let merge = fx.merge(&mut quiet(), base, ours, theirs);
        assert_eq!(kinds(&merge), vec![("b".to_string(), ConflictKind::RenameDelete)]);
        assert_eq!(fx.content(&merge, "b"), LINES);
    }

    #[test]
    fn rename_onto_added_path_conflicts() {
        let fx = Fixture::new();
        let base = fx.tree(&[("a", LINES)]);
        let ours = fx.tree(&[("b", LINES)]);
        let theirs = fx.tree(&[("a", LINES), ("b", "unrelated\n")]);

        let merge = fx.merge(&mut quiet(), base, ours, theirs);
        assert_eq!(kinds(&merge), vec![("b".to_string(), ConflictKind::RenameAdd)]);
        assert!(!merge.merged.contains("a"));
        let text = fx.content(&merge, "b");
        assert!(text.contains("unrelated") && text.contains("<<<<<<<"));
    }

    #[test]
    fn two_renames_onto_one_destination_conflict() {
        let fx = Fixture::new();
        let other = "uno\ndos\ntres\ncuatro\ncinco\nseis\n";
        let base = fx.tree(&[("a", LINES), ("b", other)]);
        let ours = fx.tree(&[("d", LINES), ("b", other)]);
        let theirs = fx.tree(&[("a", LINES), ("d", other)]);

        let merge = fx.merge(&mut quiet(), base, ours, theirs);
        assert_eq!(kinds(&merge), vec![("d".to_string(), ConflictKind::RenameRename)]);
        assert!(!merge.merged.contains("a") && !merge.merged.contains("b"));
    }

    #[test]
    fn renames_off_leaves_delete_and_add() {
        let fx = Fixture::new();
        let edited = LINES.replace("eight", "EIGHT");
        let base = fx.tree(&[("a", LINES)]);
        let ours = fx.tree(&[("b", LINES)]);
        let theirs = fx.tree(&[("a", &edited)]);

        let mut opts = MergeOptions {
            detect_renames: false,
            ..quiet()
        };
        let merge = fx.merge(&mut opts, base, ours, theirs);
        assert_eq!(kinds(&merge), vec![("a".to_string(), ConflictKind::DeleteModify)]);
        assert!(merge.merged.contains("b"));
    }

    // -----------------------------------------------------------------------
    // Directory renames and subtree shift
    // -----------------------------------------------------------------------

    #[test]
    fn directory_rename_modes() {
        let fx = Fixture::new();
        let base = fx.tree(&[("dir/x.txt", LINES)]);
        let ours = fx.tree(&[("dir2/x.txt", LINES)]);
        let theirs = fx.tree(&[("dir/x.txt", LINES), ("dir/y.txt", "new\n")]);

        let mut apply = MergeOptions {
            detect_directory_renames: DirectoryRenames::Apply,
            ..quiet()
        };
        let merge = fx.merge(&mut apply, base, ours, theirs);
        assert!(merge.is_clean());
        assert!(merge.merged.contains("dir2/x.txt") && merge.merged.contains("dir2/y.txt"));

        let mut flag = quiet();
        let merge = fx.merge(&mut flag, base, ours, theirs);
        assert_eq!(kinds(&merge), vec![("dir2/y.txt".to_string(), ConflictKind::FileLocation)]);
        assert!(merge.stages["dir2/y.txt"].theirs.is_some());

        let mut off = MergeOptions {
            detect_directory_renames: DirectoryRenames::None,
            ..quiet()
        };
        let merge = fx.merge(&mut off, base, ours, theirs);
        assert_eq!(kinds(&merge), vec![("dir/y.txt".to_string(), ConflictKind::DirectoryRename)]);
        assert!(merge.merged.contains("dir/y.txt"));
    }

    #[test]
    fn subtree_shift_merges_into_prefix() {
        let fx = Fixture::new();
        let base = fx.tree(&[("lib.rs", "fn a() {}\n")]);
        let ours = fx.tree(&[("README", "top\n"), ("vendor/lib.rs", "fn a() {}\n")]);
        let theirs = fx.tree(&[("lib.rs", "fn b() {}\n")]);

        let mut opts = MergeOptions {
            subtree_shift: Some("vendor".into()),
            ..quiet()
        };
        let merge = fx.merge(&mut opts, base, ours, theirs);
        assert!(merge.is_clean());
        assert_eq!(fx.content(&merge, "vendor/lib.rs"), "fn b() {}\n");
        assert_eq!(fx.content(&merge, "README"), "top\n");
        assert!(!merge.merged.contains("lib.rs"));
    }
}

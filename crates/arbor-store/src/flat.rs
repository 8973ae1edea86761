//! Whole-tree view keyed by full path.
//!
//! Merging works path by path, so nested [`Tree`] objects are flattened into
//! a sorted `path -> (mode, id)` map of non-directory entries. Directories are
//! implied by the paths beneath them and are rebuilt on [`FlatTree::write`].

use std::collections::{BTreeMap, BTreeSet};

use arbor_types::ObjectId;
use tracing::trace;

use crate::error::{StoreError, StoreResult};
use crate::object::{EntryMode, Tree, TreeEntry};
use crate::traits::ObjectStore;

/// A single non-directory entry of a flattened tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FlatEntry {
    pub mode: EntryMode,
    pub id: ObjectId,
}

impl FlatEntry {
    pub fn new(mode: EntryMode, id: ObjectId) -> Self {
        Self { mode, id }
    }
}

/// A snapshot flattened to full slash-separated paths.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FlatTree {
    entries: BTreeMap<String, FlatEntry>,
}

impl FlatTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read `tree_id` and every subtree below it.
    pub fn load(store: &dyn ObjectStore, tree_id: &ObjectId) -> StoreResult<Self> {
        let mut flat = Self::new();
        flat.load_into(store, tree_id, "")?;
        trace!(tree = %tree_id.short_hex(), paths = flat.len(), "flattened tree");
        Ok(flat)
    }

    fn load_into(&mut self, store: &dyn ObjectStore, tree_id: &ObjectId, prefix: &str) -> StoreResult<()> {
        let tree = store.read_tree(tree_id)?;
        for entry in &tree.entries {
            let path = join(prefix, &entry.name);
            if entry.mode.is_directory() {
                self.load_into(store, &entry.object_id, &path)?;
            } else {
                self.entries.insert(path, FlatEntry::new(entry.mode, entry.object_id));
            }
        }
        Ok(())
    }

    /// Write the nested tree objects and return the root id.
    ///
    /// Fails with [`StoreError::InvalidPath`] when a path is also used as a
    /// directory by another entry, or contains an empty component.
    pub fn write(&self, store: &dyn ObjectStore) -> StoreResult<ObjectId> {
        let refs: Vec<(&str, &FlatEntry)> =
            self.entries.iter().map(|(p, e)| (p.as_str(), e)).collect();
        write_level(store, &refs)
    }

    pub fn get(&self, path: &str) -> Option<&FlatEntry> {
        self.entries.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    pub fn insert(&mut self, path: impl Into<String>, entry: FlatEntry) -> Option<FlatEntry> {
        self.entries.insert(path.into(), entry)
    }

    pub fn remove(&mut self, path: &str) -> Option<FlatEntry> {
        self.entries.remove(path)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FlatEntry)> {
        self.entries.iter()
    }

    pub fn paths(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether some entry lives below `dir`.
    pub fn has_directory(&self, dir: &str) -> bool {
        if dir.is_empty() {
            return !self.entries.is_empty();
        }
        let prefix = format!("{dir}/");
        self.entries
            .range(prefix.clone()..)
            .next()
            .is_some_and(|(p, _)| p.starts_with(&prefix))
    }

    /// Every directory implied by the stored paths (the root excluded).
    pub fn directories(&self) -> BTreeSet<String> {
        let mut dirs = BTreeSet::new();
        for path in self.entries.keys() {
            let mut rest = path.as_str();
            while let Some(pos) = rest.rfind('/') {
                rest = &rest[..pos];
                if !dirs.insert(rest.to_string()) {
                    break;
                }
            }
        }
        dirs
    }

    /// Entries below `prefix`, with the prefix stripped.
    pub fn subtree(&self, prefix: &str) -> FlatTree {
        let prefix = prefix.trim_matches('/');
        if prefix.is_empty() {
            return self.clone();
        }
        let lead = format!("{prefix}/");
        let entries = self
            .entries
            .iter()
            .filter_map(|(p, e)| p.strip_prefix(&lead).map(|rest| (rest.to_string(), *e)))
            .collect();
        FlatTree { entries }
    }

    /// Every entry moved below `prefix`.
    pub fn with_prefix(&self, prefix: &str) -> FlatTree {
        let prefix = prefix.trim_matches('/');
        if prefix.is_empty() {
            return self.clone();
        }
        let entries = self
            .entries
            .iter()
            .map(|(p, e)| (format!("{prefix}/{p}"), *e))
            .collect();
        FlatTree { entries }
    }
}

impl FromIterator<(String, FlatEntry)> for FlatTree {
    fn from_iter<I: IntoIterator<Item = (String, FlatEntry)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Parent directory of a slash-separated path; `""` for top-level paths.
pub fn parent_dir(path: &str) -> &str {
    path.rfind('/').map_or("", |pos| &path[..pos])
}

/// Last component of a slash-separated path.
pub fn file_name(path: &str) -> &str {
    path.rfind('/').map_or(path, |pos| &path[pos + 1..])
}

/// Join a directory and a name; an empty directory is the root.
pub fn join(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{dir}/{name}")
    }
}

fn write_level(store: &dyn ObjectStore, entries: &[(&str, &FlatEntry)]) -> StoreResult<ObjectId> {
    let mut files: BTreeMap<&str, &FlatEntry> = BTreeMap::new();
    let mut dirs: BTreeMap<&str, Vec<(&str, &FlatEntry)>> = BTreeMap::new();

    for &(path, entry) in entries {
        match path.split_once('/') {
            Some((dir, rest)) => {
                if dir.is_empty() || rest.is_empty() {
                    return Err(invalid(path, "empty path component"));
                }
                dirs.entry(dir).or_default().push((rest, entry));
            }
            None => {
                if path.is_empty() {
                    return Err(invalid(path, "empty path component"));
                }
                files.insert(path, entry);
            }
        }
    }

    let mut tree_entries = Vec::with_capacity(files.len() + dirs.len());
    for (name, sub) in &dirs {
        if files.contains_key(name) {
            return Err(invalid(name, "used as both a file and a directory"));
        }
        let sub_id = write_level(store, sub)?;
        tree_entries.push(TreeEntry::new(EntryMode::Directory, *name, sub_id));
    }
    for (name, entry) in files {
        tree_entries.push(TreeEntry::new(entry.mode, name, entry.id));
    }
    store.write_tree(&Tree::new(tree_entries))
}

fn invalid(path: &str, reason: &str) -> StoreError {
    StoreError::InvalidPath {
        path: path.to_string(),
        reason: reason.to_string(),
    }
}

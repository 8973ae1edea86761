//! Worktree sinks for merge results.
//!
//! A merge writes every resolved or conflicted path to a [`Worktree`] once
//! the whole tree has been merged. [`FsWorktree`] writes below a directory;
//! [`MemoryWorktree`] keeps files in memory for tests and embedding.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use arbor_store::EntryMode;
use tracing::trace;

use crate::error::{IndexError, IndexResult};

/// Destination for merged file content.
pub trait Worktree {
    /// Create or replace the file at `path`.
    fn write_file(&mut self, path: &str, content: &[u8], mode: EntryMode) -> IndexResult<()>;

    /// Remove the file at `path`. Removing a missing file is not an error.
    fn remove_file(&mut self, path: &str) -> IndexResult<()>;

    /// Current content of `path`, `None` when absent. A symlink reads as its
    /// target.
    fn read_file(&self, path: &str) -> IndexResult<Option<Vec<u8>>>;
}

/// Worktree rooted at a directory on disk.
#[derive(Debug, Clone)]
pub struct FsWorktree {
    root: PathBuf,
}

impl FsWorktree {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> IndexResult<PathBuf> {
        if path.is_empty() || path.starts_with('/') || path.split('/').any(|c| c.is_empty() || c == "..") {
            return Err(IndexError::InvalidPath(path.to_string()));
        }
        Ok(path.split('/').fold(self.root.clone(), |acc, c| acc.join(c)))
    }
}

impl Worktree for FsWorktree {
    fn write_file(&mut self, path: &str, content: &[u8], mode: EntryMode) -> IndexResult<()> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)?;
        }
        if full.is_dir() {
            fs::remove_dir_all(&full)?;
        } else if full.symlink_metadata().is_ok() {
            fs::remove_file(&full)?;
        }

        match mode {
            #[cfg(unix)]
            EntryMode::Symlink => {
                let target = String::from_utf8_lossy(content).into_owned();
                std::os::unix::fs::symlink(target, &full)?;
            }
            _ => {
                fs::write(&full, content)?;
                if mode == EntryMode::Executable {
                    make_executable(&full)?;
                }
            }
        }
        trace!(path, "worktree write");
        Ok(())
    }

    fn remove_file(&mut self, path: &str) -> IndexResult<()> {
        let full = self.resolve(path)?;
        match fs::remove_file(&full) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        }
        // Prune directories left empty.
        let mut dir = full.parent();
        while let Some(d) = dir {
            if d == self.root || fs::remove_dir(d).is_err() {
                break;
            }
            dir = d.parent();
        }
        trace!(path, "worktree remove");
        Ok(())
    }

    fn read_file(&self, path: &str) -> IndexResult<Option<Vec<u8>>> {
        let full = self.resolve(path)?;
        let meta = match full.symlink_metadata() {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if meta.file_type().is_symlink() {
            let target = fs::read_link(&full)?;
            return Ok(Some(target.to_string_lossy().into_owned().into_bytes()));
        }
        if meta.is_dir() {
            return Ok(None);
        }
        Ok(Some(fs::read(&full)?))
    }
}

#[cfg(unix)]
fn make_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

/// In-memory worktree.
///
/// `fail_after(n)` makes every write after the first `n` fail, which lets
/// callers exercise a worktree that breaks part way through an update.
#[derive(Debug, Default, Clone)]
pub struct MemoryWorktree {
    files: BTreeMap<String, (Vec<u8>, EntryMode)>,
    writes: usize,
    fail_after: Option<usize>,
}

impl MemoryWorktree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_after(writes: usize) -> Self {
        Self {
            fail_after: Some(writes),
            ..Self::default()
        }
    }

    pub fn get(&self, path: &str) -> Option<&[u8]> {
        self.files.get(path).map(|(content, _)| content.as_slice())
    }

    pub fn mode(&self, path: &str) -> Option<EntryMode> {
        self.files.get(path).map(|(_, mode)| *mode)
    }

    pub fn paths(&self) -> impl Iterator<Item = &String> {
        self.files.keys()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    fn check_budget(&mut self) -> IndexResult<()> {
        if self.fail_after.is_some_and(|limit| self.writes >= limit) {
            return Err(IndexError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "worktree write limit reached",
            )));
        }
        self.writes += 1;
        Ok(())
    }
}

impl Worktree for MemoryWorktree {
    fn write_file(&mut self, path: &str, content: &[u8], mode: EntryMode) -> IndexResult<()> {
        self.check_budget()?;
        self.files.insert(path.to_string(), (content.to_vec(), mode));
        Ok(())
    }

    fn remove_file(&mut self, path: &str) -> IndexResult<()> {
        self.check_budget()?;
        self.files.remove(path);
        Ok(())
    }

    fn read_file(&self, path: &str) -> IndexResult<Option<Vec<u8>>> {
        Ok(self.get(path).map(<[u8]>::to_vec))
    }
}

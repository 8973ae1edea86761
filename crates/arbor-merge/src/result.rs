//! Merge outcomes and conflict records.

use std::fmt;

use arbor_history::CommitRef;
use arbor_store::EntryMode;
use arbor_types::ObjectId;

use crate::error::MergeError;

/// One of the three trees taking part in a merge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Side {
    Base,
    Ours,
    Theirs,
}

impl Side {
    /// The other branch side. `Base` maps to itself.
    pub fn other(self) -> Self {
        match self {
            Self::Base => Self::Base,
            Self::Ours => Self::Theirs,
            Self::Theirs => Self::Ours,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Base => write!(f, "base"),
            Self::Ours => write!(f, "ours"),
            Self::Theirs => write!(f, "theirs"),
        }
    }
}

/// What went wrong at a conflicted path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConflictKind {
    /// Both sides changed the content differently.
    Content,
    /// Both sides added the path with different content.
    AddAdd,
    /// One side deleted what the other modified.
    DeleteModify,
    /// Both sides changed the file mode differently.
    ModeConflict,
    /// The same source was renamed to different destinations, or two sources
    /// were renamed onto one destination.
    RenameRename,
    /// One side renamed what the other deleted.
    RenameDelete,
    /// One side renamed onto a path the other side added.
    RenameAdd,
    /// A file and a directory claim the same path.
    DirectoryFile,
    /// A directory was renamed to several places with no clear winner.
    DirectoryRenameSplit,
    /// A directory rename was detected but not applied.
    DirectoryRename,
    /// A path was moved by a directory rename and needs confirmation.
    FileLocation,
    /// Binary content changed on both sides.
    Binary,
    /// The entry changed type (file vs symlink) on one side.
    TypeChange,
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Content => "content",
            Self::AddAdd => "add/add",
            Self::DeleteModify => "modify/delete",
            Self::ModeConflict => "mode",
            Self::RenameRename => "rename/rename",
            Self::RenameDelete => "rename/delete",
            Self::RenameAdd => "rename/add",
            Self::DirectoryFile => "file/directory",
            Self::DirectoryRenameSplit => "directory rename split",
            Self::DirectoryRename => "directory rename",
            Self::FileLocation => "file location",
            Self::Binary => "binary",
            Self::TypeChange => "distinct types",
        };
        f.write_str(name)
    }
}

/// One side's version of a conflicted path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Variant {
    /// Where the version lives in its own tree.
    pub path: String,
    pub mode: EntryMode,
    pub id: ObjectId,
}

/// An unresolved path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConflictEntry {
    pub path: String,
    pub kind: ConflictKind,
    pub base: Option<Variant>,
    pub ours: Option<Variant>,
    pub theirs: Option<Variant>,
    /// Human-readable description, as reported.
    pub message: String,
}

/// A rename detected on one side against the base.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenameMapping {
    pub side: Side,
    pub source: String,
    pub destination: String,
    /// Similarity in percent.
    pub score: u8,
}

/// Tri-state merge outcome.
#[derive(Debug)]
pub enum MergeStatus {
    Clean,
    Conflicted,
    Fatal(MergeError),
}

impl MergeStatus {
    /// `1` clean, `0` conflicted, `-1` fatal.
    pub fn code(&self) -> i32 {
        match self {
            Self::Clean => 1,
            Self::Conflicted => 0,
            Self::Fatal(_) => -1,
        }
    }

    pub fn is_clean(&self) -> bool {
        matches!(self, Self::Clean)
    }

    pub fn is_conflicted(&self) -> bool {
        matches!(self, Self::Conflicted)
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }

    pub fn error(&self) -> Option<&MergeError> {
        match self {
            Self::Fatal(e) => Some(e),
            _ => None,
        }
    }
}

/// Everything a merge entry point hands back.
#[derive(Debug)]
pub struct MergeResult {
    pub status: MergeStatus,
    /// Best-effort merged tree, conflict markers included. `None` when fatal.
    pub tree: Option<ObjectId>,
    /// Virtual commit carrying `tree` (recursive entry points only).
    pub commit: Option<CommitRef>,
    pub conflicts: Vec<ConflictEntry>,
    pub renames: Vec<RenameMapping>,
}

impl MergeResult {
    pub(crate) fn fatal(error: MergeError) -> Self {
        Self {
            status: MergeStatus::Fatal(error),
            tree: None,
            commit: None,
            conflicts: Vec::new(),
            renames: Vec::new(),
        }
    }

    pub fn code(&self) -> i32 {
        self.status.code()
    }

    pub fn is_clean(&self) -> bool {
        self.status.is_clean()
    }

    /// Conflicts recorded at `path`.
    pub fn conflicts_at<'a>(&'a self, path: &'a str) -> impl Iterator<Item = &'a ConflictEntry> + 'a {
        self.conflicts.iter().filter(move |c| c.path == path)
    }
}

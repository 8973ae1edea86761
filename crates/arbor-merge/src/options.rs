//! Merge configuration.
//!
//! [`MergeOptions`] is created once by the caller and reused across the
//! sub-merges of a recursive merge. Its `internal` slot holds the state of
//! the merge currently running with these options: it is installed at the
//! start of a top-level call and torn down exactly once when that call
//! returns, whatever the outcome.

use std::str::FromStr;
use std::sync::{Arc, Mutex};

use arbor_diff::{ConflictStyle, DiffAlgorithm, MergeVariant, WhitespaceFlags};
use serde::{Deserialize, Serialize};

use crate::error::OptionParseError;
use crate::internal::MergeInternal;

/// Environment variable overriding [`MergeOptions::verbosity`].
pub const VERBOSITY_ENV: &str = "ARBOR_MERGE_VERBOSITY";

/// Default rename similarity threshold, in percent.
pub const DEFAULT_RENAME_SCORE: u8 = 50;

/// Default rename pair budget (deleted × added paths per side).
pub const DEFAULT_RENAME_LIMIT: usize = 7000 * 7000;

/// Highest meaningful verbosity.
pub const MAX_VERBOSITY: u8 = 5;

/// What to do with paths added under a directory the other side renamed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DirectoryRenames {
    /// Leave new paths under the old directory name.
    None,
    /// Move them and record a conflict asking for confirmation.
    #[default]
    Conflict,
    /// Move them.
    Apply,
}

impl FromStr for DirectoryRenames {
    type Err = OptionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "false" | "none" | "no" => Ok(Self::None),
            "conflict" => Ok(Self::Conflict),
            "true" | "apply" | "yes" => Ok(Self::Apply),
            other => Err(OptionParseError::InvalidValue {
                option: "directory-renames".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

/// When merge messages are written.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BufferOutput {
    /// Write each message as it is produced.
    #[default]
    Immediate,
    /// Buffer, then write everything at the end of the top-level call.
    Flush,
    /// Buffer and hand the text to the caller via
    /// [`MergeOptions::take_output`].
    Keep,
}

/// Where merge messages are written.
#[derive(Clone, Debug, Default)]
pub enum OutputTarget {
    #[default]
    Stdout,
    Stderr,
    /// Append to a shared string.
    Shared(Arc<Mutex<String>>),
}

impl OutputTarget {
    /// A fresh shared buffer target and a handle to read it.
    pub fn shared() -> (Self, Arc<Mutex<String>>) {
        let buffer = Arc::new(Mutex::new(String::new()));
        (Self::Shared(Arc::clone(&buffer)), buffer)
    }
}

/// Settings for a merge.
#[derive(Debug)]
pub struct MergeOptions {
    /// Label for the common ancestor in conflict markers.
    pub ancestor: Option<String>,
    /// Label for our side.
    pub branch1: String,
    /// Label for their side.
    pub branch2: String,

    pub detect_renames: bool,
    /// Minimum similarity, in percent, for a rename pair.
    pub rename_score: u8,
    /// Pair budget per side; `0` means unlimited.
    pub rename_limit: usize,
    pub show_rename_progress: bool,
    pub detect_directory_renames: DirectoryRenames,

    pub variant: MergeVariant,
    pub whitespace: WhitespaceFlags,
    pub algorithm: DiffAlgorithm,
    pub conflict_style: ConflictStyle,
    pub renormalize: bool,

    /// Message level shown: 0 warnings only .. 5 everything.
    pub verbosity: u8,
    pub buffer_output: BufferOutput,
    pub output_target: OutputTarget,

    /// `None`: no shift. `Some("")`: detect the shift. `Some(prefix)`:
    /// shift by `prefix`.
    pub subtree_shift: Option<String>,

    /// Group conflict messages per path under a header at the end of the
    /// merge instead of emitting them inline.
    pub record_conflict_msgs_as_headers: bool,
    pub msg_header_prefix: String,

    /// State of the merge running with these options.
    pub(crate) internal: Option<MergeInternal>,
    /// Output kept for the caller in [`BufferOutput::Keep`] mode.
    pub(crate) kept_output: Option<String>,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            ancestor: None,
            branch1: "HEAD".to_string(),
            branch2: "MERGE_HEAD".to_string(),
            detect_renames: true,
            rename_score: DEFAULT_RENAME_SCORE,
            rename_limit: DEFAULT_RENAME_LIMIT,
            show_rename_progress: false,
            detect_directory_renames: DirectoryRenames::default(),
            variant: MergeVariant::Normal,
            whitespace: WhitespaceFlags::default(),
            algorithm: DiffAlgorithm::default(),
            conflict_style: ConflictStyle::default(),
            renormalize: false,
            verbosity: 2,
            buffer_output: BufferOutput::default(),
            output_target: OutputTarget::default(),
            subtree_shift: None,
            record_conflict_msgs_as_headers: false,
            msg_header_prefix: "Conflicts in".to_string(),
            internal: None,
            kept_output: None,
        }
    }
}

/// Duplicates the settings only. The copy starts with an empty internal slot
/// and no kept output, so it can run a merge of its own.
impl Clone for MergeOptions {
    fn clone(&self) -> Self {
        Self {
            ancestor: self.ancestor.clone(),
            branch1: self.branch1.clone(),
            branch2: self.branch2.clone(),
            detect_renames: self.detect_renames,
            rename_score: self.rename_score,
            rename_limit: self.rename_limit,
            show_rename_progress: self.show_rename_progress,
            detect_directory_renames: self.detect_directory_renames,
            variant: self.variant,
            whitespace: self.whitespace,
            algorithm: self.algorithm,
            conflict_style: self.conflict_style,
            renormalize: self.renormalize,
            verbosity: self.verbosity,
            buffer_output: self.buffer_output,
            output_target: self.output_target.clone(),
            subtree_shift: self.subtree_shift.clone(),
            record_conflict_msgs_as_headers: self.record_conflict_msgs_as_headers,
            msg_header_prefix: self.msg_header_prefix.clone(),
            internal: None,
            kept_output: None,
        }
    }
}

impl MergeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults with [`VERBOSITY_ENV`] applied when set to a valid level.
    pub fn from_env() -> Self {
        let mut opts = Self::default();
        if let Some(level) = std::env::var(VERBOSITY_ENV)
            .ok()
            .and_then(|v| parse_verbosity(&v))
        {
            opts.verbosity = level;
        }
        opts
    }

    /// Whether a merge currently owns the internal slot.
    pub fn in_use(&self) -> bool {
        self.internal.is_some()
    }

    /// Take the output kept by merges run in [`BufferOutput::Keep`] mode.
    /// The caller owns the text from here on.
    pub fn take_output(&mut self) -> Option<String> {
        self.kept_output.take()
    }
}

/// A verbosity level in `0..=5`.
pub(crate) fn parse_verbosity(value: &str) -> Option<u8> {
    value.trim().parse::<u8>().ok().filter(|v| *v <= MAX_VERBOSITY)
}

//! Per-merge working state kept in the options' internal slot.

use tracing::warn;

use crate::error::{MergeError, MergeFallible};
use crate::options::MergeOptions;
use crate::output::Reporter;

/// State owned by the merge currently running with a [`MergeOptions`].
#[derive(Debug)]
pub(crate) struct MergeInternal {
    pub(crate) reporter: Reporter,
    /// Nesting level: 0 for the top-level merge, +1 per virtual-base merge.
    pub(crate) call_depth: usize,
    /// Smallest rename limit that would have avoided a skipped detection.
    pub(crate) needed_rename_limit: usize,
}

impl MergeInternal {
    pub(crate) fn new(opts: &MergeOptions) -> Self {
        Self {
            reporter: Reporter::new(opts),
            call_depth: 0,
            needed_rename_limit: 0,
        }
    }
}

/// Install fresh state for a top-level merge.
pub(crate) fn begin(opts: &mut MergeOptions) -> MergeFallible<()> {
    if opts.internal.is_some() {
        return Err(MergeError::OptionsInUse);
    }
    opts.internal = Some(MergeInternal::new(opts));
    Ok(())
}

/// Tear down the state installed by [`begin`]: report a skipped rename
/// detection and flush or keep the buffered output.
pub(crate) fn finish(opts: &mut MergeOptions) {
    let Some(mut state) = opts.internal.take() else {
        return;
    };
    if state.needed_rename_limit > 0 {
        warn!(needed = state.needed_rename_limit, "rename detection skipped");
        state.reporter.output(
            0,
            0,
            &format!(
                "warning: inexact rename detection was skipped due to too many files.\n\
                 warning: you may want to set your rename limit to at least {} and retry the command.",
                state.needed_rename_limit
            ),
        );
    }
    if let Some(text) = state.reporter.finish() {
        opts.kept_output.get_or_insert_with(String::new).push_str(&text);
    }
}

impl MergeOptions {
    pub(crate) fn call_depth(&self) -> usize {
        self.internal.as_ref().map_or(0, |s| s.call_depth)
    }

    pub(crate) fn enter_nested(&mut self) {
        if let Some(state) = self.internal.as_mut() {
            state.call_depth += 1;
        }
    }

    pub(crate) fn leave_nested(&mut self) {
        if let Some(state) = self.internal.as_mut() {
            state.call_depth = state.call_depth.saturating_sub(1);
        }
    }

    /// Report `msg` at `level`. Dropped when no merge is running.
    pub(crate) fn output(&mut self, level: u8, msg: impl AsRef<str>) {
        if let Some(state) = self.internal.as_mut() {
            state.reporter.output(state.call_depth, level, msg.as_ref());
        }
    }

    pub(crate) fn conflict_msg(&mut self, path: &str, msg: impl AsRef<str>) {
        if let Some(state) = self.internal.as_mut() {
            state.reporter.conflict(state.call_depth, path, msg.as_ref());
        }
    }

    pub(crate) fn note_rename_limit(&mut self, needed: usize) {
        if let Some(state) = self.internal.as_mut() {
            state.needed_rename_limit = state.needed_rename_limit.max(needed);
        }
    }
}

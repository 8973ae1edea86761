//! Merge message reporting.
//!
//! Messages carry a level: 0 warnings (always shown), 1 conflicts,
//! 2 auto-merge notes, 3 progress, 4 "Merging:" headers and 5 ancestor
//! lists. A message is shown when its level is at most the configured
//! verbosity. Nested merges indent their messages by two spaces per level.

use std::collections::BTreeMap;
use std::io::Write;
use std::sync::PoisonError;

use tracing::debug;

use crate::options::{BufferOutput, MergeOptions, OutputTarget};

/// Message sink for one top-level merge.
#[derive(Debug)]
pub(crate) struct Reporter {
    verbosity: u8,
    mode: BufferOutput,
    target: OutputTarget,
    headers: bool,
    header_prefix: String,
    buffer: String,
    /// Conflict messages per path, in header mode.
    grouped: BTreeMap<String, Vec<String>>,
}

impl Reporter {
    pub(crate) fn new(opts: &MergeOptions) -> Self {
        Self {
            verbosity: opts.verbosity,
            mode: opts.buffer_output,
            target: opts.output_target.clone(),
            headers: opts.record_conflict_msgs_as_headers,
            header_prefix: opts.msg_header_prefix.clone(),
            buffer: String::new(),
            grouped: BTreeMap::new(),
        }
    }

    fn shows(&self, level: u8) -> bool {
        level == 0 || level <= self.verbosity
    }

    pub(crate) fn output(&mut self, depth: usize, level: u8, msg: &str) {
        debug!(level, depth, "{msg}");
        if !self.shows(level) {
            return;
        }
        let indent = " ".repeat(depth * 2);
        let mut text = String::with_capacity(msg.len() + indent.len() + 1);
        for line in msg.lines() {
            text.push_str(&indent);
            text.push_str(line);
            text.push('\n');
        }
        self.emit(&text);
    }

    /// A conflict message about `path` (level 1).
    pub(crate) fn conflict(&mut self, depth: usize, path: &str, msg: &str) {
        if self.headers {
            debug!(path, depth, "{msg}");
            if self.shows(1) {
                self.grouped.entry(path.to_string()).or_default().push(msg.to_string());
            }
            return;
        }
        self.output(depth, 1, msg);
    }

    fn emit(&mut self, text: &str) {
        match self.mode {
            BufferOutput::Immediate => write_to(&self.target, text),
            BufferOutput::Flush | BufferOutput::Keep => self.buffer.push_str(text),
        }
    }

    /// Emit grouped headers and release the buffer. Returns the text the
    /// caller must keep in [`BufferOutput::Keep`] mode.
    pub(crate) fn finish(mut self) -> Option<String> {
        let grouped = std::mem::take(&mut self.grouped);
        for (path, messages) in grouped {
            let mut block = format!("{} {path}\n", self.header_prefix);
            for message in messages {
                for line in message.lines() {
                    block.push_str("  ");
                    block.push_str(line);
                    block.push('\n');
                }
            }
            self.emit(&block);
        }

        match self.mode {
            BufferOutput::Immediate => None,
            BufferOutput::Flush => {
                write_to(&self.target, &self.buffer);
                None
            }
            BufferOutput::Keep => Some(self.buffer),
        }
    }
}

fn write_to(target: &OutputTarget, text: &str) {
    if text.is_empty() {
        return;
    }
    match target {
        // A closed stdout or stderr must not fail the merge.
        OutputTarget::Stdout => {
            let _ = std::io::stdout().lock().write_all(text.as_bytes());
        }
        OutputTarget::Stderr => {
            let _ = std::io::stderr().lock().write_all(text.as_bytes());
        }
        OutputTarget::Shared(buffer) => buffer.lock().unwrap_or_else(PoisonError::into_inner).push_str(text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn reporter(mode: BufferOutput, verbosity: u8) -> (Reporter, Arc<Mutex<String>>) {
        let (target, buffer) = OutputTarget::shared();
        let opts = MergeOptions {
            buffer_output: mode,
            verbosity,
            output_target: target,
            ..MergeOptions::default()
        };
        (Reporter::new(&opts), buffer)
    }

    #[test]
    fn immediate_writes_as_generated() {
        let (mut r, buffer) = reporter(BufferOutput::Immediate, 2);
        r.output(0, 2, "Auto-merging a.txt");
        assert_eq!(buffer.lock().unwrap().as_str(), "Auto-merging a.txt\n");
        assert_eq!(r.finish(), None);
    }

    #[test]
    fn levels_above_verbosity_are_dropped() {
        let (mut r, buffer) = reporter(BufferOutput::Immediate, 1);
        r.output(0, 2, "hidden");
        r.output(0, 0, "warning: shown");
        assert_eq!(buffer.lock().unwrap().as_str(), "warning: shown\n");
    }

    #[test]
    fn nested_messages_are_indented() {
        let (mut r, buffer) = reporter(BufferOutput::Immediate, 5);
        r.output(2, 3, "one\ntwo");
        assert_eq!(buffer.lock().unwrap().as_str(), "    one\n    two\n");
    }

    #[test]
    fn flush_writes_at_finish() {
        let (mut r, buffer) = reporter(BufferOutput::Flush, 2);
        r.output(0, 1, "CONFLICT (content): Merge conflict in a");
        assert!(buffer.lock().unwrap().is_empty());
        assert_eq!(r.finish(), None);
        assert_eq!(
            buffer.lock().unwrap().as_str(),
            "CONFLICT (content): Merge conflict in a\n"
        );
    }

    #[test]
    fn keep_hands_buffer_back() {
        let (mut r, buffer) = reporter(BufferOutput::Keep, 2);
        r.output(0, 2, "note");
        assert_eq!(r.finish().as_deref(), Some("note\n"));
        assert!(buffer.lock().unwrap().is_empty());
    }

    #[test]
    fn poisoned_shared_buffer_still_receives_output() {
        let (target, buffer) = OutputTarget::shared();
        let holder = Arc::clone(&buffer);
        let _ = std::thread::spawn(move || {
            let _guard = holder.lock().unwrap();
            panic!("writer died");
        })
        .join();
        assert!(buffer.is_poisoned());

        write_to(&target, "Auto-merging a.txt\n");
        let text = buffer.lock().unwrap_or_else(PoisonError::into_inner).clone();
        assert_eq!(text, "Auto-merging a.txt\n");
    }

    #[test]
    fn header_mode_groups_by_path() {
        let (target, _buffer) = OutputTarget::shared();
        let opts = MergeOptions {
            buffer_output: BufferOutput::Keep,
            record_conflict_msgs_as_headers: true,
            output_target: target,
            ..MergeOptions::default()
        };
        let mut r = Reporter::new(&opts);
        r.conflict(0, "b.txt", "CONFLICT (content): Merge conflict in b.txt");
        r.conflict(0, "a.txt", "CONFLICT (add/add): Merge conflict in a.txt");
        r.output(0, 2, "Auto-merging c.txt");

        let text = r.finish().unwrap();
        assert_eq!(
            text,
            "Auto-merging c.txt\n\
             Conflicts in a.txt\n  CONFLICT (add/add): Merge conflict in a.txt\n\
             Conflicts in b.txt\n  CONFLICT (content): Merge conflict in b.txt\n"
        );
    }
}

//! Line-level three-way content merge.
//!
//! Each side is diffed against the base into hunks (base range replaced by a
//! side range). Hunks from the two sides are grouped into clusters: a cluster
//! holds hunks whose base ranges overlap, insertions at the same point, or an
//! insertion strictly inside a changed range. Changes on neighbouring lines
//! land in separate clusters and merge cleanly. A cluster touched by one side
//! takes that side; a cluster touched by both takes either side when the two
//! replacements agree and is a conflict otherwise.

use std::borrow::Cow;
use std::ops::Range;

use serde::{Deserialize, Serialize};
use similar::{capture_diff_slices, Algorithm, DiffTag};
use tracing::trace;

/// Marker length at the top level; nested merges add two per level.
pub const DEFAULT_MARKER_SIZE: usize = 7;

/// Bytes inspected when sniffing for binary content.
const BINARY_SNIFF_LEN: usize = 8000;

/// How conflicting hunks are resolved.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeVariant {
    /// Write conflict markers.
    #[default]
    Normal,
    /// Take our side of every conflicting hunk.
    Ours,
    /// Take their side of every conflicting hunk.
    Theirs,
}

/// Layout of a conflict block.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictStyle {
    /// Ours and theirs only; lines common to both are moved out of the block.
    #[default]
    Merge,
    /// Ours, base (after `|||||||`) and theirs.
    Diff3,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffAlgorithm {
    #[default]
    Myers,
    Patience,
}

impl DiffAlgorithm {
    fn algorithm(self) -> Algorithm {
        match self {
            Self::Myers => Algorithm::Myers,
            Self::Patience => Algorithm::Patience,
        }
    }
}

/// Whitespace differences to disregard when comparing lines.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WhitespaceFlags {
    pub ignore_space_change: bool,
    pub ignore_all_space: bool,
    pub ignore_space_at_eol: bool,
    pub ignore_cr_at_eol: bool,
}

impl WhitespaceFlags {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Comparison key of one line (terminator included).
    fn key(&self, line: &[u8]) -> Vec<u8> {
        let (mut body, newline) = match line.strip_suffix(b"\n") {
            Some(body) => (body, true),
            None => (line, false),
        };
        if self.ignore_cr_at_eol {
            if let Some(stripped) = body.strip_suffix(b"\r") {
                body = stripped;
            }
        }

        let mut key: Vec<u8> = if self.ignore_all_space {
            body.iter().copied().filter(|b| !b.is_ascii_whitespace()).collect()
        } else if self.ignore_space_change {
            let mut collapsed = Vec::with_capacity(body.len());
            let mut in_space = false;
            for &b in trim_end(body) {
                if b.is_ascii_whitespace() {
                    if !in_space {
                        collapsed.push(b' ');
                    }
                    in_space = true;
                } else {
                    collapsed.push(b);
                    in_space = false;
                }
            }
            collapsed
        } else if self.ignore_space_at_eol {
            trim_end(body).to_vec()
        } else {
            body.to_vec()
        };

        if newline {
            key.push(b'\n');
        }
        key
    }
}

fn trim_end(mut data: &[u8]) -> &[u8] {
    while let [rest @ .., last] = data {
        if !last.is_ascii_whitespace() {
            break;
        }
        data = rest;
    }
    data
}

/// Settings for one content merge.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MergeFileOptions {
    /// Label after `|||||||` in diff3 style.
    pub ancestor_label: Option<String>,
    /// Label after `<<<<<<<`.
    pub ours_label: Option<String>,
    /// Label after `>>>>>>>`.
    pub theirs_label: Option<String>,
    pub variant: MergeVariant,
    pub style: ConflictStyle,
    pub algorithm: DiffAlgorithm,
    pub whitespace: WhitespaceFlags,
    /// Convert CRLF to LF in all three inputs before merging.
    pub renormalize: bool,
    /// Recursion depth of the surrounding tree merge; zero at the top level.
    pub call_depth: usize,
}

impl MergeFileOptions {
    pub fn marker_size(&self) -> usize {
        DEFAULT_MARKER_SIZE + 2 * self.call_depth
    }
}

/// Result of [`merge_blobs`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MergeFileOutcome {
    /// Merged bytes, conflict markers included.
    pub content: Vec<u8>,
    /// Number of unresolved conflict blocks (1 for an unresolved binary merge).
    pub conflicts: usize,
    /// At least one input was binary and no line merge was attempted.
    pub binary: bool,
}

impl MergeFileOutcome {
    pub fn is_clean(&self) -> bool {
        self.conflicts == 0
    }

    fn clean(content: &[u8]) -> Self {
        Self {
            content: content.to_vec(),
            conflicts: 0,
            binary: false,
        }
    }
}

/// Whether `data` looks binary (a NUL byte near the start).
pub fn is_binary(data: &[u8]) -> bool {
    data.iter().take(BINARY_SNIFF_LEN).any(|&b| b == 0)
}

/// Merge `ours` and `theirs` against `base`.
pub fn merge_blobs(
    base: &[u8],
    ours: &[u8],
    theirs: &[u8],
    opts: &MergeFileOptions,
) -> MergeFileOutcome {
    let (base, ours, theirs) = if opts.renormalize {
        (crlf_to_lf(base), crlf_to_lf(ours), crlf_to_lf(theirs))
    } else {
        (Cow::Borrowed(base), Cow::Borrowed(ours), Cow::Borrowed(theirs))
    };

    if ours == theirs || base == theirs {
        return MergeFileOutcome::clean(&ours);
    }
    if base == ours {
        return MergeFileOutcome::clean(&theirs);
    }
    if is_binary(&base) || is_binary(&ours) || is_binary(&theirs) {
        return merge_binary(&base, &ours, &theirs, opts);
    }

    LineMerge::new(&base, &ours, &theirs, opts).run()
}

fn merge_binary(base: &[u8], ours: &[u8], theirs: &[u8], opts: &MergeFileOptions) -> MergeFileOutcome {
    let (content, conflicts) = match opts.variant {
        MergeVariant::Ours => (ours, 0),
        MergeVariant::Theirs => (theirs, 0),
        MergeVariant::Normal if opts.call_depth > 0 => (base, 1),
        MergeVariant::Normal => (ours, 1),
    };
    MergeFileOutcome {
        content: content.to_vec(),
        conflicts,
        binary: true,
    }
}

fn crlf_to_lf(data: &[u8]) -> Cow<'_, [u8]> {
    if !data.windows(2).any(|w| w == b"\r\n") {
        return Cow::Borrowed(data);
    }
    let mut out = Vec::with_capacity(data.len());
    let mut iter = data.iter().peekable();
    while let Some(&b) = iter.next() {
        if b == b'\r' && iter.peek() == Some(&&b'\n') {
            continue;
        }
        out.push(b);
    }
    Cow::Owned(out)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Side {
    Ours,
    Theirs,
}

/// One side's replacement of `base` lines by `side` lines.
#[derive(Clone, Debug)]
struct Hunk {
    side: Side,
    base: Range<usize>,
    other: Range<usize>,
}

/// Hunks of both sides that must be resolved together.
#[derive(Debug)]
struct Cluster {
    base: Range<usize>,
    ours_delta: isize,
    theirs_delta: isize,
    ours: bool,
    theirs: bool,
}

impl Cluster {
    fn new(hunk: &Hunk) -> Self {
        let mut cluster = Self {
            base: hunk.base.clone(),
            ours_delta: 0,
            theirs_delta: 0,
            ours: false,
            theirs: false,
        };
        cluster.add(hunk);
        cluster
    }

    fn absorbs(&self, hunk: &Hunk) -> bool {
        let Range { start, end } = self.base;
        if start == end {
            hunk.base.start == start && hunk.base.end == start
        } else if hunk.base.is_empty() {
            hunk.base.start > start && hunk.base.start < end
        } else {
            hunk.base.start < end
        }
    }

    fn add(&mut self, hunk: &Hunk) {
        self.base.start = self.base.start.min(hunk.base.start);
        self.base.end = self.base.end.max(hunk.base.end);
        let delta = hunk.other.len() as isize - hunk.base.len() as isize;
        match hunk.side {
            Side::Ours => {
                self.ours_delta += delta;
                self.ours = true;
            }
            Side::Theirs => {
                self.theirs_delta += delta;
                self.theirs = true;
            }
        }
    }
}

struct LineMerge<'a> {
    opts: &'a MergeFileOptions,
    base: Vec<&'a [u8]>,
    ours: Vec<&'a [u8]>,
    theirs: Vec<&'a [u8]>,
    base_keys: Vec<Vec<u8>>,
    ours_keys: Vec<Vec<u8>>,
    theirs_keys: Vec<Vec<u8>>,
    out: Vec<u8>,
    conflicts: usize,
}

impl<'a> LineMerge<'a> {
    fn new(base: &'a [u8], ours: &'a [u8], theirs: &'a [u8], opts: &'a MergeFileOptions) -> Self {
        let base = split_lines(base);
        let ours = split_lines(ours);
        let theirs = split_lines(theirs);
        let keys = |lines: &[&[u8]]| -> Vec<Vec<u8>> {
            lines.iter().map(|l| opts.whitespace.key(l)).collect()
        };
        Self {
            opts,
            base_keys: keys(&base),
            ours_keys: keys(&ours),
            theirs_keys: keys(&theirs),
            base,
            ours,
            theirs,
            out: Vec::new(),
            conflicts: 0,
        }
    }

    fn run(mut self) -> MergeFileOutcome {
        let algorithm = self.opts.algorithm.algorithm();
        let mut hunks = side_hunks(algorithm, &self.base_keys, &self.ours_keys, Side::Ours);
        hunks.extend(side_hunks(algorithm, &self.base_keys, &self.theirs_keys, Side::Theirs));
        let clusters = cluster_hunks(hunks);
        trace!(clusters = clusters.len(), "three-way line merge");

        let (mut b, mut o, mut t) = (0usize, 0usize, 0usize);
        for cluster in &clusters {
            let gap = cluster.base.start - b;
            self.emit_ours(o..o + gap);
            o += gap;
            t += gap;

            let base_len = cluster.base.len() as isize;
            let o_end = (o as isize + base_len + cluster.ours_delta) as usize;
            let t_end = (t as isize + base_len + cluster.theirs_delta) as usize;

            match (cluster.ours, cluster.theirs) {
                (true, false) => self.emit_ours(o..o_end),
                (false, true) => self.emit_theirs(t..t_end),
                _ if self.ours_keys[o..o_end] == self.theirs_keys[t..t_end] => {
                    self.emit_ours(o..o_end)
                }
                _ => self.resolve_conflict(cluster.base.clone(), o..o_end, t..t_end),
            }

            b = cluster.base.end;
            o = o_end;
            t = t_end;
        }
        self.emit_ours(o..self.ours.len());

        MergeFileOutcome {
            content: self.out,
            conflicts: self.conflicts,
            binary: false,
        }
    }

    fn emit_ours(&mut self, range: Range<usize>) {
        for line in &self.ours[range] {
            self.out.extend_from_slice(line);
        }
    }

    fn emit_theirs(&mut self, range: Range<usize>) {
        for line in &self.theirs[range] {
            self.out.extend_from_slice(line);
        }
    }

    fn resolve_conflict(&mut self, base: Range<usize>, ours: Range<usize>, theirs: Range<usize>) {
        match self.opts.variant {
            MergeVariant::Ours => return self.emit_ours(ours),
            MergeVariant::Theirs => return self.emit_theirs(theirs),
            MergeVariant::Normal => {}
        }
        self.conflicts += 1;

        let (mut ours, mut theirs) = (ours, theirs);
        let mut trailing = 0..0;
        if self.opts.style == ConflictStyle::Merge {
            let prefix = self.ours_keys[ours.clone()]
                .iter()
                .zip(&self.theirs_keys[theirs.clone()])
                .take_while(|(a, b)| a == b)
                .count();
            self.emit_ours(ours.start..ours.start + prefix);
            ours.start += prefix;
            theirs.start += prefix;

            let suffix = self.ours_keys[ours.clone()]
                .iter()
                .rev()
                .zip(self.theirs_keys[theirs.clone()].iter().rev())
                .take_while(|(a, b)| a == b)
                .count();
            trailing = ours.end - suffix..ours.end;
            ours.end -= suffix;
            theirs.end -= suffix;
        }

        let size = self.opts.marker_size();
        let opts = self.opts;
        self.marker(b'<', size, opts.ours_label.as_deref());
        for i in ours {
            let line = self.ours[i];
            self.conflict_line(line);
        }
        if opts.style == ConflictStyle::Diff3 {
            self.marker(b'|', size, opts.ancestor_label.as_deref());
            for i in base {
                let line = self.base[i];
                self.conflict_line(line);
            }
        }
        self.marker(b'=', size, None);
        for i in theirs {
            let line = self.theirs[i];
            self.conflict_line(line);
        }
        self.marker(b'>', size, opts.theirs_label.as_deref());
        self.emit_ours(trailing);
    }

    fn marker(&mut self, ch: u8, size: usize, label: Option<&str>) {
        self.out.extend(std::iter::repeat(ch).take(size));
        if let Some(label) = label.filter(|l| !l.is_empty()) {
            self.out.push(b' ');
            self.out.extend_from_slice(label.as_bytes());
        }
        self.out.push(b'\n');
    }

    /// Lines inside a conflict block always end with a newline so the next
    /// marker starts on its own line.
    fn conflict_line(&mut self, line: &[u8]) {
        self.out.extend_from_slice(line);
        if !line.ends_with(b"\n") {
            self.out.push(b'\n');
        }
    }
}

fn split_lines(data: &[u8]) -> Vec<&[u8]> {
    data.split_inclusive(|&b| b == b'\n').collect()
}

fn side_hunks(algorithm: Algorithm, base: &[Vec<u8>], side: &[Vec<u8>], which: Side) -> Vec<Hunk> {
    let mut hunks = Vec::new();
    let mut pending: Option<Hunk> = None;
    for op in capture_diff_slices(algorithm, base, side) {
        let (tag, old, new) = op.as_tag_tuple();
        if tag == DiffTag::Equal {
            hunks.extend(pending.take());
            continue;
        }
        match pending.as_mut() {
            Some(hunk) => {
                hunk.base.end = old.end;
                hunk.other.end = new.end;
            }
            None => {
                pending = Some(Hunk {
                    side: which,
                    base: old,
                    other: new,
                })
            }
        }
    }
    hunks.extend(pending);
    hunks
}

fn cluster_hunks(mut hunks: Vec<Hunk>) -> Vec<Cluster> {
    hunks.sort_by_key(|h| (h.base.start, h.base.end, h.side));
    let mut clusters: Vec<Cluster> = Vec::new();
    for hunk in &hunks {
        match clusters.last_mut() {
            Some(last) if last.absorbs(hunk) => last.add(hunk),
            _ => clusters.push(Cluster::new(hunk)),
        }
    }
    clusters
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labelled() -> MergeFileOptions {
        MergeFileOptions {
            ancestor_label: Some("base".into()),
            ours_label: Some("ours".into()),
            theirs_label: Some("theirs".into()),
            ..Default::default()
        }
    }

    fn merge(base: &str, ours: &str, theirs: &str, opts: &MergeFileOptions) -> (String, usize) {
        let outcome = merge_blobs(base.as_bytes(), ours.as_bytes(), theirs.as_bytes(), opts);
        (String::from_utf8(outcome.content).unwrap(), outcome.conflicts)
    }

    #[test]
    fn adjacent_line_changes_merge_cleanly() {
        let (out, conflicts) = merge("A\nB\nC\n", "A\nB1\nC\n", "A\nB\nC1\n", &labelled());
        assert_eq!(conflicts, 0);
        assert_eq!(out, "A\nB1\nC1\n");
    }

    #[test]
    fn separate_changes_merge_cleanly() {
        let base = "1\n2\n3\n4\n5\n";
        let (out, conflicts) = merge(base, "one\n2\n3\n4\n5\n", "1\n2\n3\n4\nfive\n", &labelled());
        assert_eq!(conflicts, 0);
        assert_eq!(out, "one\n2\n3\n4\nfive\n");
    }

    #[test]
    fn identical_change_is_clean() {
        let (out, conflicts) = merge("a\nb\nc\n", "a\nX\nc\n", "a\nX\nc\n", &labelled());
        assert_eq!(conflicts, 0);
        assert_eq!(out, "a\nX\nc\n");
    }

    #[test]
    fn same_hunk_changes_conflict() {
        let (out, conflicts) = merge("a\nb\nc\n", "a\nours\nc\n", "a\ntheirs\nc\n", &labelled());
        assert_eq!(conflicts, 1);
        assert_eq!(
            out,
            "a\n<<<<<<< ours\nours\n=======\ntheirs\n>>>>>>> theirs\nc\n"
        );
    }

    #[test]
    fn diff3_style_includes_base() {
        let opts = MergeFileOptions {
            style: ConflictStyle::Diff3,
            ..labelled()
        };
        let (out, _) = merge("a\nb\nc\n", "a\nours\nc\n", "a\ntheirs\nc\n", &opts);
        assert_eq!(
            out,
            "a\n<<<<<<< ours\nours\n||||||| base\nb\n=======\ntheirs\n>>>>>>> theirs\nc\n"
        );
    }

    #[test]
    fn common_lines_are_hoisted_out_of_markers() {
        let (out, conflicts) = merge(
            "x\n",
            "same\nours\nend\n",
            "same\ntheirs\nend\n",
            &labelled(),
        );
        assert_eq!(conflicts, 1);
        assert_eq!(
            out,
            "same\n<<<<<<< ours\nours\n=======\ntheirs\n>>>>>>> theirs\nend\n"
        );
    }

    #[test]
    fn bias_resolves_conflicts() {
        let ours_bias = MergeFileOptions {
            variant: MergeVariant::Ours,
            ..labelled()
        };
        let theirs_bias = MergeFileOptions {
            variant: MergeVariant::Theirs,
            ..labelled()
        };
        let base = "a\nb\nc\nd\n";
        let ours = "a\nB-ours\nc\nd\n";
        let theirs = "a\nB-theirs\nc\nD\n";
        assert_eq!(merge(base, ours, theirs, &ours_bias), ("a\nB-ours\nc\nD\n".into(), 0));
        assert_eq!(merge(base, ours, theirs, &theirs_bias), ("a\nB-theirs\nc\nD\n".into(), 0));
    }

    #[test]
    fn insertions_at_same_point_conflict() {
        let (out, conflicts) = merge("a\nb\n", "a\nx\nb\n", "a\ny\nb\n", &labelled());
        assert_eq!(conflicts, 1);
        assert!(out.starts_with("a\n<<<<<<<"));
        assert!(out.ends_with(">>>>>>> theirs\nb\n"));
    }

    #[test]
    fn nested_depth_widens_markers() {
        let opts = MergeFileOptions {
            call_depth: 1,
            ..labelled()
        };
        let (out, _) = merge("a\n", "b\n", "c\n", &opts);
        assert!(out.starts_with("<<<<<<<<< ours\n"));
        assert!(out.contains("\n=========\n"));
    }

    #[test]
    fn missing_final_newline_inside_conflict() {
        let (out, conflicts) = merge("a", "b", "c", &labelled());
        assert_eq!(conflicts, 1);
        assert_eq!(out, "<<<<<<< ours\nb\n=======\nc\n>>>>>>> theirs\n");
    }

    #[test]
    fn whitespace_only_change_is_ignored() {
        let opts = MergeFileOptions {
            whitespace: WhitespaceFlags {
                ignore_space_change: true,
                ..Default::default()
            },
            ..labelled()
        };
        let (out, conflicts) = merge("a b\nc\n", "a  b\nc\n", "a b\nC\n", &opts);
        assert_eq!(conflicts, 0);
        assert_eq!(out, "a  b\nC\n");
    }

    #[test]
    fn whitespace_keys() {
        let all = WhitespaceFlags { ignore_all_space: true, ..Default::default() };
        assert_eq!(all.key(b" a\tb \n"), b"ab\n");
        let eol = WhitespaceFlags { ignore_space_at_eol: true, ..Default::default() };
        assert_eq!(eol.key(b"a b  \n"), b"a b\n");
        let cr = WhitespaceFlags { ignore_cr_at_eol: true, ..Default::default() };
        assert_eq!(cr.key(b"a\r\n"), b"a\n");
        assert!(WhitespaceFlags::default().is_empty());
    }

    #[test]
    fn renormalize_hides_line_ending_churn() {
        let opts = MergeFileOptions {
            renormalize: true,
            ..labelled()
        };
        let (out, conflicts) = merge("a\nb\n", "a\r\nb\r\n", "a\nB\n", &opts);
        assert_eq!(conflicts, 0);
        assert_eq!(out, "a\nB\n");
    }

    #[test]
    fn binary_content_is_not_line_merged() {
        let base = b"\0base";
        let ours = b"\0ours";
        let theirs = b"\0theirs";

        let normal = merge_blobs(base, ours, theirs, &labelled());
        assert!(normal.binary);
        assert_eq!(normal.conflicts, 1);
        assert_eq!(normal.content, ours);

        let inner = MergeFileOptions { call_depth: 2, ..labelled() };
        assert_eq!(merge_blobs(base, ours, theirs, &inner).content, base);

        let theirs_bias = MergeFileOptions { variant: MergeVariant::Theirs, ..labelled() };
        let resolved = merge_blobs(base, ours, theirs, &theirs_bias);
        assert!(resolved.is_clean());
        assert_eq!(resolved.content, theirs);
    }

    #[test]
    fn one_sided_binary_change_is_clean() {
        let outcome = merge_blobs(b"\0a", b"\0a", b"\0b", &labelled());
        assert!(outcome.is_clean());
        assert_eq!(outcome.content, b"\0b");
    }

    #[test]
    fn patience_algorithm_merges() {
        let opts = MergeFileOptions {
            algorithm: DiffAlgorithm::Patience,
            ..labelled()
        };
        let (out, conflicts) = merge("A\nB\nC\n", "A\nB1\nC\n", "A\nB\nC1\n", &opts);
        assert_eq!(conflicts, 0);
        assert_eq!(out, "A\nB1\nC1\n");
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn text() -> impl Strategy<Value = String> {
            proptest::collection::vec("[a-c]{0,2}\n", 0..8).prop_map(|lines| lines.concat())
        }

        proptest! {
            #[test]
            fn one_sided_change_takes_that_side(base in text(), side in text()) {
                let opts = MergeFileOptions::default();
                let outcome = merge_blobs(base.as_bytes(), side.as_bytes(), base.as_bytes(), &opts);
                prop_assert!(outcome.is_clean());
                prop_assert_eq!(outcome.content, side.as_bytes());
            }

            #[test]
            fn biased_merge_never_conflicts(base in text(), ours in text(), theirs in text()) {
                let opts = MergeFileOptions { variant: MergeVariant::Ours, ..Default::default() };
                let outcome = merge_blobs(base.as_bytes(), ours.as_bytes(), theirs.as_bytes(), &opts);
                prop_assert!(outcome.is_clean());
            }

            #[test]
            fn normal_merge_is_symmetric_in_conflict_count(
                base in text(), ours in text(), theirs in text()
            ) {
                let opts = MergeFileOptions::default();
                let forward = merge_blobs(base.as_bytes(), ours.as_bytes(), theirs.as_bytes(), &opts);
                let backward = merge_blobs(base.as_bytes(), theirs.as_bytes(), ours.as_bytes(), &opts);
                prop_assert_eq!(forward.conflicts, backward.conflicts);
            }
        }
    }
}

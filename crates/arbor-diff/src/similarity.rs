//! Content similarity used to pair deleted and added paths.

use similar::{capture_diff_slices, Algorithm, DiffTag};

/// Percent (0..=100) of content shared between `old` and `new`.
///
/// Counts the bytes of lines `new` keeps from `old` and divides by the size
/// of the larger blob, so a small file copied into a much larger one does
/// not score as a near-identical rename. Identical input scores 100.
pub fn similarity(old: &[u8], new: &[u8]) -> u8 {
    if old == new {
        return 100;
    }
    if old.is_empty() || new.is_empty() {
        return 0;
    }

    let old_lines: Vec<&[u8]> = old.split_inclusive(|&b| b == b'\n').collect();
    let new_lines: Vec<&[u8]> = new.split_inclusive(|&b| b == b'\n').collect();

    let copied: usize = capture_diff_slices(Algorithm::Myers, &old_lines, &new_lines)
        .iter()
        .map(|op| op.as_tag_tuple())
        .filter(|(tag, _, _)| *tag == DiffTag::Equal)
        .map(|(_, old_range, _)| old_lines[old_range].iter().map(|l| l.len()).sum::<usize>())
        .sum();

    let largest = old.len().max(new.len());
    // Only identical input may score 100.
    ((copied * 100) / largest).min(99) as u8
}

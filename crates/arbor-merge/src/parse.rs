//! Single-string merge options (`-X` style).

use arbor_diff::{ConflictStyle, DiffAlgorithm, MergeVariant};

use crate::error::OptionParseError;
use crate::options::{parse_verbosity, DirectoryRenames, MergeOptions};

/// Apply one option string to `opts`.
///
/// Accepted: `ours`, `theirs`, `subtree[=<path>]`, `patience`,
/// `diff-algorithm=<myers|patience>`, `ignore-space-change`,
/// `ignore-all-space`, `ignore-space-at-eol`, `ignore-cr-at-eol`,
/// `renormalize`, `no-renormalize`, `no-renames`, `find-renames[=<n>]`,
/// `rename-threshold=<n>`, `rename-limit=<n>`,
/// `directory-renames[=<false|conflict|true>]`, `no-directory-renames`,
/// `conflict-style=<merge|diff3>` and `verbosity=<n>`. Scores take `N` or
/// `N%`.
pub fn parse_merge_opt(opts: &mut MergeOptions, s: &str) -> Result<(), OptionParseError> {
    let (name, value) = match s.split_once('=') {
        Some((name, value)) => (name, Some(value)),
        None => (s, None),
    };

    match (name, value) {
        ("ours", None) => opts.variant = MergeVariant::Ours,
        ("theirs", None) => opts.variant = MergeVariant::Theirs,
        ("subtree", None) => opts.subtree_shift = Some(String::new()),
        ("subtree", Some(path)) => opts.subtree_shift = Some(path.trim_matches('/').to_string()),
        ("patience", None) => opts.algorithm = DiffAlgorithm::Patience,
        ("diff-algorithm", Some(v)) => {
            opts.algorithm = match v {
                "myers" | "default" => DiffAlgorithm::Myers,
                "patience" => DiffAlgorithm::Patience,
                _ => return Err(invalid(name, v)),
            }
        }
        ("ignore-space-change", None) => opts.whitespace.ignore_space_change = true,
        ("ignore-all-space", None) => opts.whitespace.ignore_all_space = true,
        ("ignore-space-at-eol", None) => opts.whitespace.ignore_space_at_eol = true,
        ("ignore-cr-at-eol", None) => opts.whitespace.ignore_cr_at_eol = true,
        ("renormalize", None) => opts.renormalize = true,
        ("no-renormalize", None) => opts.renormalize = false,
        ("no-renames", None) => opts.detect_renames = false,
        ("find-renames", None) => opts.detect_renames = true,
        ("find-renames" | "rename-threshold", Some(v)) => {
            opts.rename_score = parse_score(v).ok_or_else(|| invalid(name, v))?;
            opts.detect_renames = true;
        }
        ("rename-limit", Some(v)) => {
            opts.rename_limit = v.parse().map_err(|_| invalid(name, v))?;
        }
        ("directory-renames", None) => opts.detect_directory_renames = DirectoryRenames::Apply,
        ("directory-renames", Some(v)) => opts.detect_directory_renames = v.parse()?,
        ("no-directory-renames", None) => opts.detect_directory_renames = DirectoryRenames::None,
        ("conflict-style", Some(v)) => {
            opts.conflict_style = match v {
                "merge" => ConflictStyle::Merge,
                "diff3" => ConflictStyle::Diff3,
                _ => return Err(invalid(name, v)),
            }
        }
        ("verbosity", Some(v)) => {
            opts.verbosity = parse_verbosity(v).ok_or_else(|| invalid(name, v))?;
        }
        _ => return Err(OptionParseError::Unknown(s.to_string())),
    }
    Ok(())
}

/// A similarity score: `N` or `N%` with `N` in `0..=100`.
pub(crate) fn parse_score(value: &str) -> Option<u8> {
    let digits = value.strip_suffix('%').unwrap_or(value);
    digits.parse::<u8>().ok().filter(|v| *v <= 100)
}

fn invalid(option: &str, value: &str) -> OptionParseError {
    OptionParseError::InvalidValue {
        option: option.to_string(),
        value: value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parsed(options: &[&str]) -> MergeOptions {
        let mut opts = MergeOptions::default();
        for o in options {
            parse_merge_opt(&mut opts, o).unwrap();
        }
        opts
    }

    #[test]
    fn bias_options() {
        assert_eq!(parsed(&["ours"]).variant, MergeVariant::Ours);
        assert_eq!(parsed(&["theirs"]).variant, MergeVariant::Theirs);
    }

    #[test]
    fn rename_options() {
        let opts = parsed(&["no-renames"]);
        assert!(!opts.detect_renames);

        let opts = parsed(&["no-renames", "find-renames=70%"]);
        assert!(opts.detect_renames);
        assert_eq!(opts.rename_score, 70);

        assert_eq!(parsed(&["rename-threshold=30"]).rename_score, 30);
        assert_eq!(parsed(&["rename-limit=100"]).rename_limit, 100);
    }

    #[test]
    fn whitespace_and_algorithm() {
        let opts = parsed(&["ignore-space-change", "ignore-cr-at-eol", "patience"]);
        assert!(opts.whitespace.ignore_space_change);
        assert!(opts.whitespace.ignore_cr_at_eol);
        assert!(!opts.whitespace.ignore_all_space);
        assert_eq!(opts.algorithm, DiffAlgorithm::Patience);
        assert_eq!(parsed(&["patience", "diff-algorithm=myers"]).algorithm, DiffAlgorithm::Myers);
    }

    #[test]
    fn subtree_and_directory_renames() {
        assert_eq!(parsed(&["subtree"]).subtree_shift.as_deref(), Some(""));
        assert_eq!(parsed(&["subtree=lib/vendor/"]).subtree_shift.as_deref(), Some("lib/vendor"));
        assert_eq!(parsed(&["directory-renames"]).detect_directory_renames, DirectoryRenames::Apply);
        assert_eq!(
            parsed(&["directory-renames=false"]).detect_directory_renames,
            DirectoryRenames::None
        );
        assert_eq!(
            parsed(&["no-directory-renames"]).detect_directory_renames,
            DirectoryRenames::None
        );
    }

    #[test]
    fn style_renormalize_verbosity() {
        let opts = parsed(&["conflict-style=diff3", "renormalize", "verbosity=4"]);
        assert_eq!(opts.conflict_style, ConflictStyle::Diff3);
        assert!(opts.renormalize);
        assert_eq!(opts.verbosity, 4);
        assert!(!parsed(&["renormalize", "no-renormalize"]).renormalize);
    }

    #[test]
    fn rejects_unknown_and_bad_values() {
        let mut opts = MergeOptions::default();
        assert_eq!(
            parse_merge_opt(&mut opts, "octopus"),
            Err(OptionParseError::Unknown("octopus".into()))
        );
        assert!(matches!(
            parse_merge_opt(&mut opts, "find-renames=150"),
            Err(OptionParseError::InvalidValue { .. })
        ));
        assert!(parse_merge_opt(&mut opts, "ours=1").is_err());
        assert!(parse_merge_opt(&mut opts, "conflict-style=zdiff3").is_err());
        assert!(parse_merge_opt(&mut opts, "verbosity=9").is_err());
        let err = parse_merge_opt(&mut opts, "diff-algorithm=histogram").unwrap_err();
        assert!(err.to_string().contains("histogram"));
    }

    #[test]
    fn scores() {
        assert_eq!(parse_score("50"), Some(50));
        assert_eq!(parse_score("75%"), Some(75));
        assert_eq!(parse_score("101"), None);
        assert_eq!(parse_score("x%"), None);
    }
}

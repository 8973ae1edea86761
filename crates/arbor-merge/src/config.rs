//! `[merge]` table of a TOML configuration file.
//!
//! ```toml
//! [merge]
//! renames = true
//! rename_score = "60%"
//! rename_limit = 1000
//! directory_renames = "conflict"
//! conflict_style = "diff3"
//! diff_algorithm = "patience"
//! verbosity = 3
//! ```

use std::path::Path;

use arbor_diff::{ConflictStyle, DiffAlgorithm};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, OptionParseError};
use crate::options::{DirectoryRenames, MergeOptions, MAX_VERBOSITY};
use crate::parse::parse_score;

/// A flag that is either a boolean or one of a few words.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BoolOrString {
    Bool(bool),
    Text(String),
}

/// A score given as a number or as `"N%"`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Score {
    Number(u8),
    Text(String),
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MergeConfig {
    pub renames: Option<bool>,
    pub rename_score: Option<Score>,
    pub rename_limit: Option<usize>,
    pub directory_renames: Option<BoolOrString>,
    pub conflict_style: Option<ConflictStyle>,
    pub diff_algorithm: Option<DiffAlgorithm>,
    pub verbosity: Option<u8>,
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    merge: MergeConfig,
}

impl MergeConfig {
    /// Parse the `[merge]` table of a TOML document. Other tables are
    /// ignored; a missing table yields an empty config.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(text)?;
        Ok(file.merge)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Write every configured key into `opts`.
    pub fn apply(&self, opts: &mut MergeOptions) -> Result<(), OptionParseError> {
        if let Some(renames) = self.renames {
            opts.detect_renames = renames;
        }
        if let Some(score) = &self.rename_score {
            opts.rename_score = match score {
                Score::Number(n) if *n <= 100 => *n,
                Score::Number(n) => return Err(invalid("rename_score", &n.to_string())),
                Score::Text(text) => parse_score(text).ok_or_else(|| invalid("rename_score", text))?,
            };
        }
        if let Some(limit) = self.rename_limit {
            opts.rename_limit = limit;
        }
        if let Some(dirs) = &self.directory_renames {
            opts.detect_directory_renames = match dirs {
                BoolOrString::Bool(true) => DirectoryRenames::Apply,
                BoolOrString::Bool(false) => DirectoryRenames::None,
                BoolOrString::Text(text) => text.parse()?,
            };
        }
        if let Some(style) = self.conflict_style {
            opts.conflict_style = style;
        }
        if let Some(algorithm) = self.diff_algorithm {
            opts.algorithm = algorithm;
        }
        if let Some(verbosity) = self.verbosity {
            if verbosity > MAX_VERBOSITY {
                return Err(invalid("verbosity", &verbosity.to_string()));
            }
            opts.verbosity = verbosity;
        }
        Ok(())
    }
}

fn invalid(option: &str, value: &str) -> OptionParseError {
    OptionParseError::InvalidValue {
        option: option.to_string(),
        value: value.to_string(),
    }
}

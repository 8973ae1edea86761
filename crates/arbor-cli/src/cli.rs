use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "arbor",
    about = "Arbor: rename-aware recursive tree merging",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Log debug events to stderr (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Merge two directory trees against their merge bases
    MergeTrees(MergeTreesArgs),
    /// Merge three versions of one file
    MergeFile(MergeFileArgs),
}

#[derive(Args)]
pub struct MergeTreesArgs {
    /// Merge-base directory; repeat for several bases, oldest first
    #[arg(long)]
    pub base: Vec<PathBuf>,
    #[arg(long)]
    pub ours: PathBuf,
    #[arg(long)]
    pub theirs: PathBuf,
    /// Strategy option such as `theirs`, `find-renames=60%` or `directory-renames=true`
    #[arg(short = 'X', long = "strategy-option")]
    pub strategy_options: Vec<String>,
    /// TOML file with a `[merge]` table
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Directory that receives our tree and is then brought to the merge result
    #[arg(long)]
    pub out: Option<PathBuf>,
    /// Where to write the merged index
    #[arg(long)]
    pub index: Option<PathBuf>,
    #[arg(long)]
    pub label_ours: Option<String>,
    #[arg(long)]
    pub label_theirs: Option<String>,
}

#[derive(Args)]
pub struct MergeFileArgs {
    pub base: PathBuf,
    pub ours: PathBuf,
    pub theirs: PathBuf,
    #[arg(short = 'X', long = "strategy-option")]
    pub strategy_options: Vec<String>,
    /// Write the result to stdout instead of OURS
    #[arg(short = 'p', long)]
    pub stdout: bool,
    /// Conflict marker labels: ours, base, theirs
    #[arg(short = 'L', long = "label", num_args = 1, action = clap::ArgAction::Append)]
    pub labels: Vec<String>,
}

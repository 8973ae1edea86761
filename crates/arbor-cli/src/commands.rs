use std::fs;
use std::io::Write;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use arbor_diff::{merge_blobs, MergeFileOptions};
use arbor_index::{FsWorktree, Worktree};
use arbor_merge::{
    merge_recursive_generic, parse_merge_opt, MergeConfig, MergeOptions, MergeResult, MergeStatus, Repo,
};
use arbor_store::{EntryMode, FlatEntry, FlatTree, InMemoryObjectStore, ObjectStore};
use arbor_types::ObjectId;
use colored::Colorize;
use tracing::debug;
use walkdir::WalkDir;

use crate::cli::*;

/// Exit status for a clean merge, a conflicted one and a failed one.
const EXIT_CLEAN: u8 = 0;
const EXIT_CONFLICTED: u8 = 1;
const EXIT_FATAL: u8 = 2;

pub fn run_command(cli: Cli) -> anyhow::Result<ExitCode> {
    match cli.command {
        Command::MergeTrees(args) => cmd_merge_trees(args),
        Command::MergeFile(args) => cmd_merge_file(args),
    }
}

fn cmd_merge_trees(args: MergeTreesArgs) -> anyhow::Result<ExitCode> {
    let mut opts = MergeOptions::from_env();
    if let Some(path) = &args.config {
        let config = MergeConfig::load(path).with_context(|| format!("loading {}", path.display()))?;
        config.apply(&mut opts)?;
    }
    for option in &args.strategy_options {
        parse_merge_opt(&mut opts, option)?;
    }
    if let Some(label) = args.label_ours {
        opts.branch1 = label;
    }
    if let Some(label) = args.label_theirs {
        opts.branch2 = label;
    }

    let store = Arc::new(InMemoryObjectStore::new());
    let ours = import_dir(&*store, &args.ours)?;
    let theirs = import_dir(&*store, &args.theirs)?;
    let bases = args
        .base
        .iter()
        .map(|dir| import_dir(&*store, dir))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let mut repo = Repo::new(Arc::clone(&store) as Arc<dyn ObjectStore>);
    if let Some(out) = &args.out {
        let mut worktree = FsWorktree::new(out);
        let flat = FlatTree::load(&*store, &ours)?;
        for (path, entry) in flat.iter() {
            worktree.write_file(path, &store.read_blob(&entry.id)?, entry.mode)?;
        }
        repo = repo.with_worktree(Box::new(worktree));
    }
    if let Some(index) = &args.index {
        repo = repo.with_index_file(index);
    }

    let result = merge_recursive_generic(&mut opts, &mut repo, &ours, &theirs, &bases);
    print_summary(&result);
    Ok(ExitCode::from(match result.status {
        MergeStatus::Clean => EXIT_CLEAN,
        MergeStatus::Conflicted => EXIT_CONFLICTED,
        MergeStatus::Fatal(_) => EXIT_FATAL,
    }))
}

fn print_summary(result: &MergeResult) {
    for rename in &result.renames {
        println!(
            "  {} {} -> {} ({}, {}%)",
            "renamed:".cyan(),
            rename.source,
            rename.destination,
            rename.side,
            rename.score
        );
    }
    for conflict in &result.conflicts {
        println!("  {} {}", format!("CONFLICT ({}):", conflict.kind).red(), conflict.path);
    }
    match &result.status {
        MergeStatus::Clean => println!(
            "{} Merged cleanly into tree {}",
            "✓".green().bold(),
            short(result.tree).yellow()
        ),
        MergeStatus::Conflicted => println!(
            "{} Merge left {} conflict(s) in tree {}",
            "!".yellow().bold(),
            result.conflicts.len(),
            short(result.tree).yellow()
        ),
        MergeStatus::Fatal(e) => eprintln!("{} {e}", "fatal:".red().bold()),
    }
}

fn short(tree: Option<ObjectId>) -> String {
    tree.map(|id| id.short_hex()).unwrap_or_default()
}

/// Store every file below `dir` and return the tree that holds them.
fn import_dir(store: &dyn ObjectStore, dir: &Path) -> anyhow::Result<ObjectId> {
    let mut flat = FlatTree::new();
    for entry in WalkDir::new(dir).follow_links(false).sort_by_file_name() {
        let entry = entry.with_context(|| format!("walking {}", dir.display()))?;
        if entry.file_type().is_dir() {
            continue;
        }
        let relative = entry.path().strip_prefix(dir)?;
        let path = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        let (mode, content) = if entry.file_type().is_symlink() {
            let target = fs::read_link(entry.path())?;
            (EntryMode::Symlink, target.to_string_lossy().into_owned().into_bytes())
        } else {
            let mode = if is_executable(&entry.metadata()?) {
                EntryMode::Executable
            } else {
                EntryMode::Regular
            };
            (mode, fs::read(entry.path()).with_context(|| format!("reading {}", entry.path().display()))?)
        };
        flat.insert(path, FlatEntry::new(mode, store.write_blob(&content)?));
    }
    let tree = flat.write(store)?;
    debug!(dir = %dir.display(), files = flat.len(), tree = %tree.short_hex(), "directory imported");
    Ok(tree)
}

#[cfg(unix)]
fn is_executable(metadata: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_metadata: &fs::Metadata) -> bool {
    false
}

fn cmd_merge_file(args: MergeFileArgs) -> anyhow::Result<ExitCode> {
    let mut opts = MergeOptions::from_env();
    for option in &args.strategy_options {
        parse_merge_opt(&mut opts, option)?;
    }

    let read = |path: &Path| fs::read(path).with_context(|| format!("reading {}", path.display()));
    let base = read(&args.base)?;
    let ours = read(&args.ours)?;
    let theirs = read(&args.theirs)?;

    let label = |i: usize, path: &Path| {
        args.labels
            .get(i)
            .cloned()
            .unwrap_or_else(|| path.display().to_string())
    };
    let file_opts = MergeFileOptions {
        ours_label: Some(label(0, &args.ours)),
        ancestor_label: Some(label(1, &args.base)),
        theirs_label: Some(label(2, &args.theirs)),
        variant: opts.variant,
        style: opts.conflict_style,
        algorithm: opts.algorithm,
        whitespace: opts.whitespace,
        renormalize: opts.renormalize,
        ..MergeFileOptions::default()
    };

    let outcome = merge_blobs(&base, &ours, &theirs, &file_opts);
    if outcome.binary && !outcome.is_clean() {
        eprintln!("{} Cannot merge binary files: {}", "warning:".yellow(), args.ours.display());
    }
    if args.stdout {
        std::io::stdout().lock().write_all(&outcome.content)?;
    } else {
        fs::write(&args.ours, &outcome.content).with_context(|| format!("writing {}", args.ours.display()))?;
    }

    if outcome.is_clean() {
        Ok(ExitCode::from(EXIT_CLEAN))
    } else {
        eprintln!("{} {} conflict(s)", "!".yellow().bold(), outcome.conflicts);
        Ok(ExitCode::from(EXIT_CONFLICTED))
    }
}

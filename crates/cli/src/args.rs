//! `clap`-derive argument definitions for the four subcommands, plus the
//! glue that turns a `scan` invocation's include/exclude/prune flags into a
//! [`filters::RuleSet`] in command-line order.

use std::path::PathBuf;

use clap::{ArgMatches, Args, Parser, Subcommand};
use filters::{Action, Rule, RuleSet, Scope};

/// Disk usage analyzer indexed by last-access time.
#[derive(Parser, Debug)]
#[command(name = "agedu", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// The four top-level operations.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scan a directory tree and build an index file.
    Scan(ScanArgs),
    /// Report the size of files under a path older than a cutoff.
    Query(QueryArgs),
    /// Emit an index file's contents as a text dump on stdout.
    Dump(DumpArgs),
    /// Build an index file from a text dump.
    Load(LoadArgs),
}

/// Arguments for `agedu scan`.
#[derive(Args, Debug)]
pub struct ScanArgs {
    /// Directory tree to scan.
    pub path: PathBuf,

    /// Where to write the index file.
    #[arg(short, long, default_value = "agedu.dat", value_name = "FILE")]
    pub out: PathBuf,

    /// Include entries whose file name matches PATTERN.
    #[arg(long, value_name = "PATTERN")]
    pub include: Vec<String>,
    /// Include entries whose full relative path matches PATTERN.
    #[arg(long, value_name = "PATTERN")]
    pub include_path: Vec<String>,
    /// Exclude entries whose file name matches PATTERN (directories still recurse, sized as zero).
    #[arg(long, value_name = "PATTERN")]
    pub exclude: Vec<String>,
    /// Exclude entries whose full relative path matches PATTERN.
    #[arg(long, value_name = "PATTERN")]
    pub exclude_path: Vec<String>,
    /// Prune entries whose file name matches PATTERN (directories are not recursed into).
    #[arg(long, value_name = "PATTERN")]
    pub prune: Vec<String>,
    /// Prune entries whose full relative path matches PATTERN.
    #[arg(long, value_name = "PATTERN")]
    pub prune_path: Vec<String>,

    /// Allow the scan to cross filesystem boundaries.
    #[arg(long)]
    pub cross_fs: bool,
    /// Use mtime only when computing an entry's effective age, ignoring atime.
    #[arg(long)]
    pub mtime: bool,
}

/// Arguments for `agedu query`.
#[derive(Args, Debug)]
pub struct QueryArgs {
    /// Index file produced by `agedu scan` or `agedu load`.
    pub index_file: PathBuf,
    /// Path to report on, relative to the root the index was built from
    /// (the root itself is the empty path, written as `.`).
    pub path: PathBuf,
    /// Only count files older than this, e.g. `30d`, `6m`, `1y`.
    #[arg(long, value_name = "DURATION")]
    pub age: Option<String>,
}

/// Arguments for `agedu dump`.
#[derive(Args, Debug)]
pub struct DumpArgs {
    /// Index file to dump.
    pub index_file: PathBuf,
}

/// Arguments for `agedu load`.
#[derive(Args, Debug)]
pub struct LoadArgs {
    /// Text dump file to load.
    pub dump_file: PathBuf,
    /// Where to write the rebuilt index file.
    #[arg(short, long, default_value = "agedu.dat", value_name = "FILE")]
    pub out: PathBuf,
}

/// Build a [`RuleSet`] from `args`'s six rule-pattern fields, applying them
/// in the order their flags appeared on the command line (not grouped by
/// flag), since [`RuleSet::evaluate`] is last-match-wins and that order is
/// observable whenever two patterns overlap.
#[must_use]
pub fn build_ruleset(args: &ScanArgs, sub_matches: &ArgMatches) -> RuleSet {
    let groups: [(&str, Scope, Action, &[String]); 6] = [
        ("include", Scope::FileName, Action::Include, &args.include),
        (
            "include_path",
            Scope::FullPath,
            Action::Include,
            &args.include_path,
        ),
        ("exclude", Scope::FileName, Action::Exclude, &args.exclude),
        (
            "exclude_path",
            Scope::FullPath,
            Action::Exclude,
            &args.exclude_path,
        ),
        ("prune", Scope::FileName, Action::Prune, &args.prune),
        (
            "prune_path",
            Scope::FullPath,
            Action::Prune,
            &args.prune_path,
        ),
    ];

    let mut tagged: Vec<(usize, Scope, Action, &str)> = Vec::new();
    for (id, scope, action, patterns) in groups {
        if let Some(indices) = sub_matches.indices_of(id) {
            for (index, pattern) in indices.zip(patterns) {
                tagged.push((index, scope, action, pattern.as_str()));
            }
        }
    }
    tagged.sort_by_key(|(index, ..)| *index);

    let mut rules = RuleSet::new();
    for (_, scope, action, pattern) in tagged {
        match Rule::new(pattern, scope, action) {
            Ok(rule) => rules.push(rule),
            Err(err) => {
                tracing::warn!(pattern, error = %err, "ignoring invalid rule pattern");
            }
        }
    }
    rules
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn rule_flags_are_applied_in_command_line_order() {
        let matches = Cli::command()
            .try_get_matches_from([
                "agedu",
                "scan",
                ".",
                "--exclude",
                "*",
                "--include",
                "keep.txt",
            ])
            .unwrap();
        let sub = matches.subcommand_matches("scan").unwrap();
        let args = ScanArgs {
            path: PathBuf::from("."),
            out: PathBuf::from("agedu.dat"),
            include: vec!["keep.txt".to_string()],
            include_path: vec![],
            exclude: vec!["*".to_string()],
            exclude_path: vec![],
            prune: vec![],
            prune_path: vec![],
            cross_fs: false,
            mtime: false,
        };
        let rules = build_ruleset(&args, sub);
        assert_eq!(rules.evaluate("keep.txt", "keep.txt"), Action::Include);
        assert_eq!(rules.evaluate("other.txt", "other.txt"), Action::Exclude);
    }
}

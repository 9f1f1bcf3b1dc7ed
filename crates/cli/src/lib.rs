//! # Overview
//!
//! Thin command-line front end over the `core` crate: four subcommands
//! (`scan`, `query`, `dump`, `load`) that each parse their flags with
//! `clap`'s derive API and delegate to `core::build_index`/`core::QueryIndex`/
//! `core::dump`.
//!
//! # Design
//!
//! [`run`] accepts an argument iterator and output/error writers, mirroring
//! the teacher's injectable `run`/`run_with` shape, so the binary crate stays
//! a two-line wrapper and the subcommands stay testable without touching
//! real stdio.
//!
//! # Invariants
//!
//! - `run` never panics on user input; argument and build errors are
//!   reported on `stderr` and surfaced as a non-zero [`std::process::ExitCode`].
//! - Include/exclude/prune flags are applied in the order they appeared on
//!   the command line, regardless of which of the three flags each came
//!   from, matching [`filters::RuleSet`]'s last-match-wins contract.
//!
//! # Errors
//!
//! Parse failures and `core`/`filters` errors are both rendered to `stderr`
//! and mapped to exit code 1; there is no richer exit-code taxonomy since the
//! program has exactly one failure mode a script would care about.
//!
//! # Examples
//!
//! ```no_run
//! use std::io;
//!
//! let mut stdout = io::stdout();
//! let mut stderr = io::stderr();
//! let code = cli::run(["agedu", "scan", "."], &mut stdout, &mut stderr);
//! std::process::exit(code);
//! ```
//!
//! # See also
//!
//! `core` for the pipeline and query facade this crate drives, and `filters`
//! for the rule evaluation semantics the include/exclude/prune flags select.

mod age;
mod args;

use std::ffi::OsString;
use std::io::Write;

use clap::{CommandFactory, FromArgMatches};

pub use args::{Cli, Commands, DumpArgs, LoadArgs, QueryArgs, ScanArgs};

use core::{BuildOptions, QueryIndex};

/// Parse `args` and run the selected subcommand, writing to `stdout`/`stderr`.
///
/// Returns a process exit code: `0` on success, `1` on any reported error.
pub fn run<I, T>(args: I, stdout: &mut impl Write, stderr: &mut impl Write) -> i32
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(
            |_| tracing_subscriber::EnvFilter::new("agedu=info"),
        ))
        .with_writer(std::io::stderr)
        .try_init()
        .ok();

    let command = Cli::command();
    let matches = match command.try_get_matches_from(args) {
        Ok(m) => m,
        Err(err) => {
            if err.use_stderr() {
                let _ = write!(stderr, "{err}");
                return 1;
            }
            let _ = write!(stdout, "{err}");
            return 0;
        }
    };
    let cli = match Cli::from_arg_matches(&matches) {
        Ok(c) => c,
        Err(err) => {
            let _ = writeln!(stderr, "{err}");
            return 1;
        }
    };

    let sub_matches = matches.subcommand().map(|(_, m)| m);

    match (&cli.command, sub_matches) {
        (Commands::Scan(scan_args), Some(sub)) => run_scan(scan_args, sub, stderr),
        (Commands::Query(query_args), _) => run_query(query_args, stdout, stderr),
        (Commands::Dump(dump_args), _) => run_dump(dump_args, stdout, stderr),
        (Commands::Load(load_args), _) => run_load(load_args, stderr),
        _ => unreachable!("clap guarantees a subcommand's own matches are present"),
    }
}

fn run_scan(args: &ScanArgs, sub_matches: &clap::ArgMatches, stderr: &mut impl Write) -> i32 {
    let rules = args::build_ruleset(args, sub_matches);
    let options = BuildOptions {
        cross_filesystem: args.cross_fs,
        atime_policy: if args.mtime {
            metadata::AtimePolicy::MtimeOnly
        } else {
            metadata::AtimePolicy::MaxAtimeMtime
        },
        rules,
        pathsep: b'/',
    };

    match core::build_index(&args.path, options, &args.out) {
        Ok(()) => 0,
        Err(err) => {
            let _ = writeln!(stderr, "agedu scan: {err}");
            1
        }
    }
}

fn run_query(args: &QueryArgs, stdout: &mut impl Write, stderr: &mut impl Write) -> i32 {
    let index = match QueryIndex::open(&args.index_file) {
        Ok(index) => index,
        Err(err) => {
            let _ = writeln!(stderr, "agedu query: {err}");
            return 1;
        }
    };

    let cutoff = match &args.age {
        Some(spec) => match age::parse_age(age::now(), spec) {
            Ok(cutoff) => cutoff,
            Err(err) => {
                let _ = writeln!(stderr, "agedu query: {err}");
                return 1;
            }
        },
        None => u64::MAX,
    };

    let prefix = if args.path == std::path::Path::new(".") {
        Vec::new()
    } else {
        core::path_to_bytes(&args.path)
    };
    let size = index.size_under(&prefix, cutoff);
    let _ = writeln!(stdout, "{size}\t{}", args.path.display());
    0
}

fn run_dump(args: &DumpArgs, stdout: &mut impl Write, stderr: &mut impl Write) -> i32 {
    let mut buf = Vec::new();
    match core::dump::dump_index(&args.index_file, &mut buf) {
        Ok(()) => {
            let _ = stdout.write_all(&buf);
            0
        }
        Err(err) => {
            let _ = writeln!(stderr, "agedu dump: {err}");
            1
        }
    }
}

fn run_load(args: &LoadArgs, stderr: &mut impl Write) -> i32 {
    let file = match std::fs::File::open(&args.dump_file) {
        Ok(f) => f,
        Err(err) => {
            let _ = writeln!(stderr, "agedu load: {err}");
            return 1;
        }
    };
    let reader = std::io::BufReader::new(file);
    match core::dump::load(reader, &args.out) {
        Ok(()) => 0,
        Err(err) => {
            let _ = writeln!(stderr, "agedu load: {err}");
            1
        }
    }
}

//! # Overview
//!
//! Orchestrates the full disk-usage-by-age pipeline on top of the
//! lower-level `walk`, `trie`, and `index` crates: scan a directory tree (or
//! load a text dump) into a trie of pathnames, propagate directory mtimes,
//! build the persistent atime-ordered index over it, and answer size/age
//! queries against the finished file.
//!
//! # Design
//!
//! [`build_index`] is the single entry point that turns a filesystem tree
//! into an index file; [`dump::load`] reaches the same destination from a
//! text dump by way of the same [`pipeline::build_from_records`] tail, so a
//! scan and a loaded dump can never diverge in how the trie or index get
//! built. [`QueryIndex`] is the read side: it memory-maps a finished index
//! and exposes `size_under`, `order_statistic`, and full enumeration without
//! exposing the trie/index internals to callers.
//!
//! # Invariants
//!
//! - A `QueryIndex` only exists for a file that has already passed
//!   [`trie::TrieReader::new`] validation; [`QueryIndex::open`] enforces
//!   this at construction.
//! - [`pipeline::build_from_records`] requires its input in strict
//!   collation order; both the scanner and the dump loader already produce
//!   records that way.
//!
//! # Errors
//!
//! [`CoreError`] wraps I/O failures and the lower crates' own error types
//! behind one seam; [`dump::DumpError`] is kept separate since a malformed
//! dump line is a distinct, line-numbered failure mode worth reporting on
//! its own.
//!
//! # Examples
//!
//! ```no_run
//! use std::path::Path;
//! use core::{build_index, BuildOptions, QueryIndex};
//!
//! build_index(Path::new("."), BuildOptions::default(), Path::new("out.agedu"))?;
//! let index = QueryIndex::open(Path::new("out.agedu"))?;
//! println!("{} entries indexed", index.count());
//! # Ok::<(), core::CoreError>(())
//! ```
//!
//! # See also
//!
//! `walk` for the scanner, `trie` for the on-disk pathname structure, and
//! `index` for the persistent AVL tree the queries run against.

pub mod dump;
mod pipeline;
mod query;

pub use pipeline::{bytes_to_os_str, build_index, path_to_bytes, BuildOptions};
pub use query::QueryIndex;

use thiserror::Error;

/// Errors that can surface from any stage of the build or query pipeline.
#[derive(Debug, Error)]
pub enum CoreError {
    /// I/O failure creating, growing, or mapping a file.
    #[error("I/O error")]
    Io(#[from] std::io::Error),
    /// The trie file was malformed or inconsistent.
    #[error("trie error")]
    Trie(#[from] trie::TrieError),
    /// The index build or query encountered an inconsistency.
    #[error("index error")]
    Index(#[from] index::IndexError),
    /// The text dump being loaded was malformed.
    #[error("dump error")]
    Dump(#[from] dump::DumpError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn build_then_open_round_trips_a_small_tree() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a"), b"hello").unwrap();
        let out = dir.path().join("out.agedu");

        build_index(dir.path(), BuildOptions::default(), &out).unwrap();
        let index = QueryIndex::open(&out).unwrap();
        assert_eq!(index.count(), 1);
    }

    #[test]
    fn open_rejects_a_file_that_is_not_an_index() {
        let dir = tempfile::tempdir().unwrap();
        let bogus = dir.path().join("bogus.agedu");
        fs::write(&bogus, b"not a trie").unwrap();

        let err = QueryIndex::open(&bogus).unwrap_err();
        assert!(matches!(err, CoreError::Trie(_)));
    }
}

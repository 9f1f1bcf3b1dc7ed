//! Text interchange format: a one-line header plus one `size atime path`
//! record per line, the same `(path, Leaf)` stream the scanner produces
//! reduced to a human-readable, diffable form.
//!
//! Bytes outside printable ASCII, and the literal `%` byte, are escaped as
//! `%` followed by two lowercase hex digits so the format stays one path per
//! line regardless of what the filesystem actually contains.

use std::io::{self, BufRead, Write};
use std::path::Path;

use metadata::Leaf;
use thiserror::Error;

use crate::pipeline::{build_from_records, map_ro};
use crate::CoreError;

const HEADER_PREFIX: &str = "agedu dump file. pathsep=";

/// Errors parsing a dump file.
#[derive(Debug, Error)]
pub enum DumpError {
    /// The first line was not a recognized `agedu dump file.` header.
    #[error("line {line}: not a recognized dump file header")]
    BadHeader {
        /// 1-indexed line number.
        line: usize,
    },
    /// A data line was missing its size, atime, or path field.
    #[error("line {line}: malformed record")]
    MalformedRecord {
        /// 1-indexed line number.
        line: usize,
    },
    /// A `%XX` escape did not carry two valid hex digits.
    #[error("line {line}: invalid %-escape")]
    BadEscape {
        /// 1-indexed line number.
        line: usize,
    },
    /// Underlying I/O error reading the dump.
    #[error("dump I/O error")]
    Io(#[from] io::Error),
}

fn escape_path(path: &[u8], out: &mut String) {
    for &b in path {
        if b == b'%' || !(0x20..0x7f).contains(&b) {
            out.push('%');
            out.push_str(&format!("{b:02x}"));
        } else {
            out.push(b as char);
        }
    }
}

fn unescape_path(field: &str, line: usize) -> Result<Vec<u8>, DumpError> {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = bytes
                .get(i + 1..i + 3)
                .ok_or(DumpError::BadEscape { line })?;
            let hex = std::str::from_utf8(hex).map_err(|_| DumpError::BadEscape { line })?;
            let value = u8::from_str_radix(hex, 16).map_err(|_| DumpError::BadEscape { line })?;
            out.push(value);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    Ok(out)
}

/// Write `records` to `writer` in the text dump format.
///
/// # Errors
///
/// Propagates I/O errors from `writer`.
pub fn dump(
    records: impl Iterator<Item = (Vec<u8>, Leaf)>,
    pathsep: u8,
    writer: &mut impl Write,
) -> io::Result<()> {
    writeln!(writer, "{HEADER_PREFIX}{pathsep:02x}")?;
    let mut escaped = String::new();
    for (path, leaf) in records {
        escaped.clear();
        escape_path(&path, &mut escaped);
        writeln!(writer, "{} {} {}", leaf.size, leaf.atime, escaped)?;
    }
    Ok(())
}

/// Open the index file at `index_path` and write its full dump to `writer`.
///
/// # Errors
///
/// Returns an error if the index cannot be opened, or propagates I/O errors
/// from `writer`.
pub fn dump_index(index_path: &Path, writer: &mut impl Write) -> Result<(), CoreError> {
    let file = std::fs::File::open(index_path)?;
    let mmap = map_ro(&file)?;
    let reader = trie::TrieReader::new(&mmap)?;
    let pathsep = reader.path_sep();
    dump(reader.walk(), pathsep, writer)?;
    Ok(())
}

/// Parse a text dump from `reader` and build a fresh index file at `out`.
///
/// # Errors
///
/// Returns [`DumpError`] if the header or any record line is malformed, or
/// propagates errors from the underlying trie/index build.
pub fn load(reader: impl BufRead, out: &Path) -> Result<(), CoreError> {
    let mut lines = reader.lines();
    let header = lines.next().ok_or(DumpError::BadHeader { line: 1 })??;
    let pathsep = header
        .strip_prefix(HEADER_PREFIX)
        .and_then(|hex| u8::from_str_radix(hex.trim(), 16).ok())
        .ok_or(DumpError::BadHeader { line: 1 })?;

    let mut records = Vec::new();
    for (idx, line) in lines.enumerate() {
        let line_no = idx + 2;
        let line = line.map_err(DumpError::Io)?;
        let mut parts = line.splitn(3, ' ');
        let size = parts
            .next()
            .and_then(|s| s.parse::<u64>().ok())
            .ok_or(DumpError::MalformedRecord { line: line_no })?;
        let atime = parts
            .next()
            .and_then(|s| s.parse::<u64>().ok())
            .ok_or(DumpError::MalformedRecord { line: line_no })?;
        let path_field = parts
            .next()
            .ok_or(DumpError::MalformedRecord { line: line_no })?;
        let path = unescape_path(path_field, line_no)?;
        records.push((path, Leaf { size, atime }));
    }

    build_from_records(records.into_iter(), out, pathsep)
}

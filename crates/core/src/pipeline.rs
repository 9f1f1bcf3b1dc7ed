//! Sequences the full build pipeline: scan (or a loaded record stream) →
//! trie build → directory-mtime propagation → AVL index build → truncate.
//!
//! A live scan and a loaded dump both reduce to the same `(path, Leaf)`
//! record stream before reaching [`build_from_records`], so there is exactly
//! one place that writes a trie and drives the index builder.

use std::ffi::OsStr;
use std::fs::File;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use memmap2::{Mmap, MmapMut};
use metadata::{AtimePolicy, Leaf};
use walk::{FileId, ScanBuilder};

use crate::CoreError;

/// Options controlling a [`build_index`] run.
pub struct BuildOptions {
    /// Allow the scan to cross filesystem boundaries. Off by default.
    pub cross_filesystem: bool,
    /// Effective-atime computation policy.
    pub atime_policy: AtimePolicy,
    /// Include/exclude/prune rules applied during the scan.
    pub rules: filters::RuleSet,
    /// Path separator byte recorded in the index header.
    pub pathsep: u8,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            cross_filesystem: false,
            atime_policy: AtimePolicy::default(),
            rules: filters::RuleSet::new(),
            pathsep: b'/',
        }
    }
}

/// Convert a scanned relative path to the raw bytes stored in the trie.
///
/// Paths are assumed to already use `pathsep` as their separator, which
/// holds for every path [`walk::Scanner`] produces on a Unix host.
#[must_use]
pub fn path_to_bytes(path: &Path) -> Vec<u8> {
    path.as_os_str().as_bytes().to_vec()
}

/// Convert raw trie path bytes back into an `OsStr`-backed path component.
#[must_use]
pub fn bytes_to_os_str(bytes: &[u8]) -> &OsStr {
    OsStr::from_bytes(bytes)
}

#[allow(unsafe_code)]
pub(crate) fn map_ro(file: &File) -> std::io::Result<Mmap> {
    unsafe { Mmap::map(file) }
}

#[allow(unsafe_code)]
fn map_rw(file: &File) -> std::io::Result<MmapMut> {
    unsafe { MmapMut::map_mut(file) }
}

/// Scan `root` under `options` and build a fresh index file at `out`.
///
/// Per-entry scan failures (a vanished file, a directory that could not be
/// opened) are logged and skipped; they do not abort the build.
///
/// # Errors
///
/// Propagates I/O errors from creating or growing `out`, or from the trie
/// and index builders.
pub fn build_index(root: &Path, options: BuildOptions, out: &Path) -> Result<(), CoreError> {
    let exclude_file = metadata::stat(out).ok().map(|raw| FileId {
        dev: raw.dev,
        ino: raw.ino,
    });

    let mut scan_builder = ScanBuilder::new(root)
        .cross_filesystem(options.cross_filesystem)
        .atime_policy(options.atime_policy)
        .rules(options.rules);
    if let Some(id) = exclude_file {
        scan_builder = scan_builder.exclude_file(id);
    }
    let pathsep = options.pathsep;

    let records = scan_builder.build().filter_map(|result| match result {
        Ok(entry) => Some((path_to_bytes(&entry.path), entry.leaf)),
        Err(err) => {
            tracing::warn!(error = %err, "skipping entry during scan");
            None
        }
    });

    build_from_records(records, out, pathsep)
}

/// Build a fresh index file at `out` from an already-ordered record stream,
/// the shared tail of both [`build_index`] and [`crate::dump::load`].
///
/// # Errors
///
/// Propagates I/O errors, or panics (via the trie builder's `debug_assert!`)
/// if `records` is not in strict collation order.
pub(crate) fn build_from_records(
    records: impl Iterator<Item = (Vec<u8>, Leaf)>,
    out: &Path,
    pathsep: u8,
) -> Result<(), CoreError> {
    let file = File::create(out)?;
    let mut builder = trie::TrieBuilder::new(file, pathsep)?;
    for (path, leaf) in records {
        builder.add(&path, leaf)?;
    }
    let (mut file, trie_end) = builder.finish()?;

    let count;
    {
        let mut mmap = map_rw(&file)?;
        let header = trie::Header::parse(&mmap).ok_or(trie::TrieError::BadMagic)?;
        count = header.count;
        if count > 0 {
            trie::propagate_directory_mtimes(&mut mmap[..], header.root);
        }
    }

    index::build_index(&mut file, trie_end, count, pathsep)?;
    Ok(())
}

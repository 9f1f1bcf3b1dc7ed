//! Filesystem metadata capture for the disk-usage index.
//!
//! Every indexed entry carries exactly two numbers: a size in bytes and an
//! "effective" access time. This crate is the only place that calls `lstat`
//! and the only place that decides what "access time" means for a given
//! entry, so the scanner and the rest of the pipeline never touch `stat`
//! directly.

#![deny(unsafe_code)]
#![deny(missing_docs)]

use std::path::Path;

use thiserror::Error;

/// Errors produced while capturing metadata for a filesystem entry.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// `lstat` (or equivalent) failed for this path.
    #[error("stat failed: {0}")]
    Stat(#[source] std::io::Error),
}

/// The two numbers carried by every trie leaf.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Leaf {
    /// Size in bytes. For files this is `st_blocks * 512`; for directories
    /// it is the directory entry's own on-disk size (not the sum of its
    /// contents, which the trie/index layers compute separately).
    pub size: u64,
    /// Effective access time in seconds since the Unix epoch, per
    /// [`AtimePolicy`].
    pub atime: u64,
}

/// How to compute the "access time" recorded for an entry.
///
/// Plain atime is noisy: backup tools, indexers, and the scanner itself can
/// all touch it without reflecting genuine use. The policy lets callers
/// trade that noise against the risk of missing genuine recent reads.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum AtimePolicy {
    /// `max(atime, mtime)` for files; `mtime` for directories. This is the
    /// default: it tolerates tools that update mtime but not atime (or vice
    /// versa) while still preferring the more informative of the two.
    #[default]
    MaxAtimeMtime,
    /// Always use `mtime`, even for regular files. Useful on filesystems
    /// mounted `noatime`, where atime is frozen and therefore meaningless.
    MtimeOnly,
}

/// A captured `lstat` result, reduced to what the index needs plus the raw
/// fields the atime policy and directory detection require.
#[derive(Clone, Copy, Debug)]
pub struct RawStat {
    /// True if this entry is a directory.
    pub is_dir: bool,
    /// Device number, for filesystem-boundary checks.
    pub dev: u64,
    /// Inode number, for self-exclusion of the output index file.
    pub ino: u64,
    /// Size in bytes as reported by `lstat` (`st_blocks * 512`, not
    /// `st_size`, to reflect actual disk consumption including sparse
    /// holes).
    pub size: u64,
    /// Raw atime, seconds since epoch.
    pub atime: u64,
    /// Raw mtime, seconds since epoch.
    pub mtime: u64,
}

/// `lstat` a path and reduce it to a [`RawStat`].
///
/// # Errors
///
/// Returns [`MetadataError::Stat`] if the underlying `lstat` call fails,
/// e.g. because the entry vanished between being listed by a directory read
/// and being statted here.
pub fn stat(path: &Path) -> Result<RawStat, MetadataError> {
    let st = rustix::fs::lstat(path).map_err(|e| MetadataError::Stat(e.into()))?;
    Ok(RawStat {
        is_dir: rustix::fs::FileType::from_raw_mode(st.st_mode) == rustix::fs::FileType::Directory,
        dev: st.st_dev,
        ino: st.st_ino,
        size: (st.st_blocks as u64).saturating_mul(512),
        atime: st.st_atime.max(0) as u64,
        mtime: st.st_mtime.max(0) as u64,
    })
}

/// Reduce a [`RawStat`] to the [`Leaf`] recorded for this entry, applying
/// `policy`.
#[must_use]
pub fn effective_leaf(raw: &RawStat, policy: AtimePolicy) -> Leaf {
    let atime = match policy {
        AtimePolicy::MtimeOnly => raw.mtime,
        AtimePolicy::MaxAtimeMtime if raw.is_dir => raw.mtime,
        AtimePolicy::MaxAtimeMtime => raw.atime.max(raw.mtime),
    };
    Leaf {
        size: raw.size,
        atime,
    }
}

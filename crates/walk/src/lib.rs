//! Deterministic, collation-ordered filesystem scanner.
//!
//! The scanner walks a directory tree depth-first, visiting each
//! directory's children in sorted-by-name order and emitting a directory's
//! own record immediately before its children, and an entire subtree
//! before moving on to its next sibling. Combined with [`collate`]'s path
//! ordering this produces a stream that is already in the exact order the
//! trie builder requires.

#![deny(unsafe_code)]
#![deny(missing_docs)]

use std::collections::VecDeque;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use filters::{Action, RuleSet};
use metadata::{AtimePolicy, Leaf, RawStat};
use thiserror::Error;

/// Errors yielded for individual entries during a scan.
///
/// The scanner does not abort on these; the entry is skipped and the walk
/// continues, matching the reference scanner's behavior of printing a
/// warning and moving on.
#[derive(Debug, Error)]
pub enum ScanError {
    /// `lstat` failed for this path.
    #[error("{path}: stat failed: {source}")]
    Stat {
        /// The path that could not be statted.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: metadata::MetadataError,
    },
    /// Opening a directory for reading failed.
    #[error("{path}: opendir failed: {source}")]
    OpenDir {
        /// The directory that could not be opened.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

/// One record produced by a scan: a pathname relative to the scan root,
/// plus its captured [`Leaf`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScanEntry {
    /// Path relative to the scan root. The root itself is the empty path.
    pub path: PathBuf,
    /// Captured size/atime.
    pub leaf: Leaf,
    /// Whether this entry is a directory.
    pub is_dir: bool,
}

/// A file identity used to exclude the output index file from its own scan.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FileId {
    /// Device number.
    pub dev: u64,
    /// Inode number.
    pub ino: u64,
}

/// Builder for a [`Scanner`].
pub struct ScanBuilder {
    root: PathBuf,
    cross_filesystem: bool,
    atime_policy: AtimePolicy,
    rules: RuleSet,
    self_exclude: Option<FileId>,
}

impl ScanBuilder {
    /// Start building a scan rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cross_filesystem: false,
            atime_policy: AtimePolicy::default(),
            rules: RuleSet::new(),
            self_exclude: None,
        }
    }

    /// Allow the scan to cross filesystem boundaries. Off by default,
    /// matching the reference scanner's `--no-cross-fs` default.
    #[must_use]
    pub fn cross_filesystem(mut self, yes: bool) -> Self {
        self.cross_filesystem = yes;
        self
    }

    /// Set the effective-atime computation policy.
    #[must_use]
    pub fn atime_policy(mut self, policy: AtimePolicy) -> Self {
        self.atime_policy = policy;
        self
    }

    /// Replace the include/exclude/prune rule set.
    #[must_use]
    pub fn rules(mut self, rules: RuleSet) -> Self {
        self.rules = rules;
        self
    }

    /// Skip the entry identified by `id` wherever it is encountered. Used
    /// to keep the output index file from indexing itself.
    #[must_use]
    pub fn exclude_file(mut self, id: FileId) -> Self {
        self.self_exclude = Some(id);
        self
    }

    /// Build the scanner. Performs no I/O until the first call to `next`.
    #[must_use]
    pub fn build(self) -> Scanner {
        Scanner {
            root: self.root,
            cross_filesystem: self.cross_filesystem,
            atime_policy: self.atime_policy,
            rules: self.rules,
            self_exclude: self.self_exclude,
            root_dev: None,
            stack: Vec::new(),
            started: false,
        }
    }
}

struct Frame {
    rel_dir: PathBuf,
    children: VecDeque<OsString>,
}

/// An iterator over a directory tree in collation order.
///
/// Yields `Ok(ScanEntry)` for each visited entry and `Err(ScanError)` for
/// entries that could not be statted or listed; neither stops the walk.
pub struct Scanner {
    root: PathBuf,
    cross_filesystem: bool,
    atime_policy: AtimePolicy,
    rules: RuleSet,
    self_exclude: Option<FileId>,
    root_dev: Option<u64>,
    stack: Vec<Frame>,
    started: bool,
}

impl Scanner {
    fn abs_path(&self, rel: &Path) -> PathBuf {
        if rel.as_os_str().is_empty() {
            self.root.clone()
        } else {
            self.root.join(rel)
        }
    }

    fn entry_from_raw(&self, rel: &Path, raw: &RawStat) -> ScanEntry {
        ScanEntry {
            path: rel.to_path_buf(),
            leaf: metadata::effective_leaf(raw, self.atime_policy),
            is_dir: raw.is_dir,
        }
    }

    fn is_self(&self, raw: &RawStat) -> bool {
        matches!(self.self_exclude, Some(id) if id.dev == raw.dev && id.ino == raw.ino)
    }

    fn sorted_children(&self, abs_dir: &Path) -> Result<VecDeque<OsString>, ScanError> {
        let read_dir = fs::read_dir(abs_dir).map_err(|source| ScanError::OpenDir {
            path: abs_dir.to_path_buf(),
            source,
        })?;
        let mut names = Vec::new();
        for entry in read_dir {
            let entry = entry.map_err(|source| ScanError::OpenDir {
                path: abs_dir.to_path_buf(),
                source,
            })?;
            let name = entry.file_name();
            if name == "." || name == ".." {
                continue;
            }
            names.push(name);
        }
        names.sort();
        Ok(names.into())
    }

    fn visit_root(&mut self) -> Option<Result<ScanEntry, ScanError>> {
        self.started = true;
        let abs = self.abs_path(Path::new(""));
        let raw = match metadata::stat(&abs) {
            Ok(raw) => raw,
            Err(source) => return Some(Err(ScanError::Stat { path: abs, source })),
        };
        self.root_dev = Some(raw.dev);
        let entry = self.entry_from_raw(Path::new(""), &raw);
        if raw.is_dir {
            match self.sorted_children(&abs) {
                Ok(children) => self.stack.push(Frame {
                    rel_dir: PathBuf::new(),
                    children,
                }),
                Err(e) => return Some(Err(e)),
            }
        }
        Some(Ok(entry))
    }

    fn advance(&mut self) -> Option<Result<ScanEntry, ScanError>> {
        loop {
            let Some(frame) = self.stack.last_mut() else {
                return None;
            };
            let Some(name) = frame.children.pop_front() else {
                self.stack.pop();
                continue;
            };
            let rel = frame.rel_dir.join(&name);
            let abs = self.abs_path(&rel);

            let raw = match metadata::stat(&abs) {
                Ok(raw) => raw,
                Err(source) => return Some(Err(ScanError::Stat { path: abs, source })),
            };
            if self.is_self(&raw) {
                continue;
            }
            if !self.cross_filesystem {
                if let Some(root_dev) = self.root_dev {
                    if raw.dev != root_dev {
                        continue;
                    }
                }
            }

            let file_name = name.to_string_lossy();
            let full_path = rel.to_string_lossy();
            let action = self.rules.evaluate(&file_name, &full_path);

            match action {
                Action::Prune => continue,
                Action::Exclude => {
                    let mut zeroed = raw;
                    zeroed.size = 0;
                    let entry = self.entry_from_raw(&rel, &zeroed);
                    if raw.is_dir {
                        self.push_children(&rel, &abs);
                    }
                    return Some(Ok(entry));
                }
                Action::Include => {
                    let entry = self.entry_from_raw(&rel, &raw);
                    if raw.is_dir {
                        self.push_children(&rel, &abs);
                    }
                    return Some(Ok(entry));
                }
            }
        }
    }

    fn push_children(&mut self, rel: &Path, abs: &Path) {
        match self.sorted_children(abs) {
            Ok(children) => self.stack.push(Frame {
                rel_dir: rel.to_path_buf(),
                children,
            }),
            Err(error) => {
                // The directory's own entry was already yielded; we simply
                // have no children to push, matching the reference
                // scanner's "warn and move on" behavior for unreadable
                // directories rather than aborting the whole walk.
                tracing::warn!(path = %abs.display(), %error, "skipping unreadable directory");
            }
        }
    }
}

impl Iterator for Scanner {
    type Item = Result<ScanEntry, ScanError>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.started {
            return self.visit_root();
        }
        self.advance()
    }
}

//! Query facade combining the trie and index readers behind one API, shared
//! by the CLI and any future reporting front end.

use std::ffi::OsString;
use std::fs::File;
use std::os::unix::ffi::OsStringExt;
use std::path::{Path, PathBuf};

use metadata::Leaf;

use crate::pipeline::map_ro;
use crate::CoreError;

/// A finished, memory-mapped index file, ready to answer queries.
pub struct QueryIndex {
    mmap: memmap2::Mmap,
}

impl QueryIndex {
    /// Open the index file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Io`] if the file cannot be opened or mapped, or
    /// [`CoreError::Trie`] if it is not a valid index file.
    pub fn open(path: &Path) -> Result<Self, CoreError> {
        let file = File::open(path)?;
        let mmap = map_ro(&file)?;
        trie::TrieReader::new(&mmap)?;
        Ok(Self { mmap })
    }

    fn reader(&self) -> trie::TrieReader<'_> {
        trie::TrieReader::new(&self.mmap).expect("validated in QueryIndex::open")
    }

    /// Total size of files strictly *under* `prefix` (not counting `prefix`'s
    /// own entry, if it has one) whose atime is strictly less than `cutoff`.
    ///
    /// `prefix`'s children form the contiguous rank range
    /// `[rank(prefix + pathsep), rank(successor(prefix)))` — starting one
    /// past `prefix` itself, since `"D/"` collates immediately after `"D"`
    /// and immediately before every path inside `D`. The total is the
    /// difference of two prefix-sum queries at that range's endpoints.
    ///
    /// An empty `prefix` means the scan root itself. The root's own entry is
    /// always trie rank 0 (the shortest possible path), so excluding it is
    /// the range `[1, count)` in 1-indexed `query` terms directly, rather
    /// than through `rank`/`make_successor`: the general recipe's sentinel
    /// byte (`0x01`) only outranks a directory's children because they are
    /// anchored behind an explicit separator byte at the matching depth, and
    /// the root's children have no such anchor (they start directly with an
    /// arbitrary filename byte, which can rank below the sentinel).
    #[must_use]
    pub fn size_under(&self, prefix: &[u8], cutoff: u64) -> u64 {
        let reader = self.reader();
        let count = reader.count();
        let roots_offset = reader.index_root();
        let buf: &[u8] = &self.mmap;

        if prefix.is_empty() {
            if count == 0 {
                return 0;
            }
            let total = index::query(buf, roots_offset, count, count as i64, cutoff);
            let root_entry = index::query(buf, roots_offset, count, 1, cutoff);
            return total - root_entry;
        }

        let collator = reader.collator();
        let mut start_key = prefix.to_vec();
        if start_key.last() != Some(&collator.pathsep()) {
            start_key.push(collator.pathsep());
        }
        let a = reader.rank(&start_key);
        let succ = collate::make_successor(&collator, prefix);
        let b = reader.rank(&succ);

        let hi = index::query(buf, roots_offset, count, b as i64, cutoff);
        let lo = index::query(buf, roots_offset, count, a as i64, cutoff);
        hi - lo
    }

    /// An atime such that files older than it account for at most `fraction`
    /// of the total indexed size.
    ///
    /// # Panics
    ///
    /// Panics if the index has no entries.
    #[must_use]
    pub fn order_statistic(&self, fraction: f64) -> u64 {
        let reader = self.reader();
        let count = reader.count();
        let root = index::root_for(&self.mmap, reader.index_root(), count);
        index::order_statistic(&self.mmap, root, fraction)
    }

    /// Every indexed `(path, leaf)` pair, in collation order.
    #[must_use]
    pub fn entries(&self) -> Vec<(PathBuf, Leaf)> {
        self.reader()
            .walk()
            .map(|(path, leaf)| (PathBuf::from(OsString::from_vec(path)), leaf))
            .collect()
    }

    /// Total number of indexed entries.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.reader().count()
    }

    /// The path separator byte recorded in this index.
    #[must_use]
    pub fn path_sep(&self) -> u8 {
        self.reader().path_sep()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{build_index, BuildOptions};
    use std::fs;

    #[test]
    fn size_under_matches_scenario_a() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("a/c")).unwrap();
        fs::write(dir.path().join("a/b"), vec![0u8; 10 * 512]).unwrap();
        fs::write(dir.path().join("a/c/d"), vec![0u8; 10 * 512]).unwrap();
        fs::write(dir.path().join("a/c/e"), vec![0u8; 10 * 512]).unwrap();
        fs::write(dir.path().join("b"), vec![0u8; 10 * 512]).unwrap();

        let out = dir.path().join("out.agedu");
        build_index(dir.path(), BuildOptions::default(), &out).unwrap();

        let index = QueryIndex::open(&out).unwrap();
        let future = u64::MAX;
        // a/b, a/c, a/c/d, a/c/e under "a": 4 entries of 10 blocks * 512.
        let under_a = index.size_under(b"a", future);
        assert_eq!(under_a, 4 * 10 * 512);
    }

    #[test]
    fn size_under_empty_prefix_excludes_the_roots_own_entry() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a"), vec![0u8; 1024]).unwrap();
        fs::write(dir.path().join("b"), vec![0u8; 2048]).unwrap();

        let out = dir.path().join("out.agedu");
        build_index(dir.path(), BuildOptions::default(), &out).unwrap();

        let index = QueryIndex::open(&out).unwrap();
        let future = u64::MAX;
        assert_eq!(index.size_under(b"", future), 1024 + 2048);
    }

    #[test]
    fn order_statistic_is_within_atime_bounds() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a"), b"x").unwrap();
        fs::write(dir.path().join("b"), b"y").unwrap();
        let out = dir.path().join("out.agedu");
        build_index(dir.path(), BuildOptions::default(), &out).unwrap();

        let index = QueryIndex::open(&out).unwrap();
        let stat = index.order_statistic(0.5);
        let entries = index.entries();
        let min = entries.iter().map(|(_, l)| l.atime).min().unwrap();
        let max = entries.iter().map(|(_, l)| l.atime).max().unwrap();
        assert!((min..=max).contains(&stat));
    }
}

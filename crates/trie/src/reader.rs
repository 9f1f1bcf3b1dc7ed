//! Read-only queries over a finished, memory-mapped trie.

use collate::Collator;
use metadata::Leaf;

use crate::format::{read_node, Node};
use crate::header::Header;

/// Errors opening a trie file for reading.
#[derive(Debug, thiserror::Error)]
pub enum TrieError {
    /// The file is too short, or its magic block does not match — either
    /// it isn't an index file, or it was built on an incompatible host.
    #[error("not a valid index file (bad or missing magic header)")]
    BadMagic,
}

/// A read-only view over a finished trie, backed by a byte slice (usually
/// a memory map).
pub struct TrieReader<'a> {
    buf: &'a [u8],
    header: Header,
    collator: Collator,
}

impl<'a> TrieReader<'a> {
    /// Open a trie reader over `buf`.
    ///
    /// # Errors
    ///
    /// Returns [`TrieError::BadMagic`] if `buf` does not start with a valid
    /// header.
    pub fn new(buf: &'a [u8]) -> Result<Self, TrieError> {
        let header = Header::parse(buf).ok_or(TrieError::BadMagic)?;
        let collator = Collator::new(header.pathsep);
        Ok(Self {
            buf,
            header,
            collator,
        })
    }

    /// Total number of indexed leaves.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.header.count
    }

    /// Length of the longest stored path, including its terminating NUL.
    #[must_use]
    pub fn max_path_len(&self) -> u64 {
        self.header.maxpathlen
    }

    /// The path separator byte recorded in the header.
    #[must_use]
    pub fn path_sep(&self) -> u8 {
        self.header.pathsep
    }

    /// The collator implied by this file's path separator.
    #[must_use]
    pub fn collator(&self) -> Collator {
        self.collator
    }

    /// File offset of the root node.
    #[must_use]
    pub fn root(&self) -> u64 {
        self.header.root
    }

    /// File offset of the AVL tagged-root table, 0 if the index has not
    /// been built yet.
    #[must_use]
    pub fn index_root(&self) -> u64 {
        self.header.indexroot
    }

    /// The raw bytes backing this reader.
    #[must_use]
    pub fn buf(&self) -> &'a [u8] {
        self.buf
    }

    /// Write the `i`-th path (0-indexed, in trie order) into `out`.
    ///
    /// # Panics
    ///
    /// Panics if `i >= count()`.
    pub fn get_path(&self, i: u64, out: &mut Vec<u8>) {
        out.clear();
        let mut remaining = i;
        let mut offset = self.header.root;
        loop {
            match read_node(self.buf, offset) {
                Node::Leaf(_) => {
                    assert_eq!(remaining, 0, "path index out of range");
                    return;
                }
                Node::String { literal, subnode } => {
                    out.extend_from_slice(literal);
                    offset = subnode;
                }
                Node::Switch(sw) => {
                    let mut found = false;
                    for idx in 0..sw.len() {
                        let e = sw.entry(idx);
                        if remaining < e.subcount {
                            if e.ch != 0 {
                                out.push(e.ch);
                            }
                            offset = e.subnode;
                            found = true;
                            break;
                        }
                        remaining -= e.subcount;
                    }
                    assert!(found, "path index out of range");
                }
            }
        }
    }

    /// The absolute file offset of the `i`-th leaf's record.
    ///
    /// # Panics
    ///
    /// Panics if `i >= count()`.
    #[must_use]
    pub fn leaf_offset(&self, i: u64) -> u64 {
        let mut remaining = i;
        let mut offset = self.header.root;
        loop {
            match read_node(self.buf, offset) {
                Node::Leaf(_) => {
                    assert_eq!(remaining, 0, "leaf index out of range");
                    return offset;
                }
                Node::String { subnode, .. } => offset = subnode,
                Node::Switch(sw) => {
                    let mut found = false;
                    for idx in 0..sw.len() {
                        let e = sw.entry(idx);
                        if remaining < e.subcount {
                            offset = e.subnode;
                            found = true;
                            break;
                        }
                        remaining -= e.subcount;
                    }
                    assert!(found, "leaf index out of range");
                }
            }
        }
    }

    /// The leaf metadata for the `i`-th path.
    ///
    /// # Panics
    ///
    /// Panics if `i >= count()` or the walk does not terminate at a leaf.
    #[must_use]
    pub fn get_leaf(&self, i: u64) -> Leaf {
        let mut remaining = i;
        let mut offset = self.header.root;
        loop {
            match read_node(self.buf, offset) {
                Node::Leaf(leaf) => {
                    assert_eq!(remaining, 0, "leaf index out of range");
                    return leaf;
                }
                Node::String { subnode, .. } => offset = subnode,
                Node::Switch(sw) => {
                    let mut found = false;
                    for idx in 0..sw.len() {
                        let e = sw.entry(idx);
                        if remaining < e.subcount {
                            offset = e.subnode;
                            found = true;
                            break;
                        }
                        remaining -= e.subcount;
                    }
                    assert!(found, "leaf index out of range");
                }
            }
        }
    }

    /// Number of indexed paths strictly less than `path` under collation
    /// order, whether or not `path` itself is present.
    #[must_use]
    pub fn rank(&self, path: &[u8]) -> u64 {
        let mut count = 0u64;
        let mut offset = self.header.root;
        let mut depth = 0usize;
        let ext_len = path.len() + 1;

        loop {
            match read_node(self.buf, offset) {
                Node::Leaf(_) => {
                    // Reaching a leaf means every byte compared so far matched `path`
                    // exactly; the leaf's own path is `depth` bytes long. It collates
                    // strictly before `path` only if it is a proper prefix of it
                    // (depth < path.len()) — an exact match (depth == path.len()) is
                    // not strictly less and must not be counted.
                    if depth < path.len() {
                        count += 1;
                    }
                    return count;
                }
                Node::String { literal, subnode } => {
                    let mut i = 0;
                    while i < literal.len() {
                        let qb = if depth + i < path.len() {
                            path[depth + i]
                        } else {
                            0
                        };
                        match self
                            .collator
                            .rank(literal[i])
                            .cmp(&self.collator.rank(qb))
                        {
                            std::cmp::Ordering::Equal => i += 1,
                            std::cmp::Ordering::Less => return count,
                            std::cmp::Ordering::Greater => return count,
                        }
                        if depth + i >= ext_len {
                            break;
                        }
                    }
                    depth += literal.len();
                    offset = subnode;
                }
                Node::Switch(sw) => {
                    let qb = if depth < path.len() { path[depth] } else { 0 };
                    let qrank = self.collator.rank(qb);
                    let mut matched = false;
                    for idx in 0..sw.len() {
                        let e = sw.entry(idx);
                        let erank = self.collator.rank(e.ch);
                        if erank < qrank {
                            count += e.subcount;
                        } else if erank == qrank {
                            offset = e.subnode;
                            depth += 1;
                            matched = true;
                            break;
                        } else {
                            break;
                        }
                    }
                    if !matched {
                        return count;
                    }
                }
            }
        }
    }

    /// Iterate every `(path, leaf)` pair in trie order.
    #[must_use]
    pub fn walk(&self) -> Walker<'a, '_> {
        Walker {
            reader: self,
            index: 0,
            count: self.header.count,
        }
    }
}

/// In-order iterator over every indexed path and its leaf.
pub struct Walker<'a, 'r> {
    reader: &'r TrieReader<'a>,
    index: u64,
    count: u64,
}

impl Iterator for Walker<'_, '_> {
    type Item = (Vec<u8>, Leaf);

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.count {
            return None;
        }
        let mut buf = Vec::new();
        self.reader.get_path(self.index, &mut buf);
        let leaf = self.reader.get_leaf(self.index);
        self.index += 1;
        Some((buf, leaf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::TrieBuilder;
    use memmap2::Mmap;
    use std::fs::File;

    fn build(paths: &[(&str, u64, u64)]) -> File {
        let tmp = tempfile::tempfile().unwrap();
        let mut b = TrieBuilder::new(tmp, b'/').unwrap();
        for (path, size, atime) in paths {
            b.add(
                path.as_bytes(),
                Leaf {
                    size: *size,
                    atime: *atime,
                },
            )
            .unwrap();
        }
        b.finish().unwrap().0
    }

    #[test]
    #[allow(unsafe_code)]
    fn rank_matches_index_for_every_path() {
        let file = build(&[
            ("a", 10, 100),
            ("a/b", 10, 100),
            ("a/c", 10, 100),
            ("a/c/d", 10, 100),
            ("a/c/e", 10, 100),
            ("b", 10, 100),
        ]);
        let mmap = unsafe { Mmap::map(&file).unwrap() };
        let reader = TrieReader::new(&mmap).unwrap();
        for i in 0..reader.count() {
            let mut buf = Vec::new();
            reader.get_path(i, &mut buf);
            assert_eq!(reader.rank(&buf), i, "path {:?}", String::from_utf8_lossy(&buf));
        }
    }

    #[test]
    #[allow(unsafe_code)]
    fn rank_of_successor_spans_subtree() {
        let file = build(&[
            ("a", 10, 100),
            ("a/b", 10, 100),
            ("a/c", 10, 100),
            ("a/c/d", 10, 100),
            ("a/c/e", 10, 100),
            ("b", 10, 100),
        ]);
        let mmap = unsafe { Mmap::map(&file).unwrap() };
        let reader = TrieReader::new(&mmap).unwrap();
        let col = reader.collator();
        let succ = collate::make_successor(&col, b"a");
        assert_eq!(reader.rank(b"a"), 0);
        assert_eq!(reader.rank(&succ), 5);
    }

    #[test]
    #[allow(unsafe_code)]
    fn walker_yields_every_path_in_order() {
        let file = build(&[("a", 1, 1), ("a/b", 2, 2), ("b", 3, 3)]);
        let mmap = unsafe { Mmap::map(&file).unwrap() };
        let reader = TrieReader::new(&mmap).unwrap();
        let names: Vec<String> = reader
            .walk()
            .map(|(p, _)| String::from_utf8(p).unwrap())
            .collect();
        assert_eq!(names, vec!["a", "a/b", "b"]);
    }
}

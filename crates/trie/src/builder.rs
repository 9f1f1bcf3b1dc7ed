//! Streaming trie builder.
//!
//! Consumes `(path, leaf)` pairs in strict collation order and writes
//! trie nodes to the output file as soon as enough information is
//! available to finalize them — no more than one path's worth of state is
//! ever held in memory. This mirrors the reference builder's "unwind"
//! algorithm: because the input is sorted, a node can be finalized the
//! moment a later path diverges from it, and finalized nodes are never
//! revisited.

use std::cmp::Ordering;
use std::fs::File;
use std::io::{self, Seek, SeekFrom, Write};

use collate::Collator;
use metadata::Leaf;

use crate::format::{align_up, encode_leaf, encode_string, encode_switch, SwitchEntry};
use crate::header::{Header, HEADER_LEN};

struct SwitchLevel {
    chars: Vec<u8>,
    offs: Vec<u64>,
    counts: Vec<u64>,
}

impl SwitchLevel {
    fn new() -> Self {
        Self {
            chars: Vec::new(),
            offs: Vec::new(),
            counts: Vec::new(),
        }
    }

    fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    fn push(&mut self, ch: u8, off: u64, count: u64) {
        self.chars.push(ch);
        self.offs.push(off);
        self.counts.push(count);
    }

    fn take(&mut self) -> (Vec<u8>, Vec<u64>, Vec<u64>) {
        (
            std::mem::take(&mut self.chars),
            std::mem::take(&mut self.offs),
            std::mem::take(&mut self.counts),
        )
    }
}

/// Builds a trie file incrementally from a sorted stream of entries.
pub struct TrieBuilder {
    file: File,
    offset: u64,
    collator: Collator,
    last: Option<(Vec<u8>, u64)>,
    switches: Vec<SwitchLevel>,
    maxpathlen: u64,
}

impl TrieBuilder {
    /// Start building into `file` (truncated to empty first), using
    /// `pathsep` as the collation separator recorded in the header.
    ///
    /// # Errors
    ///
    /// Returns an error if the placeholder header cannot be written.
    pub fn new(mut file: File, pathsep: u8) -> io::Result<Self> {
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        let placeholder = Header {
            root: 0,
            indexroot: 0,
            count: 0,
            maxpathlen: 0,
            pathsep,
        };
        file.write_all(&placeholder.to_bytes())?;
        Ok(Self {
            file,
            offset: HEADER_LEN as u64,
            collator: Collator::new(pathsep),
            last: None,
            switches: Vec::new(),
            maxpathlen: 0,
        })
    }

    fn byte_at(path: &[u8], depth: usize) -> u8 {
        path.get(depth).copied().unwrap_or(0)
    }

    /// Extended-length common-prefix depth between `a` and `b`, treating
    /// each as if terminated by an extra virtual NUL byte (so a path that
    /// is a strict prefix of another still has a well-defined divergence
    /// point at its own length).
    fn common_prefix_depth(a: &[u8], b: &[u8]) -> usize {
        let max_depth = a.len().max(b.len()) + 1;
        let mut depth = 0;
        while depth < max_depth && Self::byte_at(a, depth) == Self::byte_at(b, depth) {
            depth += 1;
        }
        depth
    }

    fn write_node(&mut self, bytes: &[u8]) -> io::Result<u64> {
        let aligned = align_up(self.offset);
        if aligned != self.offset {
            self.file.write_all(&vec![0u8; (aligned - self.offset) as usize])?;
        }
        self.file.write_all(bytes)?;
        let off = aligned;
        self.offset = aligned + bytes.len() as u64;
        Ok(off)
    }

    fn ensure_level(&mut self, depth: usize) {
        while self.switches.len() <= depth {
            self.switches.push(SwitchLevel::new());
        }
    }

    /// Finalize every level strictly below `target_depth`, returning the
    /// offset and leaf count of the node that now represents everything
    /// from `target_depth` down to the end of the previous path.
    fn unwind(&mut self, target_depth: usize) -> io::Result<(u64, u64)> {
        let Some((last_path, last_off)) = self.last.clone() else {
            return Ok((0, 0));
        };

        let mut offset = last_off;
        let mut count = 1u64;
        let mut depth = last_path.len() + 1;

        while depth > target_depth {
            let odepth = depth;
            while depth > target_depth
                && self
                    .switches
                    .get(depth - 1)
                    .is_none_or(SwitchLevel::is_empty)
            {
                depth -= 1;
            }
            if odepth > depth {
                let literal = &last_path[depth..odepth.min(last_path.len())];
                let bytes = encode_string(literal, offset);
                offset = self.write_node(&bytes)?;
            }

            if depth <= target_depth {
                break;
            }
            depth -= 1;

            let level = &mut self.switches[depth];
            level.push(Self::byte_at(&last_path, depth), offset, count);
            let (chars, offs, counts) = level.take();

            let mut entries: Vec<SwitchEntry> = chars
                .iter()
                .zip(offs.iter())
                .zip(counts.iter())
                .map(|((&ch, &subnode), &subcount)| SwitchEntry {
                    ch,
                    subnode,
                    subcount,
                })
                .collect();
            entries.sort_by(|a, b| self.collator.rank(a.ch).cmp(&self.collator.rank(b.ch)));

            count = entries.iter().map(|e| e.subcount).sum();
            let bytes = encode_switch(&entries);
            offset = self.write_node(&bytes)?;
        }

        Ok((offset, count))
    }

    /// Append one entry. `path` must collate strictly after every
    /// previously added path.
    ///
    /// # Errors
    ///
    /// Propagates I/O errors from the underlying file.
    ///
    /// # Panics
    ///
    /// Panics (via `debug_assert!`) if `path` does not collate strictly
    /// after the previously added path — this is a programming error in
    /// the caller, not a runtime condition.
    pub fn add(&mut self, path: &[u8], leaf: Leaf) -> io::Result<()> {
        self.maxpathlen = self.maxpathlen.max(path.len() as u64 + 1);

        if let Some((last_path, _)) = &self.last {
            debug_assert_eq!(
                collate::compare(&self.collator, last_path, path),
                Ordering::Less,
                "trie builder entries must arrive in strictly increasing collation order"
            );
            let depth = Self::common_prefix_depth(last_path, path);
            let (offset, count) = self.unwind(depth + 1)?;
            self.ensure_level(depth);
            let ch = Self::byte_at(last_path, depth);
            self.switches[depth].push(ch, offset, count);
        }

        let bytes = encode_leaf(leaf);
        let off = self.write_node(&bytes)?;
        self.last = Some((path.to_vec(), off));
        Ok(())
    }

    /// Finalize the trie: unwind every remaining level, then rewrite the
    /// header with the resulting root offset, leaf count, and maximum path
    /// length.
    ///
    /// # Errors
    ///
    /// Propagates I/O errors from the underlying file.
    pub fn finish(mut self) -> io::Result<(File, u64)> {
        let pathsep = self.collator.pathsep();
        let (root, count) = self.unwind(0)?;
        let header = Header {
            root,
            indexroot: 0,
            count,
            maxpathlen: self.maxpathlen,
            pathsep,
        };
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&header.to_bytes())?;
        self.file.seek(SeekFrom::Start(self.offset))?;
        tracing::debug!(count, trie_end = self.offset, "finished trie build");
        Ok((self.file, self.offset))
    }
}

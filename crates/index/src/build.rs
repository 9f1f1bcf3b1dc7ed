//! Persistent (copy-on-write) AVL insertion, driving the append-only AVL
//! arena that sits after the trie in the same file.

use trie::read_node;
use trie::Node;

use crate::avl::{
    align_up, index_maxdepth, maxdepth_at, read_avl, read_root, write_avl, write_root, AvlNode,
    NODE_SIZE,
};

fn leaf_size(buf: &[u8], element: u64) -> u64 {
    match read_node(buf, element) {
        Node::Leaf(leaf) => leaf.size,
        _ => unreachable!("an AVL node's element always points at a trie leaf"),
    }
}

fn leaf_atime(buf: &[u8], element: u64) -> u64 {
    match read_node(buf, element) {
        Node::Leaf(leaf) => leaf.atime,
        _ => unreachable!("an AVL node's element always points at a trie leaf"),
    }
}

/// Builds the AVL index incrementally, one trie leaf at a time, over a
/// shared, growable buffer.
///
/// Every offset this type stores is relative to the start of the buffer
/// passed to its methods, never a raw pointer, so there is nothing to fix up
/// when the buffer is reallocated elsewhere (e.g. after [`memmap2::MmapMut`]
/// is dropped and remapped over a larger file) beyond passing the new
/// buffer into the next call. [`IndexBuilder::rebase`] exists only for
/// parity with the conceptual operation of "the caller remapped the file";
/// it has nothing to do because no pointers are cached.
pub struct IndexBuilder {
    roots_offset: u64,
    nodes_offset: u64,
    nnodes: u64,
    n: u64,
    count: u64,
    curr_root: u64,
    first_mutable: u64,
    delta: u64,
}

impl IndexBuilder {
    /// Begin building an index for `count` leaves, with the root table and
    /// node arena placed (aligned) starting at `start_offset` — normally the
    /// trie's `real_size()`. Returns the builder together with `delta`: the
    /// number of bytes a single [`add`](Self::add) call can allocate in the
    /// worst case, for the caller to use as a growth threshold.
    #[must_use]
    pub fn new(buf: &mut [u8], start_offset: u64, count: u64) -> (Self, u64) {
        let roots_offset = align_up(start_offset);
        for i in 0..count {
            write_root(buf, roots_offset, i, 0);
        }
        let nodes_offset = align_up(roots_offset + count * 8);
        let delta = NODE_SIZE * (1 + index_maxdepth(count));

        let mut header = trie::Header::parse(buf)
            .expect("buffer passed to IndexBuilder::new must already be a finished trie");
        header.indexroot = roots_offset;
        let header_bytes = header.to_bytes();
        buf[..header_bytes.len()].copy_from_slice(&header_bytes);

        (
            Self {
                roots_offset,
                nodes_offset,
                nnodes: 0,
                n: 0,
                count,
                curr_root: 0,
                first_mutable: nodes_offset,
                delta,
            },
            delta,
        )
    }

    /// The growth threshold computed at construction time.
    #[must_use]
    pub fn delta(&self) -> u64 {
        self.delta
    }

    /// Offset of the root table, for the header's `indexroot` field.
    #[must_use]
    pub fn roots_offset(&self) -> u64 {
        self.roots_offset
    }

    fn alloc(&mut self) -> u64 {
        let off = self.nodes_offset + self.nnodes * NODE_SIZE;
        self.nnodes += 1;
        off
    }

    fn make_mutable(&mut self, buf: &mut [u8], n: u64) -> u64 {
        if n != 0 && n >= self.first_mutable {
            return n;
        }
        let new_off = self.alloc();
        if n != 0 {
            let node = read_avl(buf, n);
            write_avl(buf, new_off, node);
        }
        new_off
    }

    fn fix(&self, buf: &mut [u8], n: u64) {
        let node = read_avl(buf, n);
        let left_depth = maxdepth_at(buf, node.children[0]);
        let right_depth = maxdepth_at(buf, node.children[1]);
        let left_size = if node.children[0] != 0 {
            read_avl(buf, node.children[0]).totalsize
        } else {
            0
        };
        let right_size = if node.children[1] != 0 {
            read_avl(buf, node.children[1]).totalsize
        } else {
            0
        };
        let fixed = AvlNode {
            maxdepth: 1 + left_depth.max(right_depth),
            totalsize: leaf_size(buf, node.element) + left_size + right_size,
            ..node
        };
        write_avl(buf, n, fixed);
    }

    /// Insert `element` (the trie leaf's file offset) into the subtree
    /// rooted at `n` (0 for an empty subtree). Returns the new subtree
    /// root's offset.
    fn insert(&mut self, buf: &mut [u8], n: u64, element: u64) -> u64 {
        if n == 0 {
            let off = self.make_mutable(buf, 0);
            write_avl(
                buf,
                off,
                AvlNode {
                    children: [0, 0],
                    element,
                    maxdepth: 0,
                    totalsize: 0,
                },
            );
            self.fix(buf, off);
            return off;
        }

        let existing = read_avl(buf, n);
        let subtree = usize::from(leaf_atime(buf, element) > leaf_atime(buf, existing.element));

        let n = self.make_mutable(buf, n);
        let mut node = read_avl(buf, n);
        let new_child = self.insert(buf, node.children[subtree], element);
        node.children[subtree] = new_child;
        write_avl(buf, n, node);

        let node = read_avl(buf, n);
        let chosen_depth = maxdepth_at(buf, node.children[subtree]);
        let other_depth = maxdepth_at(buf, node.children[1 - subtree]);

        let mut root = n;
        if chosen_depth > other_depth + 1 {
            let p_off = node.children[subtree];
            debug_assert!(p_off >= self.first_mutable);
            let p = read_avl(buf, p_off);
            let p_chosen_depth = maxdepth_at(buf, p.children[subtree]);
            let p_other_depth = maxdepth_at(buf, p.children[1 - subtree]);

            if p_chosen_depth >= p_other_depth {
                let mut node = read_avl(buf, n);
                let mut p = read_avl(buf, p_off);
                node.children[subtree] = p.children[1 - subtree];
                write_avl(buf, n, node);
                p.children[1 - subtree] = n;
                write_avl(buf, p_off, p);
                self.fix(buf, n);
                root = p_off;
            } else {
                let q_off = p.children[1 - subtree];
                debug_assert!(q_off >= self.first_mutable);
                let q = read_avl(buf, q_off);
                let mut node = read_avl(buf, n);
                let mut p = read_avl(buf, p_off);
                let mut q = q;
                node.children[subtree] = q.children[1 - subtree];
                p.children[1 - subtree] = q.children[subtree];
                q.children[1 - subtree] = n;
                q.children[subtree] = p_off;
                write_avl(buf, n, node);
                write_avl(buf, p_off, p);
                write_avl(buf, q_off, q);
                self.fix(buf, n);
                self.fix(buf, p_off);
                root = q_off;
            }
        }

        self.fix(buf, root);
        root
    }

    /// Insert the leaf at trie offset `element` into the current tree.
    ///
    /// # Panics
    ///
    /// Panics (via `debug_assert!`) if more than `count` leaves are added,
    /// or if a rotation would reparent a node outside the mutable range —
    /// both are programming errors in the caller, not runtime conditions.
    pub fn add(&mut self, buf: &mut [u8], element: u64) {
        debug_assert!(self.n < self.count, "more leaves added than reserved for");
        self.curr_root = self.insert(buf, self.curr_root, element);
        write_root(buf, self.roots_offset, self.n, 0);
        self.n += 1;
    }

    /// If any leaf has been added since the last tag, record the current
    /// root in the most recently added leaf's root-table slot and freeze
    /// every node allocated so far.
    pub fn tag(&mut self, buf: &mut [u8]) {
        if self.n > 0 {
            write_root(buf, self.roots_offset, self.n - 1, self.curr_root);
        }
        self.first_mutable = self.nodes_offset + self.nnodes * NODE_SIZE;
    }

    /// Acknowledge that the caller remapped the underlying file. A no-op in
    /// this design — see the type's documentation.
    pub fn rebase(&mut self) {}

    /// End offset of the last node written, so the caller can truncate the
    /// file tightly.
    #[must_use]
    pub fn real_size(&self) -> u64 {
        self.nodes_offset + self.nnodes * NODE_SIZE
    }

    /// Finish building.
    ///
    /// # Panics
    ///
    /// Panics if fewer than `count` leaves were added.
    pub fn finish(self) {
        assert_eq!(self.n, self.count, "not every trie leaf was indexed");
    }
}

/// Read the root offset recorded for the first `i` leaves (1-indexed, as
/// the root table itself is), 0 if that slot was never tagged.
#[must_use]
pub fn root_for(buf: &[u8], roots_offset: u64, i: u64) -> u64 {
    read_root(buf, roots_offset, i - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use trie::TrieBuilder;

    fn build_trie(entries: &[(&str, u64, u64)]) -> (Vec<u8>, Vec<u64>, u64) {
        let tmp = tempfile::tempfile().unwrap();
        let mut b = TrieBuilder::new(tmp, b'/').unwrap();
        for (path, size, atime) in entries {
            b.add(
                path.as_bytes(),
                metadata::Leaf {
                    size: *size,
                    atime: *atime,
                },
            )
            .unwrap();
        }
        let (mut file, end) = b.finish().unwrap();
        use std::io::{Read, Seek, SeekFrom};
        file.seek(SeekFrom::Start(0)).unwrap();
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes).unwrap();

        let reader_bytes = bytes.clone();
        let reader = trie::TrieReader::new(&reader_bytes).unwrap();
        let mut offsets = Vec::new();
        for i in 0..reader.count() {
            offsets.push(reader.leaf_offset(i));
        }
        (bytes, offsets, end)
    }

    #[test]
    fn single_insert_builds_singleton_tree() {
        let (mut bytes, offsets, end) = build_trie(&[("a", 10, 5)]);
        bytes.resize(bytes.len() + 256, 0);
        let (mut ib, _delta) = IndexBuilder::new(&mut bytes, end, 1);
        ib.add(&mut bytes, offsets[0]);
        ib.tag(&mut bytes);
        let root = root_for(&bytes, ib.roots_offset(), 1);
        assert_ne!(root, 0);
        let node = read_avl(&bytes, root);
        assert_eq!(node.totalsize, 10);
        ib.finish();
    }

    #[test]
    fn totalsize_accumulates_across_inserts() {
        // Scenario B from the spec: x/y size 7 atime 50, x/z size 3 atime 200.
        let (mut bytes, offsets, end) = build_trie(&[("x/y", 7, 50), ("x/z", 3, 200)]);
        bytes.resize(bytes.len() + 256, 0);
        let (mut ib, _delta) = IndexBuilder::new(&mut bytes, end, 2);
        for off in &offsets {
            ib.add(&mut bytes, *off);
            ib.tag(&mut bytes);
        }
        let root = root_for(&bytes, ib.roots_offset(), 2);
        ib.finish();

        let total = read_avl(&bytes, root).totalsize;
        assert_eq!(total, 10);
    }

    #[test]
    fn many_inserts_stay_balanced() {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        let mut entries = Vec::new();
        for i in 0..500 {
            entries.push((
                format!("f{i:04}"),
                1u64,
                rng.gen_range(0..1_000_000u64),
            ));
        }
        let refs: Vec<(&str, u64, u64)> = entries.iter().map(|(p, s, a)| (p.as_str(), *s, *a)).collect();
        let (mut bytes, offsets, end) = build_trie(&refs);
        bytes.resize(bytes.len() + 64 * 1024, 0);
        let (mut ib, _delta) = IndexBuilder::new(&mut bytes, end, offsets.len() as u64);
        for off in &offsets {
            ib.add(&mut bytes, *off);
            ib.tag(&mut bytes);
        }
        let root = root_for(&bytes, ib.roots_offset(), offsets.len() as u64);
        let depth = read_avl(&bytes, root).maxdepth;
        // A balanced AVL tree of 500 nodes has depth close to log2(500) (~9).
        assert!(depth < 20, "depth {depth} looks unbalanced for 500 nodes");
        assert_eq!(read_avl(&bytes, root).totalsize, offsets.len() as u64);
        ib.finish();
    }
}

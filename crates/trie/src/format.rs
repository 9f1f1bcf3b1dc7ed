//! Binary encoding of the three trie node variants.
//!
//! Every node begins with an 8-byte tag. Nodes are written at offsets
//! aligned to [`ALIGN`]; the byte layout within a node is otherwise
//! unpadded, since the next node's alignment padding absorbs any slack.

use metadata::Leaf;

/// Alignment, in bytes, of every node's starting offset.
pub const ALIGN: u64 = 8;

const TAG_LEAF: u64 = 0;
const TAG_SWITCH: u64 = 1;
const TAG_STRING: u64 = 2;

/// Round `offset` up to the next multiple of [`ALIGN`].
#[must_use]
pub fn align_up(offset: u64) -> u64 {
    offset.div_ceil(ALIGN) * ALIGN
}

/// Encode a leaf node: tag, size, atime.
#[must_use]
pub fn encode_leaf(leaf: Leaf) -> Vec<u8> {
    let mut buf = Vec::with_capacity(24);
    buf.extend_from_slice(&TAG_LEAF.to_le_bytes());
    buf.extend_from_slice(&leaf.size.to_le_bytes());
    buf.extend_from_slice(&leaf.atime.to_le_bytes());
    buf
}

/// Encode a string (path-compression) node: tag, length, subnode offset,
/// then `literal`.
#[must_use]
pub fn encode_string(literal: &[u8], subnode: u64) -> Vec<u8> {
    let mut buf = Vec::with_capacity(24 + literal.len());
    buf.extend_from_slice(&TAG_STRING.to_le_bytes());
    buf.extend_from_slice(&(literal.len() as u64).to_le_bytes());
    buf.extend_from_slice(&subnode.to_le_bytes());
    buf.extend_from_slice(literal);
    buf
}

/// One entry of a switch node: a discriminating byte plus the subtree it
/// leads to and that subtree's leaf count.
#[derive(Clone, Copy, Debug)]
pub struct SwitchEntry {
    /// Byte that selects this branch.
    pub ch: u8,
    /// Offset of the subnode.
    pub subnode: u64,
    /// Number of leaves under the subnode.
    pub subcount: u64,
}

/// Encode a switch node: tag, entry count, `(subnode, subcount)` pairs in
/// order, then the corresponding discriminating bytes. `entries` must
/// already be sorted by [`collate`] order of `ch`.
#[must_use]
pub fn encode_switch(entries: &[SwitchEntry]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(16 + entries.len() * 17);
    buf.extend_from_slice(&TAG_SWITCH.to_le_bytes());
    buf.extend_from_slice(&(entries.len() as u64).to_le_bytes());
    for e in entries {
        buf.extend_from_slice(&e.subnode.to_le_bytes());
        buf.extend_from_slice(&e.subcount.to_le_bytes());
    }
    for e in entries {
        buf.push(e.ch);
    }
    buf
}

/// A node as read back from the mapped file, borrowing from it.
#[derive(Debug)]
pub enum Node<'a> {
    /// See [`encode_leaf`].
    Leaf(Leaf),
    /// See [`encode_string`].
    String {
        /// Literal path fragment.
        literal: &'a [u8],
        /// Offset of the subnode that follows this fragment.
        subnode: u64,
    },
    /// See [`encode_switch`].
    Switch(SwitchView<'a>),
}

/// A switch node's entries, still packed in the mapped file.
#[derive(Clone, Copy, Debug)]
pub struct SwitchView<'a> {
    count: usize,
    pairs: &'a [u8],
    chars: &'a [u8],
}

impl<'a> SwitchView<'a> {
    /// Number of entries (and thus child branches).
    #[must_use]
    pub fn len(&self) -> usize {
        self.count
    }

    /// Whether there are no entries. A switch node always has at least one
    /// in practice, but the type supports zero for robustness.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// The `i`-th entry.
    #[must_use]
    pub fn entry(&self, i: usize) -> SwitchEntry {
        let base = i * 16;
        let subnode = u64::from_le_bytes(self.pairs[base..base + 8].try_into().unwrap());
        let subcount = u64::from_le_bytes(self.pairs[base + 8..base + 16].try_into().unwrap());
        SwitchEntry {
            ch: self.chars[i],
            subnode,
            subcount,
        }
    }
}

/// Read the node at `offset` in `buf`.
///
/// # Panics
///
/// Panics if `offset` does not point at a validly encoded node. This is a
/// contract violation (a corrupt or foreign file should have already been
/// rejected by [`super::header::Header::parse`]), not a recoverable runtime
/// condition.
#[must_use]
pub fn read_node(buf: &[u8], offset: u64) -> Node<'_> {
    let off = offset as usize;
    let tag = u64::from_le_bytes(buf[off..off + 8].try_into().unwrap());
    match tag {
        TAG_LEAF => {
            let size = u64::from_le_bytes(buf[off + 8..off + 16].try_into().unwrap());
            let atime = u64::from_le_bytes(buf[off + 16..off + 24].try_into().unwrap());
            Node::Leaf(Leaf { size, atime })
        }
        TAG_STRING => {
            let len = u64::from_le_bytes(buf[off + 8..off + 16].try_into().unwrap()) as usize;
            let subnode = u64::from_le_bytes(buf[off + 16..off + 24].try_into().unwrap());
            let literal = &buf[off + 24..off + 24 + len];
            Node::String { literal, subnode }
        }
        TAG_SWITCH => {
            let count = u64::from_le_bytes(buf[off + 8..off + 16].try_into().unwrap()) as usize;
            let pairs_start = off + 16;
            let pairs_len = count * 16;
            let pairs = &buf[pairs_start..pairs_start + pairs_len];
            let chars_start = pairs_start + pairs_len;
            let chars = &buf[chars_start..chars_start + count];
            Node::Switch(SwitchView {
                count,
                pairs,
                chars,
            })
        }
        other => panic!("corrupt trie node tag {other} at offset {offset}"),
    }
}

/// Overwrite a leaf node's atime in place. Used by the directory-mtime
/// propagator, which is the one place the trie is mutated after being
/// built.
pub fn set_leaf_atime(buf: &mut [u8], offset: u64, atime: u64) {
    let off = offset as usize;
    debug_assert_eq!(
        u64::from_le_bytes(buf[off..off + 8].try_into().unwrap()),
        TAG_LEAF
    );
    buf[off + 16..off + 24].copy_from_slice(&atime.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaf_round_trips() {
        let leaf = Leaf {
            size: 12345,
            atime: 67890,
        };
        let bytes = encode_leaf(leaf);
        match read_node(&bytes, 0) {
            Node::Leaf(l) => assert_eq!(l, leaf),
            _ => panic!("expected leaf"),
        }
    }

    #[test]
    fn string_round_trips() {
        let bytes = encode_string(b"hello", 999);
        match read_node(&bytes, 0) {
            Node::String { literal, subnode } => {
                assert_eq!(literal, b"hello");
                assert_eq!(subnode, 999);
            }
            _ => panic!("expected string"),
        }
    }

    #[test]
    fn switch_round_trips() {
        let entries = vec![
            SwitchEntry {
                ch: b'a',
                subnode: 10,
                subcount: 2,
            },
            SwitchEntry {
                ch: b'b',
                subnode: 20,
                subcount: 3,
            },
        ];
        let bytes = encode_switch(&entries);
        match read_node(&bytes, 0) {
            Node::Switch(sw) => {
                assert_eq!(sw.len(), 2);
                let e0 = sw.entry(0);
                assert_eq!((e0.ch, e0.subnode, e0.subcount), (b'a', 10, 2));
                let e1 = sw.entry(1);
                assert_eq!((e1.ch, e1.subnode, e1.subcount), (b'b', 20, 3));
            }
            _ => panic!("expected switch"),
        }
    }

    #[test]
    fn align_up_rounds_to_eight() {
        assert_eq!(align_up(0), 0);
        assert_eq!(align_up(1), 8);
        assert_eq!(align_up(8), 8);
        assert_eq!(align_up(9), 16);
    }
}

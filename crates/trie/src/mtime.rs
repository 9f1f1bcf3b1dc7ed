//! Directory-mtime propagation.
//!
//! A directory's own atime is useless as a "last used" signal: merely
//! stat'ing its contents (including the scan that built this trie) updates
//! it. This pass replaces every directory leaf's atime with the maximum
//! atime found anywhere in its subtree, so a directory can be colored by
//! the most recent access to anything beneath it.

use crate::format::{read_node, set_leaf_atime, Node, SwitchEntry};

/// Rewrite every directory leaf's atime in place, in `buf`, starting from
/// the trie rooted at `root`. Returns the maximum atime in the whole trie.
///
/// A leaf is recognized as a directory leaf when it is reached through a
/// switch entry whose discriminating byte is the NUL terminator and that
/// switch node has at least one other branch — i.e. some other indexed
/// path extends this one. Recursion depth is bounded by the longest
/// indexed pathname (itself bounded by the host's `PATH_MAX`), so plain
/// recursion is used rather than an explicit stack.
pub fn propagate(buf: &mut [u8], root: u64) -> u64 {
    recurse(buf, root)
}

fn recurse(buf: &mut [u8], offset: u64) -> u64 {
    match read_node(buf, offset) {
        Node::Leaf(leaf) => leaf.atime,
        Node::String { subnode, .. } => recurse(buf, subnode),
        Node::Switch(sw) => {
            let entries: Vec<SwitchEntry> = (0..sw.len()).map(|i| sw.entry(i)).collect();
            let mut max_atime = 0u64;
            let mut bare_leaf: Option<u64> = None;

            for e in &entries {
                if e.ch == 0 {
                    bare_leaf = Some(e.subnode);
                    continue;
                }
                max_atime = max_atime.max(recurse(buf, e.subnode));
            }

            if let Some(bare_offset) = bare_leaf {
                let bare_atime = match read_node(buf, bare_offset) {
                    Node::Leaf(l) => l.atime,
                    _ => unreachable!("a switch's NUL branch always points at a leaf"),
                };
                let new_atime = max_atime.max(bare_atime);
                set_leaf_atime(buf, bare_offset, new_atime);
                max_atime = max_atime.max(new_atime);
            }

            max_atime
        }
    }
}

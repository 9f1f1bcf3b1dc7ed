//! Read-only queries over a finished AVL index.

use trie::read_node;
use trie::Node;

use crate::avl::{read_avl, read_root};

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

/// Sum of `size` over the first `i` leaves (in trie index order, 1-indexed)
/// whose atime is strictly less than `atime_cutoff`.
///
/// Returns 0 if `i <= 0`; `i` is clamped to `count`. Walks the AVL tree
/// tagged for the first `i` leaves: at each node, if `atime_cutoff` is at
/// most the node's atime, descend left (everything here and to the right is
/// too recent); otherwise add the left subtree's total plus this node's own
/// size, and descend right.
#[must_use]
pub fn query(buf: &[u8], roots_offset: u64, count: u64, i: i64, atime_cutoff: u64) -> u64 {
    if i <= 0 {
        return 0;
    }
    let i = (i as u64).min(count);
    let mut offset = read_root(buf, roots_offset, i - 1);
    let mut total = 0u64;

    while offset != 0 {
        let node = read_avl(buf, offset);
        let atime = leaf_atime(buf, node.element);

        if atime_cutoff <= atime {
            offset = node.children[0];
        } else {
            if node.children[0] != 0 {
                total += read_avl(buf, node.children[0]).totalsize;
            }
            total += leaf_size(buf, node.element);
            offset = node.children[1];
        }
    }

    total
}

/// Find an atime *a* such that leaves with atime strictly less than *a*
/// account for at most fraction `f` (`0.0..=1.0`) of the tree's total size.
///
/// Walks the final (fully tagged) root, comparing a target size
/// `f * totalsize` against the running left-hand size.
///
/// # Panics
///
/// Panics if `root` is 0 (an empty tree has no order statistic).
#[must_use]
pub fn order_statistic(buf: &[u8], root: u64, f: f64) -> u64 {
    assert_ne!(root, 0, "order_statistic on an empty tree");
    let total = read_avl(buf, root).totalsize;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let mut target = (total as f64 * f) as u64;
    target = target.min(total);

    let mut offset = root;
    loop {
        let node = read_avl(buf, offset);
        let left_size = if node.children[0] != 0 {
            read_avl(buf, node.children[0]).totalsize
        } else {
            0
        };

        if node.children[0] != 0 && target < left_size {
            offset = node.children[0];
        } else if node.children[1] == 0 || target < left_size + leaf_size(buf, node.element) {
            return leaf_atime(buf, node.element);
        } else {
            target -= left_size + leaf_size(buf, node.element);
            offset = node.children[1];
        }
    }
}

//! Persistent (copy-on-write) order-statistic AVL tree over trie leaves,
//! keyed by access time.
//!
//! [`build_index`] drives the whole build: growing the backing file as the
//! tree grows, and dropping "tags" — snapshots of the tree's root at
//! specific points in the walk — at exactly the offsets a directory-range
//! query needs. [`query`] and [`order_statistic`] answer questions against a
//! finished, tagged tree.

#![deny(unsafe_code)]
#![deny(missing_docs)]

mod avl;
mod build;
mod query;
mod remap;

pub use avl::{index_maxdepth, AvlNode};
pub use build::{root_for, IndexBuilder};
pub use query::{order_statistic, query};
pub use remap::{build_index, BuildSummary};

/// Errors from building or querying an index.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// An I/O or mmap error occurred while growing or remapping the file.
    #[error("index build I/O error")]
    Io(#[from] std::io::Error),
}

//! An ordered index over fixed-size pages, mediated by a buffer pool
//! manager: a classic on-disk B+Tree, monomorphized over one of five
//! fixed key widths and always storing [`common::Rid`] as its value.
//!
//! `header` persists each named index's root page id across restarts;
//! `node` defines the on-page byte layout for leaf and internal nodes;
//! `key` is the fixed-width, order-preserving key type; `iterator` walks
//! the leaf chain in ascending order; `tree` is the public [`BPlusTree`]
//! API tying the rest together.

pub mod header;
pub mod iterator;
pub mod key;
pub mod node;
pub mod tree;

pub use iterator::BPlusTreeIterator;
pub use key::{GenericComparator, GenericKey};
pub use tree::BPlusTree;

//! B+Tree engine.
//!
//! This module provides the single-threaded in-memory B+Tree that the worker
//! task owns.
//!
//! # Structure
//!
//! The tree consists of:
//! - Internal nodes: store separator keys and child node ids
//! - Leaf nodes: store key-value pairs, doubly-linked in key order
//!
//! All nodes live in an arena owned by the tree and are addressed by
//! [`NodeId`]. Parent and sibling links are plain ids, so the structure has no
//! reference cycles. Nodes are never freed.
//!
//! # Usage
//!
//! ```
//! use bptree::btree::BPlusTree;
//! use bptree::key::{NaturalOrder, SequentialKeys};
//!
//! let mut tree = BPlusTree::new(4, SequentialKeys::starting_after(0), NaturalOrder);
//! let key = tree.insert("hello").unwrap();
//!
//! assert_eq!(key, 1);
//! assert_eq!(tree.search(&key), Ok(&"hello"));
//! assert_eq!(tree.node_count(), 1);
//! ```

mod node;
mod store;
mod tree;

pub use node::{InternalNode, LeafNode, Node, NodeError, NodeHeader, NodeId, NodeType};
pub use tree::{BPlusTree, HousekeepingReport, MIN_DEGREE, TreeError, TreeStats};

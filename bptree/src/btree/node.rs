//! B+Tree node types.
//!
//! Nodes live in an arena ([`super::store::NodeStore`]) and refer to each
//! other by [`NodeId`]:
//! - Internal nodes: store separator keys and child ids
//! - Leaf nodes: store key-value pairs, doubly-linked for in-order traversal

use std::cmp::Ordering;

use crate::key::KeyComparator;

/// Stable handle of a node in the arena.
///
/// Ids are assigned in allocation order starting at 0 and are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// Position of the node in the arena.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Node type discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    Internal,
    Leaf,
}

/// Bookkeeping shared by both node types.
#[derive(Debug, Clone, Copy)]
pub struct NodeHeader {
    pub id: NodeId,
    pub node_type: NodeType,
    /// `None` only for the root.
    pub parent: Option<NodeId>,
    /// Leaf chain links. Always `None` on internal nodes.
    pub prev_leaf: Option<NodeId>,
    pub next_leaf: Option<NodeId>,
    /// Set on every structural change, cleared by housekeeping.
    pub dirty: bool,
}

impl NodeHeader {
    const fn new(id: NodeId, node_type: NodeType, parent: Option<NodeId>) -> Self {
        Self {
            id,
            node_type,
            parent,
            prev_leaf: None,
            next_leaf: None,
            dirty: true,
        }
    }
}

/// An internal (non-leaf) node.
///
/// Stores N keys and N+1 child ids.
/// `children[i]` contains keys < `keys[i]`
/// `children[i+1]` contains keys >= `keys[i]`
#[derive(Debug)]
pub struct InternalNode<K> {
    pub header: NodeHeader,
    pub keys: Vec<K>,
    /// `children.len()` == `keys.len()` + 1
    pub children: Vec<NodeId>,
}

impl<K: 'static> InternalNode<K> {
    /// Create an internal node with two children split by `key`.
    #[must_use]
    pub fn with_children(id: NodeId, left_child: NodeId, key: K, right_child: NodeId) -> Self {
        Self {
            header: NodeHeader::new(id, NodeType::Internal, None),
            keys: vec![key],
            children: vec![left_child, right_child],
        }
    }

    /// Index of the child that covers `key`.
    ///
    /// Picks the first child whose separator is greater than `key`, otherwise
    /// the last child. Equal keys go right.
    pub fn find_child_index(&self, key: &K, cmp: &dyn KeyComparator<K>) -> usize {
        self.keys
            .iter()
            .position(|separator| cmp.compare(key, separator) == Ordering::Less)
            .unwrap_or(self.keys.len())
    }

    /// Id of the child that covers `key`.
    pub fn child_for(&self, key: &K, cmp: &dyn KeyComparator<K>) -> Result<NodeId, NodeError> {
        let idx = self.find_child_index(key, cmp);
        self.children
            .get(idx)
            .copied()
            .ok_or(NodeError::ChildCountMismatch {
                node: self.header.id,
                keys: self.keys.len(),
                children: self.children.len(),
            })
    }

    /// Record a key promoted by the split of `left_child`.
    ///
    /// `right_child` is placed directly after `left_child` and `key` becomes the
    /// separator between them.
    pub fn record_promotion(
        &mut self,
        left_child: NodeId,
        key: K,
        right_child: NodeId,
    ) -> Result<(), NodeError> {
        let slot = self
            .children
            .iter()
            .position(|&child| child == left_child)
            .ok_or(NodeError::MissingChild {
                parent: self.header.id,
                child: left_child,
            })?;
        if slot > self.keys.len() {
            return Err(NodeError::ChildCountMismatch {
                node: self.header.id,
                keys: self.keys.len(),
                children: self.children.len(),
            });
        }
        self.keys.insert(slot, key);
        self.children.insert(slot + 1, right_child);
        self.header.dirty = true;
        Ok(())
    }

    /// Split the node at `split_point`, returning the promoted key and the new
    /// right node.
    ///
    /// The left node keeps `keys[..split_point]`, the key at `split_point` is
    /// removed and promoted, the right node gets the rest. Children follow so
    /// that both halves keep one more child than keys.
    pub fn split(&mut self, split_point: usize, right_id: NodeId) -> Result<(K, Self), NodeError> {
        if split_point >= self.keys.len() || self.children.len() != self.keys.len() + 1 {
            return Err(NodeError::ChildCountMismatch {
                node: self.header.id,
                keys: self.keys.len(),
                children: self.children.len(),
            });
        }

        let right_keys = self.keys.split_off(split_point + 1);
        let right_children = self.children.split_off(split_point + 1);
        let promoted = self.keys.pop().ok_or(NodeError::Empty(self.header.id))?;
        self.header.dirty = true;

        let right = Self {
            header: NodeHeader::new(right_id, NodeType::Internal, self.header.parent),
            keys: right_keys,
            children: right_children,
        };

        Ok((promoted, right))
    }
}

/// A leaf node.
///
/// Stores key-value pairs and links to sibling leaves.
#[derive(Debug)]
pub struct LeafNode<K, V> {
    pub header: NodeHeader,
    pub keys: Vec<K>,
    /// Index-aligned with `keys`.
    pub values: Vec<V>,
}

impl<K: 'static, V> LeafNode<K, V> {
    /// Create a new empty leaf node.
    #[must_use]
    pub const fn new(id: NodeId, parent: Option<NodeId>) -> Self {
        Self {
            header: NodeHeader::new(id, NodeType::Leaf, parent),
            keys: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Find the index where `key` should be inserted.
    ///
    /// This is the first position whose key is not less than `key`, so a
    /// duplicate lands in front of the existing equal keys.
    pub fn insertion_index(&self, key: &K, cmp: &dyn KeyComparator<K>) -> usize {
        self.keys
            .iter()
            .position(|existing| cmp.compare(key, existing) != Ordering::Greater)
            .unwrap_or(self.keys.len())
    }

    /// Get the value of the first entry equal to `key`.
    pub fn get(&self, key: &K, cmp: &dyn KeyComparator<K>) -> Option<&V> {
        self.keys
            .iter()
            .position(|existing| cmp.compare(key, existing) == Ordering::Equal)
            .and_then(|i| self.values.get(i))
    }

    /// Record a key-value pair in key order.
    pub fn record_entry(&mut self, key: K, value: V, cmp: &dyn KeyComparator<K>) {
        let idx = self.insertion_index(&key, cmp);
        self.keys.insert(idx, key);
        self.values.insert(idx, value);
        self.header.dirty = true;
    }

    /// Split the node at `split_point`, returning the new right node.
    ///
    /// The right node is linked into the leaf chain directly after this one
    /// and inherits this node's old successor. The caller fixes the successor's
    /// back link.
    #[must_use]
    pub fn split(&mut self, split_point: usize, right_id: NodeId) -> Self {
        let right_keys = self.keys.split_off(split_point);
        let right_values = self.values.split_off(split_point);

        let mut header = NodeHeader::new(right_id, NodeType::Leaf, self.header.parent);
        header.prev_leaf = Some(self.header.id);
        header.next_leaf = self.header.next_leaf;

        self.header.next_leaf = Some(right_id);
        self.header.dirty = true;

        Self {
            header,
            keys: right_keys,
            values: right_values,
        }
    }
}

/// A node of either type.
#[derive(Debug)]
pub enum Node<K, V> {
    Internal(InternalNode<K>),
    Leaf(LeafNode<K, V>),
}

impl<K, V> Node<K, V> {
    #[must_use]
    pub const fn header(&self) -> &NodeHeader {
        match self {
            Self::Internal(node) => &node.header,
            Self::Leaf(node) => &node.header,
        }
    }

    pub const fn header_mut(&mut self) -> &mut NodeHeader {
        match self {
            Self::Internal(node) => &mut node.header,
            Self::Leaf(node) => &mut node.header,
        }
    }

    #[must_use]
    pub fn keys(&self) -> &[K] {
        match self {
            Self::Internal(node) => &node.keys,
            Self::Leaf(node) => &node.keys,
        }
    }

    #[must_use]
    pub const fn is_leaf(&self) -> bool {
        matches!(self, Self::Leaf(_))
    }

    /// Child ids, or `None` for a leaf.
    #[must_use]
    pub fn children(&self) -> Option<&[NodeId]> {
        match self {
            Self::Internal(node) => Some(&node.children),
            Self::Leaf(_) => None,
        }
    }
}

/// Errors raised by node-level operations.
///
/// Each one means the tree's structure is not what the algorithms expect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeError {
    /// No node is stored under this id.
    UnknownNode(NodeId),
    /// A new node was built with an id other than the next free one.
    OutOfSequence { expected: NodeId, found: NodeId },
    /// The node is not of the expected type.
    WrongNodeType { node: NodeId, expected: NodeType },
    /// A parent does not list the child that was split.
    MissingChild { parent: NodeId, child: NodeId },
    /// An internal node does not hold one more child than keys.
    ChildCountMismatch {
        node: NodeId,
        keys: usize,
        children: usize,
    },
    /// The node has no keys where at least one is required.
    Empty(NodeId),
}

impl std::fmt::Display for NodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownNode(id) => write!(f, "unknown node {id}"),
            Self::OutOfSequence { expected, found } => {
                write!(f, "node built as {found}, next free id is {expected}")
            }
            Self::WrongNodeType { node, expected } => {
                write!(f, "node {node} is not of type {expected:?}")
            }
            Self::MissingChild { parent, child } => {
                write!(f, "node {parent} does not list child {child}")
            }
            Self::ChildCountMismatch {
                node,
                keys,
                children,
            } => write!(f, "node {node} has {keys} keys but {children} children"),
            Self::Empty(id) => write!(f, "node {id} has no keys"),
        }
    }
}

impl std::error::Error for NodeError {}

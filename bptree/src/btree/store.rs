//! Arena that owns every node of a tree.
//!
//! Nodes are appended and never freed, so a [`NodeId`] stays valid for the
//! lifetime of the store. The number of allocations is mirrored into a shared
//! atomic counter that other tasks may read without touching the nodes.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::node::{InternalNode, LeafNode, Node, NodeError, NodeId, NodeType};

/// Owner of all nodes of one tree.
#[derive(Debug)]
pub struct NodeStore<K, V> {
    nodes: Vec<Node<K, V>>,
    allocated: Arc<AtomicU64>,
}

impl<K, V> NodeStore<K, V> {
    /// Create a store holding a single empty leaf, which becomes the root.
    ///
    /// The counter is reset and then reports that one node.
    #[must_use]
    pub fn with_root(allocated: Arc<AtomicU64>) -> (Self, NodeId)
    where
        K: 'static,
    {
        let root = NodeId(0);
        allocated.store(1, Ordering::SeqCst);
        let store = Self {
            nodes: vec![Node::Leaf(LeafNode::new(root, None))],
            allocated,
        };
        (store, root)
    }

    /// Id the next allocated node will receive.
    #[must_use]
    pub fn next_id(&self) -> NodeId {
        NodeId(self.nodes.len())
    }

    /// Take ownership of `node`, returning its id.
    ///
    /// The node must have been built with [`Self::next_id`].
    pub fn allocate(&mut self, node: Node<K, V>) -> Result<NodeId, NodeError> {
        let id = self.next_id();
        if node.header().id != id {
            return Err(NodeError::OutOfSequence {
                expected: id,
                found: node.header().id,
            });
        }
        self.nodes.push(node);
        let count = self.allocated.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::trace!("allocated node {id}, node count is now {count}");
        Ok(id)
    }

    /// Number of nodes ever allocated.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, id: NodeId) -> Result<&Node<K, V>, NodeError> {
        self.nodes.get(id.0).ok_or(NodeError::UnknownNode(id))
    }

    pub fn node_mut(&mut self, id: NodeId) -> Result<&mut Node<K, V>, NodeError> {
        self.nodes.get_mut(id.0).ok_or(NodeError::UnknownNode(id))
    }

    pub fn leaf(&self, id: NodeId) -> Result<&LeafNode<K, V>, NodeError> {
        match self.node(id)? {
            Node::Leaf(leaf) => Ok(leaf),
            Node::Internal(_) => Err(NodeError::WrongNodeType {
                node: id,
                expected: NodeType::Leaf,
            }),
        }
    }

    pub fn leaf_mut(&mut self, id: NodeId) -> Result<&mut LeafNode<K, V>, NodeError> {
        match self.node_mut(id)? {
            Node::Leaf(leaf) => Ok(leaf),
            Node::Internal(_) => Err(NodeError::WrongNodeType {
                node: id,
                expected: NodeType::Leaf,
            }),
        }
    }

    pub fn internal_mut(&mut self, id: NodeId) -> Result<&mut InternalNode<K>, NodeError> {
        match self.node_mut(id)? {
            Node::Internal(node) => Ok(node),
            Node::Leaf(_) => Err(NodeError::WrongNodeType {
                node: id,
                expected: NodeType::Internal,
            }),
        }
    }

    /// Point `id` at a new parent.
    pub fn set_parent(&mut self, id: NodeId, parent: NodeId) -> Result<(), NodeError> {
        let header = self.node_mut(id)?.header_mut();
        header.parent = Some(parent);
        header.dirty = true;
        Ok(())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Node<K, V>> {
        self.nodes.iter_mut()
    }
}

//! The B+Tree engine.
//!
//! Single-threaded: one owner mutates it at a time. Concurrent access goes
//! through [`crate::Tree`], which hands every operation to a worker task that
//! owns the engine.
//!
//! Capacities are derived from the degree `d`:
//! - a leaf splits once it holds more than `d - 1` keys, at `d / 2`
//! - an internal node splits once it holds more than `d` keys, at
//!   `d / 2 + d % 2`, promoting the key at the split point

use std::cmp::Ordering;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;

use crate::btree::node::{InternalNode, LeafNode, Node, NodeError, NodeId};
use crate::btree::store::NodeStore;
use crate::key::{KeyComparator, KeyContext, KeyGenerator};

/// Smallest supported degree. Smaller values are raised to this.
pub const MIN_DEGREE: usize = 3;

/// An in-memory B+Tree mapping generated keys to values.
pub struct BPlusTree<K, V> {
    store: NodeStore<K, V>,
    root: NodeId,
    degree: usize,
    entries: usize,
    housekeeping_passes: u64,
    generator: Box<dyn KeyGenerator<K, V>>,
    comparator: Box<dyn KeyComparator<K>>,
}

impl<K: Clone + 'static, V: 'static> BPlusTree<K, V> {
    /// Create an empty tree with a single leaf root.
    ///
    /// `degree` is clamped to at least [`MIN_DEGREE`].
    pub fn new(
        degree: usize,
        generator: impl KeyGenerator<K, V>,
        comparator: impl KeyComparator<K>,
    ) -> Self {
        Self::with_node_counter(
            degree,
            Box::new(generator),
            Box::new(comparator),
            Arc::new(AtomicU64::new(0)),
        )
    }

    /// Create an empty tree that publishes its node count into `node_counter`.
    pub(crate) fn with_node_counter(
        degree: usize,
        generator: Box<dyn KeyGenerator<K, V>>,
        comparator: Box<dyn KeyComparator<K>>,
        node_counter: Arc<AtomicU64>,
    ) -> Self {
        let (store, root) = NodeStore::with_root(node_counter);

        Self {
            store,
            root,
            degree: degree.max(MIN_DEGREE),
            entries: 0,
            housekeeping_passes: 0,
            generator,
            comparator,
        }
    }

    /// The effective (clamped) degree.
    #[must_use]
    pub const fn degree(&self) -> usize {
        self.degree
    }

    /// Total number of nodes ever allocated.
    #[must_use]
    pub fn node_count(&self) -> u64 {
        self.store.len() as u64
    }

    /// Number of stored entries.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.entries
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.entries == 0
    }

    /// Housekeeping passes run so far.
    #[must_use]
    pub const fn housekeeping_passes(&self) -> u64 {
        self.housekeeping_passes
    }

    #[must_use]
    pub const fn root(&self) -> NodeId {
        self.root
    }

    /// Look at a node by id.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&Node<K, V>> {
        self.store.node(id).ok()
    }

    /// Number of levels, counting the leaves. A lone leaf root has depth 1.
    pub fn depth(&self) -> Result<usize, TreeError> {
        let mut depth = 1;
        let mut current = self.root;
        while let Node::Internal(node) = self.store.node(current)? {
            current = *node
                .children
                .first()
                .ok_or(NodeError::Empty(node.header.id))?;
            depth += 1;
        }
        Ok(depth)
    }

    /// Insert a value under a freshly generated key.
    ///
    /// Returns the generated key.
    pub fn insert(&mut self, value: V) -> Result<K, TreeError> {
        let ctx = KeyContext {
            degree: self.degree,
            node_count: self.node_count(),
            entry_count: self.entries,
            housekeeping_passes: self.housekeeping_passes,
        };
        let key = self.generator.generate(&ctx, &value);

        let leaf_id = self.find_leaf(&key)?;
        let capacity = self.leaf_capacity();
        let leaf = self.store.leaf_mut(leaf_id)?;
        leaf.record_entry(key.clone(), value, self.comparator.as_ref());
        let overfull = leaf.keys.len() > capacity;
        self.entries += 1;

        if overfull {
            self.split_leaf(leaf_id)?;
        }

        Ok(key)
    }

    /// Look up the value stored under `key`.
    pub fn search(&self, key: &K) -> Result<&V, TreeError> {
        let leaf_id = self.find_leaf(key)?;
        self.store
            .leaf(leaf_id)?
            .get(key, self.comparator.as_ref())
            .ok_or(TreeError::NotFound)
    }

    /// Replace the value stored under `key`.
    ///
    /// Not supported; the tree is left untouched.
    pub fn update(&mut self, _key: &K, _value: V) -> Result<(), TreeError> {
        Err(TreeError::NotImplemented { operation: "update" })
    }

    /// Remove the entry stored under `key`.
    ///
    /// Not supported; the tree is left untouched.
    pub fn delete(&mut self, _key: &K) -> Result<(), TreeError> {
        Err(TreeError::NotImplemented { operation: "delete" })
    }

    /// Periodic maintenance pass.
    ///
    /// Counts and clears the dirty markers. Never changes the structure.
    pub fn housekeeping(&mut self) -> HousekeepingReport {
        let mut dirty_nodes = 0;
        for node in self.store.iter_mut() {
            let header = node.header_mut();
            if header.dirty {
                dirty_nodes += 1;
                header.dirty = false;
            }
        }
        self.housekeeping_passes += 1;

        HousekeepingReport {
            pass: self.housekeeping_passes,
            node_count: self.node_count(),
            entries: self.entries,
            dirty_nodes,
        }
    }

    /// Leaves in chain order, starting from the leftmost leaf.
    pub fn leaf_chain(&self) -> Result<Vec<NodeId>, TreeError> {
        let mut chain = Vec::new();
        let mut current = Some(self.leftmost_leaf()?);
        while let Some(id) = current {
            if chain.len() >= self.store.len() {
                return Err(TreeError::InternalInconsistency(format!(
                    "leaf chain loops back at {id}"
                )));
            }
            chain.push(id);
            current = self.store.leaf(id)?.header.next_leaf;
        }
        Ok(chain)
    }

    /// Check every structural invariant of the tree.
    pub fn validate(&self) -> Result<TreeStats, TreeError> {
        let mut stats = TreeStats {
            nodes: 0,
            leaves: 0,
            internal_nodes: 0,
            depth: 0,
            entries: 0,
        };
        let mut leaves_in_order = Vec::new();
        let mut leaf_depth = None;

        // (node, expected parent, lower bound, upper bound, depth)
        let mut stack: Vec<(NodeId, Option<NodeId>, Option<&K>, Option<&K>, usize)> =
            vec![(self.root, None, None, None, 1)];

        while let Some((id, parent, lower, upper, depth)) = stack.pop() {
            let node = self.store.node(id)?;
            let header = node.header();
            stats.nodes += 1;

            if stats.nodes > self.store.len() {
                return Err(inconsistency(format!("node {id} is reachable twice")));
            }
            if header.id != id {
                return Err(inconsistency(format!("node {id} carries id {}", header.id)));
            }
            if header.parent != parent {
                return Err(inconsistency(format!(
                    "node {id} has parent {:?}, expected {parent:?}",
                    header.parent
                )));
            }
            self.check_key_order(id, node.keys(), lower, upper)?;

            match node {
                Node::Leaf(leaf) => {
                    self.check_leaf(leaf)?;
                    if *leaf_depth.get_or_insert(depth) != depth {
                        return Err(inconsistency(format!(
                            "leaf {id} at depth {depth}, other leaves at {leaf_depth:?}"
                        )));
                    }
                    stats.leaves += 1;
                    stats.entries += leaf.keys.len();
                    leaves_in_order.push(id);
                }
                Node::Internal(internal) => {
                    self.check_internal(internal)?;
                    stats.internal_nodes += 1;
                    // Push right to left so children pop in key order.
                    for (i, &child) in internal.children.iter().enumerate().rev() {
                        let child_lower = if i == 0 { lower } else { internal.keys.get(i - 1) };
                        let child_upper = internal.keys.get(i).or(upper);
                        stack.push((child, Some(id), child_lower, child_upper, depth + 1));
                    }
                }
            }
        }

        if stats.nodes != self.store.len() {
            return Err(inconsistency(format!(
                "{} nodes reachable from the root, {} allocated",
                stats.nodes,
                self.store.len()
            )));
        }
        if stats.entries != self.entries {
            return Err(inconsistency(format!(
                "{} entries in leaves, {} recorded",
                stats.entries, self.entries
            )));
        }
        self.check_leaf_chain(&leaves_in_order)?;

        stats.depth = leaf_depth.unwrap_or(1);
        Ok(stats)
    }

    const fn leaf_capacity(&self) -> usize {
        self.degree - 1
    }

    const fn internal_capacity(&self) -> usize {
        self.degree
    }

    /// Find the leaf that covers `key`.
    fn find_leaf(&self, key: &K) -> Result<NodeId, TreeError> {
        let mut current = self.root;
        loop {
            match self.store.node(current)? {
                Node::Leaf(_) => return Ok(current),
                Node::Internal(node) => {
                    current = node.child_for(key, self.comparator.as_ref())?;
                }
            }
        }
    }

    fn leftmost_leaf(&self) -> Result<NodeId, TreeError> {
        let mut current = self.root;
        while let Node::Internal(node) = self.store.node(current)? {
            current = *node
                .children
                .first()
                .ok_or(NodeError::Empty(node.header.id))?;
        }
        Ok(current)
    }

    /// Split an overfull leaf and promote the first key of the new sibling.
    fn split_leaf(&mut self, leaf_id: NodeId) -> Result<(), TreeError> {
        let right_id = self.store.next_id();
        let split_point = self.degree / 2;
        let right = self.store.leaf_mut(leaf_id)?.split(split_point, right_id);

        let promoted = right
            .keys
            .first()
            .cloned()
            .ok_or(NodeError::Empty(right_id))?;
        let parent = right.header.parent;
        let old_next = right.header.next_leaf;
        let (left_len, right_len) = (split_point, right.keys.len());

        self.store.allocate(Node::Leaf(right))?;
        if let Some(next_id) = old_next {
            let next = self.store.leaf_mut(next_id)?;
            next.header.prev_leaf = Some(right_id);
            next.header.dirty = true;
        }

        tracing::debug!(
            "split leaf {leaf_id} into {leaf_id} ({left_len} keys) and {right_id} ({right_len} keys)"
        );

        self.promote(leaf_id, promoted, right_id, parent)
    }

    /// Split an overfull internal node and promote its middle key.
    fn split_internal(&mut self, node_id: NodeId) -> Result<(), TreeError> {
        let right_id = self.store.next_id();
        let split_point = self.degree / 2 + self.degree % 2;
        let (promoted, right) = self
            .store
            .internal_mut(node_id)?
            .split(split_point, right_id)?;

        for &child in &right.children {
            self.store.set_parent(child, right_id)?;
        }
        let parent = right.header.parent;
        let moved = right.children.len();
        self.store.allocate(Node::Internal(right))?;

        tracing::debug!("split internal node {node_id}, moved {moved} children to {right_id}");

        self.promote(node_id, promoted, right_id, parent)
    }

    /// Insert a promoted key into the parent of a split node.
    fn promote(
        &mut self,
        left: NodeId,
        key: K,
        right: NodeId,
        parent: Option<NodeId>,
    ) -> Result<(), TreeError> {
        let Some(parent_id) = parent else {
            return self.create_new_root(left, key, right);
        };

        let capacity = self.internal_capacity();
        let parent_node = self.store.internal_mut(parent_id)?;
        parent_node.record_promotion(left, key, right)?;
        let overfull = parent_node.keys.len() > capacity;
        self.store.set_parent(right, parent_id)?;

        if overfull {
            self.split_internal(parent_id)?;
        }
        Ok(())
    }

    /// Create a new root above a split root.
    fn create_new_root(&mut self, left: NodeId, key: K, right: NodeId) -> Result<(), TreeError> {
        let root_id = self.store.next_id();
        self.store.allocate(Node::Internal(InternalNode::with_children(
            root_id, left, key, right,
        )))?;
        self.store.set_parent(left, root_id)?;
        self.store.set_parent(right, root_id)?;
        self.root = root_id;

        tracing::debug!("new root {root_id} above {left} and {right}");
        Ok(())
    }

    fn check_key_order(
        &self,
        id: NodeId,
        keys: &[K],
        lower: Option<&K>,
        upper: Option<&K>,
    ) -> Result<(), TreeError> {
        let cmp = self.comparator.as_ref();
        for pair in keys.windows(2) {
            if cmp.compare(&pair[0], &pair[1]) == Ordering::Greater {
                return Err(inconsistency(format!("keys of node {id} are out of order")));
            }
        }
        for key in keys {
            if lower.is_some_and(|bound| cmp.compare(key, bound) == Ordering::Less) {
                return Err(inconsistency(format!(
                    "node {id} holds a key below its separator"
                )));
            }
            // Keys equal to a separator may remain on its left after a split of
            // duplicates, so only strictly greater keys are out of range.
            if upper.is_some_and(|bound| cmp.compare(key, bound) == Ordering::Greater) {
                return Err(inconsistency(format!(
                    "node {id} holds a key above its separator"
                )));
            }
        }
        Ok(())
    }

    fn check_leaf(&self, leaf: &LeafNode<K, V>) -> Result<(), TreeError> {
        let id = leaf.header.id;
        if leaf.keys.len() != leaf.values.len() {
            return Err(inconsistency(format!(
                "leaf {id} has {} keys but {} values",
                leaf.keys.len(),
                leaf.values.len()
            )));
        }
        if leaf.keys.len() > self.leaf_capacity() {
            return Err(inconsistency(format!(
                "leaf {id} holds {} keys, capacity is {}",
                leaf.keys.len(),
                self.leaf_capacity()
            )));
        }
        Ok(())
    }

    fn check_internal(&self, node: &InternalNode<K>) -> Result<(), TreeError> {
        let id = node.header.id;
        if node.children.len() != node.keys.len() + 1 {
            return Err(NodeError::ChildCountMismatch {
                node: id,
                keys: node.keys.len(),
                children: node.children.len(),
            }
            .into());
        }
        if node.keys.is_empty() {
            return Err(NodeError::Empty(id).into());
        }
        if node.keys.len() > self.internal_capacity() {
            return Err(inconsistency(format!(
                "internal node {id} holds {} keys, capacity is {}",
                node.keys.len(),
                self.internal_capacity()
            )));
        }
        if node.header.prev_leaf.is_some() || node.header.next_leaf.is_some() {
            return Err(inconsistency(format!(
                "internal node {id} is linked into the leaf chain"
            )));
        }
        Ok(())
    }

    /// The chain must visit exactly the leaves found by the walk, in the same
    /// order, with back links mirroring forward links.
    fn check_leaf_chain(&self, leaves_in_order: &[NodeId]) -> Result<(), TreeError> {
        let chain = self.leaf_chain()?;
        if chain != leaves_in_order {
            return Err(inconsistency(format!(
                "leaf chain {chain:?} does not match tree order {leaves_in_order:?}"
            )));
        }

        let mut previous = None;
        for &id in &chain {
            let leaf = self.store.leaf(id)?;
            if leaf.header.prev_leaf != previous {
                return Err(inconsistency(format!(
                    "leaf {id} links back to {:?}, expected {previous:?}",
                    leaf.header.prev_leaf
                )));
            }
            if let (Some(prev_id), Some(first)) = (previous, leaf.keys.first()) {
                let prev_last = self.store.leaf(prev_id)?.keys.last();
                if prev_last.is_some_and(|last| {
                    self.comparator.compare(last, first) == Ordering::Greater
                }) {
                    return Err(inconsistency(format!(
                        "leaf {prev_id} ends above the start of leaf {id}"
                    )));
                }
            }
            previous = Some(id);
        }
        Ok(())
    }
}

impl<K, V> std::fmt::Debug for BPlusTree<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BPlusTree")
            .field("root", &self.root)
            .field("degree", &self.degree)
            .field("nodes", &self.store.len())
            .field("entries", &self.entries)
            .finish_non_exhaustive()
    }
}

fn inconsistency(message: String) -> TreeError {
    TreeError::InternalInconsistency(message)
}

/// Shape of a tree as measured by [`BPlusTree::validate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeStats {
    pub nodes: usize,
    pub leaves: usize,
    pub internal_nodes: usize,
    pub depth: usize,
    pub entries: usize,
}

/// Outcome of a housekeeping pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HousekeepingReport {
    /// One-based number of this pass.
    pub pass: u64,
    pub node_count: u64,
    pub entries: usize,
    /// Nodes modified since the previous pass.
    pub dirty_nodes: usize,
}

/// Errors that can occur during tree operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    /// The key is not in the tree.
    NotFound,
    /// The operation is part of the interface but not supported.
    NotImplemented { operation: &'static str },
    /// The structure violates an invariant the algorithms rely on.
    InternalInconsistency(String),
    /// The worker that owns the tree has stopped.
    Stopped,
}

impl std::fmt::Display for TreeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound => write!(f, "provided key not found"),
            Self::NotImplemented { operation } => write!(f, "{operation} is not implemented"),
            Self::InternalInconsistency(message) => {
                write!(f, "tree is internally inconsistent: {message}")
            }
            Self::Stopped => write!(f, "tree worker has stopped"),
        }
    }
}

impl std::error::Error for TreeError {}

impl From<NodeError> for TreeError {
    fn from(e: NodeError) -> Self {
        Self::InternalInconsistency(e.to_string())
    }
}

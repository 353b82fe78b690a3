//! In-memory B-tree of order `t` over `u32` keys.
//!
//! Nodes live in an arena and refer to each other by `NodeId`. Every payload
//! sits in a leaf; internal nodes only route. Full nodes are split on the way
//! down, so an insert never has to walk back up the tree.
//!
//! Duplicate keys are accepted. A duplicate goes after every equal key, and
//! `search` returns the most recently inserted one.

use std::collections::HashSet;
use std::fmt::Write as _;

use crate::storage::btree::node::{
    InternalNode, Key, LeafEntry, LeafNode, Node, NodeError, NodeId, Payload, max_keys, max_order,
    min_keys,
};
use crate::storage::io::StoreError;
use crate::storage::page::PageId;

/// A B-tree holding `V` payloads in its leaves.
#[derive(Debug, Clone)]
pub struct BTree<V> {
    nodes: Vec<Node<V>>,
    root: NodeId,
    order: usize,
    len: usize,
}

impl<V: Payload> BTree<V> {
    /// Create an empty tree: a single leaf root.
    ///
    /// Fails if `order < 2` or a full node of this order does not fit in a page.
    pub fn new(order: usize) -> Result<Self, BTreeError> {
        check_order::<V>(order)?;
        Ok(Self {
            nodes: vec![Node::Leaf(LeafNode::new())],
            root: 0,
            order,
            len: 0,
        })
    }
}

/// Reject orders that are degenerate or too large for a page.
pub fn check_order<V: Payload>(order: usize) -> Result<(), BTreeError> {
    let max = max_order::<V>();
    if order < 2 || order > max {
        return Err(BTreeError::InvalidOrder { order, max });
    }
    Ok(())
}

impl<V> BTree<V> {
    /// Assemble a tree from decoded nodes. The caller validates it.
    pub(crate) const fn from_parts(
        nodes: Vec<Node<V>>,
        root: NodeId,
        order: usize,
        len: usize,
    ) -> Self {
        Self {
            nodes,
            root,
            order,
            len,
        }
    }

    /// Number of entries in the tree, duplicates included.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Handle of the root node.
    #[must_use]
    pub const fn root(&self) -> NodeId {
        self.root
    }

    /// Look up a node by handle.
    ///
    /// # Panics
    ///
    /// Panics if `id` did not come from this tree.
    #[must_use]
    pub fn node(&self, id: NodeId) -> &Node<V> {
        &self.nodes[id]
    }

    /// Number of nodes in the tree.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of levels; a lone leaf root has height 1.
    #[must_use]
    pub fn height(&self) -> usize {
        let mut height = 1;
        let mut current = self.root;
        while let Node::Internal(node) = &self.nodes[current] {
            current = node.children[0];
            height += 1;
        }
        height
    }

    /// Insert a key/payload pair.
    pub fn insert(&mut self, key: Key, value: V) {
        if self.nodes[self.root].is_full(self.order) {
            let old_root = self.root;
            self.root = self.push(Node::Internal(InternalNode {
                keys: Vec::new(),
                children: vec![old_root],
            }));
            self.split_child(self.root, 0, old_root);
            tracing::debug!(height = self.height(), "split root");
        }

        let mut current = self.root;
        loop {
            let (index, mut child) = match &self.nodes[current] {
                Node::Leaf(_) => break,
                Node::Internal(node) => {
                    let index = node.child_index(key);
                    (index, node.children[index])
                }
            };
            if self.nodes[child].is_full(self.order) {
                let (separator, sibling) = self.split_child(current, index, child);
                if key >= separator {
                    child = sibling;
                }
            }
            current = child;
        }

        if let Node::Leaf(leaf) = &mut self.nodes[current] {
            leaf.insert(key, value);
            self.len += 1;
        }
    }

    /// Split the full child at `index` of `parent`.
    ///
    /// Returns the separator pushed into `parent` and the new right sibling.
    fn split_child(&mut self, parent: NodeId, index: usize, child: NodeId) -> (Key, NodeId) {
        let order = self.order;
        let (separator, sibling) = match &mut self.nodes[child] {
            Node::Leaf(leaf) => {
                let (separator, right) = leaf.split(order);
                (separator, Node::Leaf(right))
            }
            Node::Internal(node) => {
                let (median, right) = node.split(order);
                (median, Node::Internal(right))
            }
        };
        let sibling = self.push(sibling);

        debug_assert!(!self.nodes[parent].is_leaf(), "split parent must be internal");
        if let Node::Internal(node) = &mut self.nodes[parent] {
            node.adopt(index, separator, sibling);
        }
        (separator, sibling)
    }

    fn push(&mut self, node: Node<V>) -> NodeId {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    /// Find the payload for `key`; the latest one if it was inserted twice.
    #[must_use]
    pub fn search(&self, key: Key) -> Option<&V> {
        let mut current = self.root;
        loop {
            match &self.nodes[current] {
                Node::Leaf(leaf) => return leaf.get(key),
                Node::Internal(node) => current = node.children[node.child_index(key)],
            }
        }
    }

    /// Largest key in the tree.
    #[must_use]
    pub fn last_key(&self) -> Option<Key> {
        let mut current = self.root;
        loop {
            match &self.nodes[current] {
                Node::Leaf(leaf) => return leaf.entries.last().map(|e| e.key),
                Node::Internal(node) => current = *node.children.last()?,
            }
        }
    }

    /// Iterate over all entries in key order.
    #[must_use]
    pub fn iter(&self) -> Iter<'_, V> {
        Iter {
            nodes: &self.nodes,
            stack: vec![self.root],
            entries: std::slice::Iter::default(),
        }
    }

    /// Check the structural invariants.
    ///
    /// Every leaf at the same depth, keys ordered within and across nodes,
    /// node sizes within `[t-1, 2t-1]` (root excepted), `k + 1` children per
    /// internal node with `k` keys, and every node reachable exactly once.
    pub fn validate(&self) -> Result<(), BTreeError> {
        let min = min_keys(self.order);
        let max = max_keys(self.order);
        let mut seen = HashSet::new();
        let mut leaf_depth = None;
        let mut entries = 0;

        // (node, depth, lower bound, upper bound), bounds inclusive
        let mut stack = vec![(self.root, 1usize, None, None)];
        while let Some((id, depth, lower, upper)) = stack.pop() {
            if !seen.insert(id) {
                return Err(invariant(format!("node {id} is reachable twice")));
            }

            let node = &self.nodes[id];
            let count = node.len();
            if count > max {
                return Err(invariant(format!("node {id} holds {count} keys (max {max})")));
            }
            if id != self.root && count < min {
                return Err(invariant(format!("node {id} holds {count} keys (min {min})")));
            }

            let keys: Vec<Key> = match node {
                Node::Leaf(leaf) => leaf.entries.iter().map(|e| e.key).collect(),
                Node::Internal(internal) => internal.keys.clone(),
            };
            if keys.windows(2).any(|pair| pair[0] > pair[1]) {
                return Err(invariant(format!("node {id} keys are out of order")));
            }
            let in_range = |k: &Key| {
                lower.is_none_or(|lo| *k >= lo) && upper.is_none_or(|hi| *k <= hi)
            };
            if !keys.iter().all(in_range) {
                return Err(invariant(format!("node {id} has a key outside its parent's range")));
            }

            match node {
                Node::Leaf(leaf) => {
                    entries += leaf.entries.len();
                    match leaf_depth {
                        None => leaf_depth = Some(depth),
                        Some(d) if d != depth => {
                            return Err(invariant(format!(
                                "leaf {id} at depth {depth}, expected {d}"
                            )));
                        }
                        Some(_) => {}
                    }
                }
                Node::Internal(internal) => {
                    if internal.keys.is_empty() {
                        return Err(invariant(format!("internal node {id} has no keys")));
                    }
                    if internal.children.len() != internal.keys.len() + 1 {
                        return Err(invariant(format!(
                            "internal node {id} has {} keys and {} children",
                            internal.keys.len(),
                            internal.children.len()
                        )));
                    }
                    for (i, &child) in internal.children.iter().enumerate() {
                        let lo = if i == 0 { lower } else { Some(internal.keys[i - 1]) };
                        let hi = internal.keys.get(i).copied().or(upper);
                        stack.push((child, depth + 1, lo, hi));
                    }
                }
            }
        }

        if seen.len() != self.nodes.len() {
            return Err(invariant(format!(
                "{} of {} nodes are unreachable",
                self.nodes.len() - seen.len(),
                self.nodes.len()
            )));
        }
        if entries != self.len {
            return Err(invariant(format!(
                "tree counts {} entries but leaves hold {entries}",
                self.len
            )));
        }
        Ok(())
    }

    /// Render the tree one node per line, children indented under parents.
    ///
    /// ```text
    /// ROOT: 2
    ///   L: 0 1
    ///   R: 2 3 4
    /// ```
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        let mut stack = vec![(self.root, "ROOT", 0usize)];
        while let Some((id, label, depth)) = stack.pop() {
            let _ = write!(out, "{:indent$}{label}:", "", indent = depth * 2);
            match &self.nodes[id] {
                Node::Leaf(leaf) => {
                    for entry in &leaf.entries {
                        let _ = write!(out, " {}", entry.key);
                    }
                    out.push('\n');
                }
                Node::Internal(node) => {
                    for key in &node.keys {
                        let _ = write!(out, " {key}");
                    }
                    out.push('\n');
                    let last = node.children.len() - 1;
                    for (i, &child) in node.children.iter().enumerate().rev() {
                        let label = match i {
                            0 => "L",
                            i if i == last => "R",
                            _ => "M",
                        };
                        stack.push((child, label, depth + 1));
                    }
                }
            }
        }
        out
    }
}

/// Two trees are equal when they have the same order and the same shape,
/// with equal keys and payloads node for node.
impl<V: PartialEq> PartialEq for BTree<V> {
    fn eq(&self, other: &Self) -> bool {
        if self.order != other.order || self.len != other.len {
            return false;
        }

        let mut stack = vec![(self.root, other.root)];
        while let Some((a, b)) = stack.pop() {
            match (&self.nodes[a], &other.nodes[b]) {
                (Node::Leaf(a), Node::Leaf(b)) => {
                    if a != b {
                        return false;
                    }
                }
                (Node::Internal(a), Node::Internal(b)) => {
                    if a.keys != b.keys || a.children.len() != b.children.len() {
                        return false;
                    }
                    stack.extend(a.children.iter().copied().zip(b.children.iter().copied()));
                }
                _ => return false,
            }
        }
        true
    }
}

impl<V: Eq> Eq for BTree<V> {}

/// In-order iterator over a tree's entries.
pub struct Iter<'a, V> {
    nodes: &'a [Node<V>],
    /// Subtrees still to visit, leftmost on top.
    stack: Vec<NodeId>,
    entries: std::slice::Iter<'a, LeafEntry<V>>,
}

impl<'a, V> Iterator for Iter<'a, V> {
    type Item = (Key, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(entry) = self.entries.next() {
                return Some((entry.key, &entry.value));
            }
            match &self.nodes[self.stack.pop()?] {
                Node::Leaf(leaf) => self.entries = leaf.entries.iter(),
                Node::Internal(node) => self.stack.extend(node.children.iter().rev()),
            }
        }
    }
}

impl<'a, V> IntoIterator for &'a BTree<V> {
    type Item = (Key, &'a V);
    type IntoIter = Iter<'a, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

fn invariant(message: String) -> BTreeError {
    BTreeError::Invariant(message)
}

/// Errors that can occur during B-tree operations.
#[derive(Debug)]
pub enum BTreeError {
    /// Order below 2, or too large for a node to fit in a page.
    InvalidOrder { order: usize, max: usize },
    /// Storage error.
    Store(StoreError),
    /// A node page failed to decode.
    Node { page_id: PageId, source: NodeError },
    /// A node refers to a child page that was never written.
    MissingPage(PageId),
    /// A page is referenced more than once (shared subtree or cycle).
    SharedPage(PageId),
    /// The decoded tree breaks a structural invariant.
    Invariant(String),
}

impl std::fmt::Display for BTreeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidOrder { order, max } => {
                write!(f, "invalid B-tree order {order} (must be 2..={max})")
            }
            Self::Store(e) => write!(f, "storage error: {e}"),
            Self::Node { page_id, source } => write!(f, "corrupt node on page {page_id}: {source}"),
            Self::MissingPage(page_id) => write!(f, "missing child page {page_id}"),
            Self::SharedPage(page_id) => write!(f, "page {page_id} is referenced more than once"),
            Self::Invariant(message) => write!(f, "invalid tree: {message}"),
        }
    }
}

impl std::error::Error for BTreeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Store(e) => Some(e),
            Self::Node { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<StoreError> for BTreeError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

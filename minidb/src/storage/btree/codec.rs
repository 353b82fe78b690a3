//! Persisting a tree to pages and loading it back.
//!
//! A tree is written bottom-up: children first, so that every internal node
//! can record its children's page numbers, and the root last, always to page
//! 0. Non-root nodes get fresh pages from `allocate_page` on every persist;
//! pages from earlier persists are never reused.
//!
//! Writes go straight through to storage and nothing is journaled. A failure
//! partway through leaves the newly written pages unreferenced; because the
//! root is written last, page 0 keeps whatever it held before.

use std::collections::HashSet;

use crate::storage::btree::node::{
    DecodedNode, InternalNode, LeafNode, Node, NodeId, Payload, decode_node, encode_internal,
    encode_leaf, max_keys,
};
use crate::storage::btree::tree::{BTree, BTreeError, check_order};
use crate::storage::io::Storage;
use crate::storage::page::{PageId, ROOT_PAGE};

/// Write the subtree rooted at `node` and return the page it landed on.
///
/// The root (`is_root`) goes to page 0; every other node to a freshly
/// allocated page.
pub fn encode_and_store<V: Payload, S: Storage>(
    tree: &BTree<V>,
    node: NodeId,
    store: &mut S,
    is_root: bool,
) -> Result<PageId, BTreeError> {
    let bytes = match tree.node(node) {
        Node::Leaf(leaf) => encode_leaf(&leaf.entries),
        Node::Internal(internal) => {
            let mut child_pages = Vec::with_capacity(internal.children.len());
            for &child in &internal.children {
                child_pages.push(encode_and_store(tree, child, store, false)?);
            }
            encode_internal(&internal.keys, &child_pages)
        }
    };

    let page_id = if is_root {
        ROOT_PAGE
    } else {
        store.allocate_page()?
    };
    store.set_page(page_id, &bytes)?;
    Ok(page_id)
}

/// Rebuild the tree whose root is on `root_page`.
///
/// Every reachable page is read exactly once. The result is validated before
/// it is returned, so a successfully decoded tree always satisfies the B-tree
/// invariants for `order`.
pub fn decode<V: Payload, S: Storage>(
    store: &mut S,
    root_page: PageId,
    order: usize,
) -> Result<BTree<V>, BTreeError> {
    check_order::<V>(order)?;
    let max = max_keys(order);

    let mut nodes: Vec<Node<V>> = Vec::new();
    let mut visited = HashSet::new();
    let mut len = 0;

    // (page, slot in the parent that should point at it)
    let mut pending: Vec<(PageId, Option<(NodeId, usize)>)> = vec![(root_page, None)];
    while let Some((page_id, slot)) = pending.pop() {
        if !visited.insert(page_id) {
            return Err(BTreeError::SharedPage(page_id));
        }
        let page = store
            .get_page(page_id)?
            .ok_or(BTreeError::MissingPage(page_id))?;
        let decoded =
            decode_node::<V>(page, max).map_err(|source| BTreeError::Node { page_id, source })?;

        let id = nodes.len();
        match decoded {
            DecodedNode::Leaf(entries) => {
                len += entries.len();
                nodes.push(Node::Leaf(LeafNode { entries }));
            }
            DecodedNode::Internal { keys, children } => {
                pending.extend(
                    children
                        .iter()
                        .enumerate()
                        .rev()
                        .map(|(index, &child)| (child, Some((id, index)))),
                );
                // Filled in as each child is decoded
                let placeholders = vec![0; children.len()];
                nodes.push(Node::Internal(InternalNode {
                    keys,
                    children: placeholders,
                }));
            }
        }

        if let Some((parent, index)) = slot {
            if let Node::Internal(node) = &mut nodes[parent] {
                node.children[index] = id;
            }
        }
    }

    let tree = BTree::from_parts(nodes, 0, order, len);
    tree.validate()?;
    Ok(tree)
}

impl<V: Payload> BTree<V> {
    /// Write the whole tree to `store`, root on page 0.
    pub fn persist<S: Storage>(&self, store: &mut S) -> Result<(), BTreeError> {
        encode_and_store(self, self.root(), store, true)?;
        tracing::debug!(
            nodes = self.node_count(),
            entries = self.len(),
            "persisted tree"
        );
        Ok(())
    }

    /// Load the tree rooted at page 0, or `None` if page 0 was never written.
    pub fn load<S: Storage>(store: &mut S, order: usize) -> Result<Option<Self>, BTreeError> {
        if store.get_page(ROOT_PAGE)?.is_none() {
            return Ok(None);
        }
        let tree = decode(store, ROOT_PAGE, order)?;
        tracing::debug!(
            nodes = tree.node_count(),
            entries = tree.len(),
            height = tree.height(),
            "loaded tree"
        );
        Ok(Some(tree))
    }
}

//! B-tree index for the table.
//!
//! The tree is built and queried in memory and written to pages as a whole.
//!
//! # Structure
//!
//! - Internal nodes: separator keys and child references
//! - Leaf nodes: key/payload entries, payloads fixed-width (see [`Payload`])
//!
//! # Usage
//!
//! ```
//! use minidb::storage::MemoryStorage;
//! use minidb::storage::btree::BTree;
//!
//! let mut tree = BTree::<()>::new(3).expect("valid order");
//! for key in [5, 1, 9, 3] {
//!     tree.insert(key, ());
//! }
//! assert!(tree.search(9).is_some());
//!
//! let mut store = MemoryStorage::new();
//! tree.persist(&mut store).expect("persist");
//! let loaded = BTree::<()>::load(&mut store, 3).expect("load");
//! assert_eq!(loaded.as_ref(), Some(&tree));
//! ```

mod codec;
mod node;
mod tree;

pub use codec::{decode, encode_and_store};
pub use node::{
    DecodedNode, InternalNode, KEY_SIZE, Key, LeafEntry, LeafNode, Node, NodeError, NodeHeader,
    NodeId, NodeType, Payload, PayloadError, decode_node, encode_internal, encode_leaf,
    fits_in_page, max_keys, max_order, min_keys,
};
pub use tree::{BTree, BTreeError, Iter, check_order};

//! B-tree node types and single-page serialization.
//!
//! Page layout (all integers little-endian):
//!
//! ```text
//! +-----------+---------+-----------+----------------------------------+
//! | leaf_flag | padding | count     | body                             |
//! | 1 byte    | 3 bytes | u32       |                                  |
//! +-----------+---------+-----------+----------------------------------+
//! leaf body:     count x (u32 key + payload[W])
//! internal body: count x (u32 key), then (count + 1) x (u32 child page)
//! ```
//!
//! Bytes after the body are zero up to the page boundary.

use crate::storage::page::{PAGE_SIZE, Page, PageId};

/// A primary key.
pub type Key = u32;

/// Size of a key in bytes.
pub const KEY_SIZE: usize = 4;

/// Size of a child page reference in bytes.
pub const CHILD_REF_SIZE: usize = 4;

/// Handle of a node inside a tree's arena.
pub type NodeId = usize;

/// Maximum number of keys (or entries) a node of the given order may hold.
#[must_use]
pub const fn max_keys(order: usize) -> usize {
    2 * order - 1
}

/// Minimum number of keys (or entries) a non-root node of the given order holds.
#[must_use]
pub const fn min_keys(order: usize) -> usize {
    order - 1
}

/// Fixed-width value stored next to each key in a leaf.
pub trait Payload: Sized {
    /// Encoded width in bytes.
    const WIDTH: usize;

    /// Encode into `buf`, which is exactly `WIDTH` zeroed bytes.
    fn encode(&self, buf: &mut [u8]);

    /// Decode from exactly `WIDTH` bytes.
    fn decode(buf: &[u8]) -> Result<Self, PayloadError>;
}

/// Bare keys: a set rather than a map.
impl Payload for () {
    const WIDTH: usize = 0;

    fn encode(&self, _buf: &mut [u8]) {}

    fn decode(_buf: &[u8]) -> Result<Self, PayloadError> {
        Ok(())
    }
}

impl<const N: usize> Payload for [u8; N] {
    const WIDTH: usize = N;

    fn encode(&self, buf: &mut [u8]) {
        buf.copy_from_slice(self);
    }

    fn decode(buf: &[u8]) -> Result<Self, PayloadError> {
        buf.try_into()
            .map_err(|_| PayloadError(format!("expected {N} bytes, got {}", buf.len())))
    }
}

/// A payload could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadError(pub String);

impl std::fmt::Display for PayloadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid payload: {}", self.0)
    }
}

impl std::error::Error for PayloadError {}

/// Largest order whose fullest leaf and internal node still fit in one page.
#[must_use]
pub const fn max_order<V: Payload>() -> usize {
    let mut order = 2;
    while fits_in_page::<V>(order + 1) {
        order += 1;
    }
    order
}

/// Whether a full node of the given order fits in one page.
#[must_use]
pub const fn fits_in_page<V: Payload>(order: usize) -> bool {
    let keys = max_keys(order);
    leaf_size::<V>(keys) <= PAGE_SIZE && internal_size(keys) <= PAGE_SIZE
}

/// Encoded size of a leaf with `count` entries.
#[must_use]
pub const fn leaf_size<V: Payload>(count: usize) -> usize {
    NodeHeader::SIZE + count * (KEY_SIZE + V::WIDTH)
}

/// Encoded size of an internal node with `count` keys.
#[must_use]
pub const fn internal_size(count: usize) -> usize {
    NodeHeader::SIZE + count * KEY_SIZE + (count + 1) * CHILD_REF_SIZE
}

/// Node type discriminant, stored as the leaf flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NodeType {
    Internal = 0,
    Leaf = 1,
}

impl TryFrom<u8> for NodeType {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Internal),
            1 => Ok(Self::Leaf),
            _ => Err(value),
        }
    }
}

/// Header at the start of every node page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeHeader {
    pub node_type: NodeType,
    pub key_count: u32,
}

impl NodeHeader {
    /// Size of the header in bytes, padding included.
    pub const SIZE: usize = 8;

    const FLAG_OFFSET: usize = 0;
    const COUNT_OFFSET: usize = 4;

    /// Read a node header from a page.
    pub fn from_page(page: &Page) -> Result<Self, NodeError> {
        let node_type = NodeType::try_from(page.read_u8(Self::FLAG_OFFSET))
            .map_err(NodeError::InvalidNodeType)?;
        let key_count = page.read_u32(Self::COUNT_OFFSET);
        Ok(Self {
            node_type,
            key_count,
        })
    }

    /// Serialize the header to bytes.
    #[must_use]
    pub fn to_bytes(self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[Self::FLAG_OFFSET] = self.node_type as u8;
        // bytes 1-3 padding
        buf[Self::COUNT_OFFSET..].copy_from_slice(&self.key_count.to_le_bytes());
        buf
    }
}

/// A key/payload entry in a leaf node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafEntry<V> {
    pub key: Key,
    pub value: V,
}

/// A leaf node: entries in non-decreasing key order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafNode<V> {
    pub entries: Vec<LeafEntry<V>>,
}

impl<V> LeafNode<V> {
    /// Create a new empty leaf node.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Position after every entry whose key is `<= key`.
    #[must_use]
    pub fn upper_bound(&self, key: Key) -> usize {
        self.entries.partition_point(|e| e.key <= key)
    }

    /// Get the most recently inserted value for `key`.
    #[must_use]
    pub fn get(&self, key: Key) -> Option<&V> {
        let index = self.upper_bound(key).checked_sub(1)?;
        let entry = &self.entries[index];
        (entry.key == key).then_some(&entry.value)
    }

    /// Insert an entry after any existing entries with an equal key.
    pub fn insert(&mut self, key: Key, value: V) {
        let index = self.upper_bound(key);
        self.entries.insert(index, LeafEntry { key, value });
    }

    /// Split a full leaf (`2t - 1` entries).
    ///
    /// Keeps entries `[0, t-1)` and returns the median's key together with a
    /// new leaf holding entries `[t-1, 2t-1)`, median first.
    #[must_use]
    pub fn split(&mut self, order: usize) -> (Key, Self) {
        let upper = self.entries.split_off(order - 1);
        let separator = upper[0].key;
        (separator, Self { entries: upper })
    }
}

impl<V> Default for LeafNode<V> {
    fn default() -> Self {
        Self::new()
    }
}

/// An internal node.
///
/// `children[i]` holds keys `<= keys[i]`, `children[i + 1]` holds keys
/// `>= keys[i]`. `children.len() == keys.len() + 1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalNode {
    pub keys: Vec<Key>,
    pub children: Vec<NodeId>,
}

impl InternalNode {
    /// Index of the child whose subtree receives `key`.
    #[must_use]
    pub fn child_index(&self, key: Key) -> usize {
        self.keys.partition_point(|&k| k <= key)
    }

    /// Split a full internal node (`2t - 1` keys, `2t` children).
    ///
    /// Keeps keys `[0, t-1)` and the first `t` children; returns the median
    /// key and a new node with keys `[t, 2t-1)` and the last `t` children.
    #[must_use]
    pub fn split(&mut self, order: usize) -> (Key, Self) {
        let median = self.keys[order - 1];
        let keys = self.keys.split_off(order);
        let children = self.children.split_off(order);
        self.keys.truncate(order - 1);
        (median, Self { keys, children })
    }

    /// Link a split child's new sibling in after position `index`.
    pub fn adopt(&mut self, index: usize, separator: Key, sibling: NodeId) {
        self.keys.insert(index, separator);
        self.children.insert(index + 1, sibling);
    }
}

/// A B-tree node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node<V> {
    Leaf(LeafNode<V>),
    Internal(InternalNode),
}

impl<V> Node<V> {
    /// Number of entries (leaf) or keys (internal).
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Leaf(leaf) => leaf.entries.len(),
            Self::Internal(node) => node.keys.len(),
        }
    }

    /// Whether the node holds no entries or keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub const fn is_leaf(&self) -> bool {
        matches!(self, Self::Leaf(_))
    }

    /// Whether the node holds `2t - 1` entries or keys.
    #[must_use]
    pub fn is_full(&self, order: usize) -> bool {
        self.len() >= max_keys(order)
    }
}

/// Encode a leaf into page bytes (header and body, no trailing padding).
#[must_use]
#[allow(clippy::cast_possible_truncation)] // counts are bounded by the page size
pub fn encode_leaf<V: Payload>(entries: &[LeafEntry<V>]) -> Vec<u8> {
    let header = NodeHeader {
        node_type: NodeType::Leaf,
        key_count: entries.len() as u32,
    };

    let mut buf = Vec::with_capacity(leaf_size::<V>(entries.len()));
    buf.extend_from_slice(&header.to_bytes());
    for entry in entries {
        buf.extend_from_slice(&entry.key.to_le_bytes());
        let start = buf.len();
        buf.resize(start + V::WIDTH, 0);
        entry.value.encode(&mut buf[start..]);
    }
    buf
}

/// Encode an internal node into page bytes given its children's page numbers.
#[must_use]
#[allow(clippy::cast_possible_truncation)] // counts are bounded by the page size
pub fn encode_internal(keys: &[Key], child_pages: &[PageId]) -> Vec<u8> {
    debug_assert_eq!(child_pages.len(), keys.len() + 1);
    let header = NodeHeader {
        node_type: NodeType::Internal,
        key_count: keys.len() as u32,
    };

    let mut buf = Vec::with_capacity(internal_size(keys.len()));
    buf.extend_from_slice(&header.to_bytes());
    for key in keys {
        buf.extend_from_slice(&key.to_le_bytes());
    }
    for page_id in child_pages {
        buf.extend_from_slice(&page_id.to_le_bytes());
    }
    buf
}

/// A node read back from a page; children are still page numbers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedNode<V> {
    Leaf(Vec<LeafEntry<V>>),
    Internal {
        keys: Vec<Key>,
        children: Vec<PageId>,
    },
}

/// Decode a node page, rejecting nodes with more than `max_keys` keys.
pub fn decode_node<V: Payload>(page: &Page, max_keys: usize) -> Result<DecodedNode<V>, NodeError> {
    let header = NodeHeader::from_page(page)?;
    let count = header.key_count as usize;
    if count > max_keys {
        return Err(NodeError::TooManyKeys {
            count: header.key_count,
            max: max_keys,
        });
    }

    match header.node_type {
        NodeType::Leaf => {
            let needed = leaf_size::<V>(count);
            if needed > PAGE_SIZE {
                return Err(NodeError::Truncated { needed });
            }

            let mut entries = Vec::with_capacity(count);
            let mut offset = NodeHeader::SIZE;
            for _ in 0..count {
                let key = page.read_u32(offset);
                offset += KEY_SIZE;
                let value = V::decode(page.read_bytes(offset, V::WIDTH))?;
                offset += V::WIDTH;
                entries.push(LeafEntry { key, value });
            }
            Ok(DecodedNode::Leaf(entries))
        }
        NodeType::Internal => {
            if count == 0 {
                return Err(NodeError::EmptyInternal);
            }
            let needed = internal_size(count);
            if needed > PAGE_SIZE {
                return Err(NodeError::Truncated { needed });
            }

            let mut offset = NodeHeader::SIZE;
            let mut keys = Vec::with_capacity(count);
            for _ in 0..count {
                keys.push(page.read_u32(offset));
                offset += KEY_SIZE;
            }
            let mut children = Vec::with_capacity(count + 1);
            for _ in 0..=count {
                children.push(page.read_u32(offset));
                offset += CHILD_REF_SIZE;
            }
            Ok(DecodedNode::Internal { keys, children })
        }
    }
}

/// Errors that can occur when decoding a node page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeError {
    /// Leaf flag is neither 0 nor 1.
    InvalidNodeType(u8),
    /// More keys than a node of this order may hold.
    TooManyKeys { count: u32, max: usize },
    /// The declared contents run past the end of the page.
    Truncated { needed: usize },
    /// Internal node without keys.
    EmptyInternal,
    /// A leaf payload failed to decode.
    Payload(PayloadError),
}

impl std::fmt::Display for NodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidNodeType(v) => write!(f, "invalid leaf flag: 0x{v:02x}"),
            Self::TooManyKeys { count, max } => {
                write!(f, "node holds {count} keys (max {max})")
            }
            Self::Truncated { needed } => {
                write!(f, "node needs {needed} bytes (page size {PAGE_SIZE})")
            }
            Self::EmptyInternal => write!(f, "internal node has no keys"),
            Self::Payload(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for NodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Payload(e) => Some(e),
            _ => None,
        }
    }
}

impl From<PayloadError> for NodeError {
    fn from(e: PayloadError) -> Self {
        Self::Payload(e)
    }
}

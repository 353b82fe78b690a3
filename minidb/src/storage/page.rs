//! Page types and constants for the storage engine.
//!
//! The storage engine uses 4KB pages as the fundamental unit of I/O.

/// Page size in bytes (4KB).
pub const PAGE_SIZE: usize = 4096;

/// Page size as u64 for offset calculations.
pub const PAGE_SIZE_U64: u64 = PAGE_SIZE as u64;

/// Maximum number of distinct pages a database file may hold.
pub const TABLE_MAX_PAGES: u32 = 100;

/// A page identifier (0-indexed page number).
///
/// Page 0 always holds the root of the B-tree.
pub type PageId = u32;

/// Page number reserved for the tree root.
pub const ROOT_PAGE: PageId = 0;

/// Byte offset of a page within the backing file.
#[must_use]
pub const fn page_offset(page_id: PageId) -> u64 {
    page_id as u64 * PAGE_SIZE_U64
}

/// A raw page buffer.
#[derive(Clone, PartialEq, Eq)]
pub struct Page {
    data: Box<[u8; PAGE_SIZE]>,
}

impl Page {
    /// Create a new zeroed page.
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: Box::new([0u8; PAGE_SIZE]),
        }
    }

    /// Create a page from up to `PAGE_SIZE` bytes, zero-padding the rest.
    ///
    /// Returns `None` if `bytes` is longer than a page.
    #[must_use]
    pub fn from_prefix(bytes: &[u8]) -> Option<Self> {
        if bytes.len() > PAGE_SIZE {
            return None;
        }
        let mut page = Self::new();
        page.data[..bytes.len()].copy_from_slice(bytes);
        Some(page)
    }

    /// Get the raw page data.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; PAGE_SIZE] {
        &self.data
    }

    /// Read bytes at a specific offset.
    #[must_use]
    pub fn read_bytes(&self, offset: usize, len: usize) -> &[u8] {
        &self.data[offset..offset + len]
    }

    /// Read a u8 at the given offset.
    #[must_use]
    pub fn read_u8(&self, offset: usize) -> u8 {
        self.data[offset]
    }

    /// Read a u32 (little-endian) at the given offset.
    #[must_use]
    pub fn read_u32(&self, offset: usize) -> u32 {
        u32::from_le_bytes([
            self.data[offset],
            self.data[offset + 1],
            self.data[offset + 2],
            self.data[offset + 3],
        ])
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Page")
            .field("first_16_bytes", &&self.data[..16])
            .finish_non_exhaustive()
    }
}

//! Storage abstraction over page-granular I/O.
//!
//! The B-tree codec only ever talks to a `Storage`. Production code uses the
//! file-backed `PageStore`; tests can swap in `MemoryStorage`, which keeps
//! pages in memory and can inject write faults.
//!
//! # Contract
//!
//! Implementations must ensure:
//! - `get_page` returns the last content written with `set_page`, or `None`
//!   for a page that has never been written
//! - `set_page` is durable once it returns (write-through, no buffering window)
//! - `allocate_page` never returns page 0 and never hands out the same page
//!   twice before it is written
//! - every page number `>= capacity()` is rejected with `PageOutOfBounds`

use crate::storage::page::{Page, PageId};

/// Errors that can occur during storage operations.
#[derive(Debug)]
pub enum StoreError {
    /// I/O error.
    Io(std::io::Error),
    /// Page number at or beyond the configured capacity.
    PageOutOfBounds { page_id: PageId, capacity: u32 },
    /// Data handed to `set_page` does not fit in a page.
    PageOverflow { len: usize },
    /// Every page number under the capacity is in use.
    AllocationExhausted { capacity: u32 },
    /// Injected fault for simulation.
    InjectedFault(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::PageOutOfBounds { page_id, capacity } => {
                write!(f, "page {page_id} out of bounds (capacity: {capacity})")
            }
            Self::PageOverflow { len } => write!(
                f,
                "page data too large: {len} bytes (max {})",
                crate::storage::page::PAGE_SIZE
            ),
            Self::AllocationExhausted { capacity } => {
                write!(f, "all {capacity} pages are allocated")
            }
            Self::InjectedFault(msg) => write!(f, "injected fault: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// Abstraction over page-based storage operations.
pub trait Storage {
    /// Number of distinct page numbers this storage accepts.
    fn capacity(&self) -> u32;

    /// Read a page, loading it into the cache on first access.
    ///
    /// Returns `Ok(None)` if the page has never been written.
    fn get_page(&mut self, page_id: PageId) -> Result<Option<&Page>, StoreError>;

    /// Write up to `PAGE_SIZE` bytes to a page, zero-padding the remainder.
    fn set_page(&mut self, page_id: PageId, data: &[u8]) -> Result<(), StoreError>;

    /// Reserve the lowest unused page number, never page 0.
    fn allocate_page(&mut self) -> Result<PageId, StoreError>;

    /// Number of pages `allocate_page` could still hand out.
    fn free_pages(&self) -> usize;
}

/// Check a page number against a storage capacity.
pub(crate) const fn check_bounds(page_id: PageId, capacity: u32) -> Result<(), StoreError> {
    if page_id >= capacity {
        return Err(StoreError::PageOutOfBounds { page_id, capacity });
    }
    Ok(())
}

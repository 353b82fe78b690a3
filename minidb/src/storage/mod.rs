//! Paged storage engine.
//!
//! A single file of fixed 4KB pages holds one B-tree:
//!
//! - Page 0: the tree root
//! - Pages 1-N: the remaining nodes, one per page, allocated lowest-first
//!
//! # Usage
//!
//! ```ignore
//! use minidb::storage::{PageStore, Storage};
//!
//! let mut store = PageStore::open(path)?;
//!
//! // Page 0 is reserved for the root; other pages are allocated
//! let page_id = store.allocate_page()?;
//! store.set_page(page_id, b"hello")?;
//!
//! let page = store.get_page(page_id)?;
//! store.close()?;
//! ```

pub mod btree;
mod file;
mod io;
mod memory;
mod page;

pub use file::PageStore;
pub use io::{Storage, StoreError};
pub use memory::{FaultConfig, MemoryStorage};
pub use page::{PAGE_SIZE, Page, PageId, ROOT_PAGE, TABLE_MAX_PAGES};

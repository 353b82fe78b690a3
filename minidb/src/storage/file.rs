//! Database file I/O operations.
//!
//! `PageStore` caches pages of a single backing file. Pages are loaded lazily
//! on first access and stay resident for the lifetime of the store; there is
//! no eviction, so the whole working set must fit in memory. Every write goes
//! straight through to the file.
//!
//! Allocation only knows about pages this store has read or written. A page
//! that exists on disk but was never touched counts as free.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::storage::io::{Storage, StoreError, check_bounds};
use crate::storage::page::{PAGE_SIZE, PAGE_SIZE_U64, Page, PageId, TABLE_MAX_PAGES, page_offset};

/// State of one cache slot.
#[derive(Debug)]
enum Slot {
    /// Not loaded and not handed out.
    Vacant,
    /// Handed out by `allocate_page` but not written yet.
    Reserved,
    /// Loaded from disk or written through this store.
    Resident(Page),
}

/// A file-backed page cache and allocator.
#[derive(Debug)]
pub struct PageStore {
    file: File,
    path: PathBuf,
    file_length: u64,
    capacity: u32,
    pages: Vec<Slot>,
}

impl PageStore {
    /// Open (or create) the database file at `path` with the default capacity.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        Self::open_with_capacity(path, TABLE_MAX_PAGES)
    }

    /// Open (or create) the database file at `path`.
    ///
    /// `capacity` bounds the page numbers this store will accept.
    pub fn open_with_capacity(path: &Path, capacity: u32) -> Result<Self, StoreError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        let file_length = file.metadata()?.len();

        let mut pages = Vec::with_capacity(capacity as usize);
        pages.resize_with(capacity as usize, || Slot::Vacant);

        tracing::debug!(
            path = %path.display(),
            file_length,
            capacity,
            "opened page store"
        );

        Ok(Self {
            file,
            path: path.to_path_buf(),
            file_length,
            capacity,
            pages,
        })
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush OS buffers and release the file handle.
    pub fn close(self) -> Result<(), StoreError> {
        self.file.sync_all()?;
        tracing::debug!(path = %self.path.display(), "closed page store");
        Ok(())
    }

    /// Read one page from disk, or `None` if the file does not reach it.
    fn read_from_disk(&mut self, page_id: PageId) -> Result<Option<Page>, StoreError> {
        let offset = page_offset(page_id);
        if offset >= self.file_length {
            return Ok(None);
        }

        self.file.seek(SeekFrom::Start(offset))?;
        let mut buf = Vec::with_capacity(PAGE_SIZE);
        (&mut self.file).take(PAGE_SIZE_U64).read_to_end(&mut buf)?;
        if buf.is_empty() {
            return Ok(None);
        }

        // A short read is the partially written last page; the rest is zeros.
        Ok(Page::from_prefix(&buf))
    }
}

impl Storage for PageStore {
    fn capacity(&self) -> u32 {
        self.capacity
    }

    fn get_page(&mut self, page_id: PageId) -> Result<Option<&Page>, StoreError> {
        check_bounds(page_id, self.capacity)?;
        let index = page_id as usize;

        if matches!(self.pages[index], Slot::Vacant) {
            if let Some(page) = self.read_from_disk(page_id)? {
                tracing::debug!(page_id, "loaded page from disk");
                self.pages[index] = Slot::Resident(page);
            }
        }

        match &self.pages[index] {
            Slot::Resident(page) => Ok(Some(page)),
            Slot::Vacant | Slot::Reserved => Ok(None),
        }
    }

    fn set_page(&mut self, page_id: PageId, data: &[u8]) -> Result<(), StoreError> {
        let page = Page::from_prefix(data).ok_or(StoreError::PageOverflow { len: data.len() })?;
        check_bounds(page_id, self.capacity)?;

        let offset = page_offset(page_id);
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(page.as_bytes())?;
        self.file.sync_data()?;

        self.file_length = self.file_length.max(offset + PAGE_SIZE_U64);
        self.pages[page_id as usize] = Slot::Resident(page);

        tracing::debug!(page_id, len = data.len(), "wrote page");
        Ok(())
    }

    fn allocate_page(&mut self) -> Result<PageId, StoreError> {
        let free = self
            .pages
            .iter()
            .enumerate()
            .skip(1)
            .find(|(_, slot)| matches!(slot, Slot::Vacant))
            .map(|(index, _)| index);

        let Some(index) = free else {
            return Err(StoreError::AllocationExhausted {
                capacity: self.capacity,
            });
        };

        self.pages[index] = Slot::Reserved;
        let page_id = PageId::try_from(index).map_err(|_| StoreError::AllocationExhausted {
            capacity: self.capacity,
        })?;
        tracing::debug!(page_id, "allocated page");
        Ok(page_id)
    }

    fn free_pages(&self) -> usize {
        self.pages
            .iter()
            .skip(1)
            .filter(|slot| matches!(slot, Slot::Vacant))
            .count()
    }
}

//! Simulated in-memory storage for deterministic testing.
//!
//! `MemoryStorage` follows the same contract as `PageStore` but keeps every
//! page in a map. It can inject write failures, either after a fixed number of
//! successful writes or at random with a seeded RNG, which makes the
//! non-atomic nature of a multi-page persist observable.

use std::collections::{HashMap, HashSet};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::storage::io::{Storage, StoreError, check_bounds};
use crate::storage::page::{Page, PageId, TABLE_MAX_PAGES};

/// Configuration for fault injection.
#[derive(Debug, Clone, Default)]
pub struct FaultConfig {
    /// Fail every write once this many writes have succeeded.
    pub fail_after_writes: Option<u64>,
    /// Probability of a write error (0.0 - 1.0).
    pub write_error_rate: f64,
}

impl FaultConfig {
    /// Create a fault config with no faults (for baseline testing).
    #[must_use]
    pub fn no_faults() -> Self {
        Self::default()
    }

    /// Fail every write after the first `writes` succeed.
    #[must_use]
    pub const fn fail_after(writes: u64) -> Self {
        Self {
            fail_after_writes: Some(writes),
            write_error_rate: 0.0,
        }
    }
}

/// In-memory storage implementation for deterministic testing.
#[derive(Debug)]
pub struct MemoryStorage {
    /// Written pages.
    pages: HashMap<PageId, Page>,
    /// Pages handed out by `allocate_page` but not written yet.
    reserved: HashSet<PageId>,
    capacity: u32,
    /// Number of successful writes so far.
    writes: u64,
    fault_config: FaultConfig,
    rng: StdRng,
}

impl MemoryStorage {
    /// Create an empty storage with the default capacity and no faults.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(TABLE_MAX_PAGES)
    }

    /// Create an empty storage with the given capacity and no faults.
    #[must_use]
    pub fn with_capacity(capacity: u32) -> Self {
        Self::with_faults(capacity, FaultConfig::no_faults(), 0)
    }

    /// Create an empty storage that injects faults per `fault_config`.
    #[must_use]
    pub fn with_faults(capacity: u32, fault_config: FaultConfig, seed: u64) -> Self {
        Self {
            pages: HashMap::new(),
            reserved: HashSet::new(),
            capacity,
            writes: 0,
            fault_config,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Number of successful writes so far.
    #[must_use]
    pub const fn writes(&self) -> u64 {
        self.writes
    }

    /// Whether the page has been written.
    #[must_use]
    pub fn contains(&self, page_id: PageId) -> bool {
        self.pages.contains_key(&page_id)
    }

    /// Stop injecting faults, e.g. to inspect state after a simulated crash.
    pub fn clear_faults(&mut self) {
        self.fault_config = FaultConfig::no_faults();
    }

    fn should_fail_write(&mut self) -> bool {
        if self
            .fault_config
            .fail_after_writes
            .is_some_and(|limit| self.writes >= limit)
        {
            return true;
        }
        self.fault_config.write_error_rate > 0.0
            && self.rng.random::<f64>() < self.fault_config.write_error_rate
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage for MemoryStorage {
    fn capacity(&self) -> u32 {
        self.capacity
    }

    fn get_page(&mut self, page_id: PageId) -> Result<Option<&Page>, StoreError> {
        check_bounds(page_id, self.capacity)?;
        Ok(self.pages.get(&page_id))
    }

    fn set_page(&mut self, page_id: PageId, data: &[u8]) -> Result<(), StoreError> {
        let page = Page::from_prefix(data).ok_or(StoreError::PageOverflow { len: data.len() })?;
        check_bounds(page_id, self.capacity)?;

        if self.should_fail_write() {
            return Err(StoreError::InjectedFault(format!(
                "write to page {page_id} failed"
            )));
        }

        self.reserved.remove(&page_id);
        self.pages.insert(page_id, page);
        self.writes += 1;
        Ok(())
    }

    fn allocate_page(&mut self) -> Result<PageId, StoreError> {
        let page_id = (1..self.capacity)
            .find(|p| !self.pages.contains_key(p) && !self.reserved.contains(p))
            .ok_or(StoreError::AllocationExhausted {
                capacity: self.capacity,
            })?;
        self.reserved.insert(page_id);
        Ok(page_id)
    }

    fn free_pages(&self) -> usize {
        (1..self.capacity)
            .filter(|p| !self.pages.contains_key(p) && !self.reserved.contains(p))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_storage_roundtrip() {
        let mut storage = MemoryStorage::new();
        assert!(storage.get_page(0).expect("get").is_none());

        storage.set_page(0, b"root").expect("set");
        let page = storage.get_page(0).expect("get").expect("present");
        assert_eq!(page.read_bytes(0, 4), b"root");
        assert_eq!(storage.writes(), 1);
    }

    #[test]
    fn test_memory_storage_allocation() {
        let mut storage = MemoryStorage::with_capacity(3);
        assert_eq!(storage.free_pages(), 2);
        assert_eq!(storage.allocate_page().expect("allocate"), 1);
        assert_eq!(storage.allocate_page().expect("allocate"), 2);
        assert_eq!(storage.free_pages(), 0);
        assert!(matches!(
            storage.allocate_page(),
            Err(StoreError::AllocationExhausted { capacity: 3 })
        ));
    }

    #[test]
    fn test_fail_after_writes() {
        let mut storage = MemoryStorage::with_faults(10, FaultConfig::fail_after(2), 0);
        storage.set_page(1, b"a").expect("first write");
        storage.set_page(2, b"b").expect("second write");
        assert!(matches!(
            storage.set_page(3, b"c"),
            Err(StoreError::InjectedFault(_))
        ));
        assert!(!storage.contains(3));

        storage.clear_faults();
        storage.set_page(3, b"c").expect("write after clearing faults");
    }

    #[test]
    fn test_random_faults_are_deterministic() {
        let config = FaultConfig {
            fail_after_writes: None,
            write_error_rate: 0.5,
        };
        let outcomes = |seed| {
            let mut storage = MemoryStorage::with_faults(100, config.clone(), seed);
            (1..50)
                .map(|p| storage.set_page(p, b"x").is_ok())
                .collect::<Vec<_>>()
        };

        assert_eq!(outcomes(7), outcomes(7));
        assert!(outcomes(7).contains(&false));
    }
}

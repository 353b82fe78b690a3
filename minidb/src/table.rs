//! A single table of rows, indexed by id.
//!
//! The table owns its storage and an in-memory B-tree. The tree is loaded
//! from page 0 when the table opens and written back, whole, when it closes;
//! nothing reaches the file in between.

use crate::config::DbConfig;
use crate::row::Row;
use crate::storage::btree::{BTree, BTreeError};
use crate::storage::{PageStore, Storage, StoreError};

/// A table of rows over some page storage.
#[derive(Debug)]
pub struct Table<S = PageStore> {
    store: S,
    tree: BTree<Row>,
    num_rows: usize,
    max_rows: usize,
}

impl Table<PageStore> {
    /// Open the table in the database file named by `config`.
    pub fn open(config: &DbConfig) -> Result<Self, TableError> {
        let store = PageStore::open(&config.database_file)?;
        let table = Self::open_with_store(store, config.order, config.max_rows)?;
        tracing::info!(
            path = %config.database_file.display(),
            rows = table.num_rows,
            "opened table"
        );
        Ok(table)
    }

    /// Persist the tree and close the file.
    pub fn close(self) -> Result<(), TableError> {
        let rows = self.num_rows;
        let store = self.shutdown()?;
        let path = store.path().to_path_buf();
        store.close()?;
        tracing::info!(path = %path.display(), rows, "closed table");
        Ok(())
    }
}

impl<S: Storage> Table<S> {
    /// Open the table stored in `store`, or start an empty one.
    pub fn open_with_store(mut store: S, order: usize, max_rows: usize) -> Result<Self, TableError> {
        let tree = match BTree::load(&mut store, order)? {
            Some(tree) => tree,
            None => BTree::new(order)?,
        };
        let num_rows = tree.len();
        Ok(Self {
            store,
            tree,
            num_rows,
            max_rows,
        })
    }

    /// Insert a row under its id.
    ///
    /// Fails without touching the tree once `max_rows` rows are stored, or
    /// once one more row could grow the tree past what the storage can
    /// persist.
    pub fn insert(&mut self, row: Row) -> Result<(), TableFull> {
        if self.num_rows >= self.max_rows {
            return Err(TableFull::RowLimit {
                max_rows: self.max_rows,
            });
        }
        if !self.can_persist_after_insert() {
            return Err(TableFull::PageLimit {
                capacity: self.store.capacity(),
            });
        }
        self.tree.insert(row.id, row);
        self.num_rows += 1;
        Ok(())
    }

    /// Whether the tree still fits in the storage after one more insert.
    ///
    /// A persist writes every non-root node to a fresh page while the pages
    /// of the tree loaded at open stay in use. Once the file is reopened the
    /// whole tree is resident, so the next persist needs as many free pages
    /// again: at most half of the non-root pages can hold the tree.
    fn can_persist_after_insert(&self) -> bool {
        // An insert splits at most every node on its path plus the root
        let nodes = self.tree.node_count() + self.tree.height() + 1;
        let fresh = nodes - 1;
        let allocatable = (self.store.capacity() as usize).saturating_sub(1);
        fresh <= self.store.free_pages() && 2 * fresh <= allocatable
    }

    /// Find the row with `id`; the latest one if the id was inserted twice.
    #[must_use]
    pub fn find(&self, id: u32) -> Option<&Row> {
        self.tree.search(id)
    }

    /// All rows in id order.
    pub fn scan(&self) -> impl Iterator<Item = &Row> {
        self.tree.iter().map(|(_, row)| row)
    }

    #[must_use]
    pub const fn num_rows(&self) -> usize {
        self.num_rows
    }

    /// Largest id in the table.
    #[must_use]
    pub fn max_id(&self) -> Option<u32> {
        self.tree.last_key()
    }

    #[must_use]
    pub const fn tree(&self) -> &BTree<Row> {
        &self.tree
    }

    /// Persist the tree once and hand back the storage.
    pub fn shutdown(mut self) -> Result<S, TableError> {
        self.tree.persist(&mut self.store)?;
        Ok(self.store)
    }
}

/// Why a row was turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFull {
    /// The table already holds `max_rows` rows.
    RowLimit { max_rows: usize },
    /// Another row could leave the tree too large to persist.
    PageLimit { capacity: u32 },
}

impl std::fmt::Display for TableFull {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RowLimit { max_rows } => write!(f, "table full ({max_rows} rows)"),
            Self::PageLimit { capacity } => {
                write!(f, "table full (tree would not fit in {capacity} pages)")
            }
        }
    }
}

impl std::error::Error for TableFull {}

/// Errors that can occur opening or closing a table.
#[derive(Debug)]
pub enum TableError {
    /// Storage error.
    Store(StoreError),
    /// B-tree error.
    BTree(BTreeError),
}

impl std::fmt::Display for TableError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Store(e) => write!(f, "storage error: {e}"),
            Self::BTree(e) => write!(f, "B-tree error: {e}"),
        }
    }
}

impl std::error::Error for TableError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Store(e) => Some(e),
            Self::BTree(e) => Some(e),
        }
    }
}

impl From<StoreError> for TableError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

impl From<BTreeError> for TableError {
    fn from(e: BTreeError) -> Self {
        Self::BTree(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{FaultConfig, MemoryStorage, ROOT_PAGE};
    use crate::testing::{test_db_path, test_row};

    fn memory_table(max_rows: usize) -> Table<MemoryStorage> {
        Table::open_with_store(MemoryStorage::new(), 3, max_rows).expect("open table")
    }

    #[test]
    fn test_insert_and_find() {
        let mut table = memory_table(100);
        for id in (0..100).step_by(3) {
            table.insert(test_row(id)).expect("insert");
        }

        assert_eq!(table.num_rows(), 34);
        assert_eq!(table.find(24), Some(&test_row(24)));
        assert_eq!(table.find(120), None);
        assert_eq!(table.max_id(), Some(99));
    }

    #[test]
    fn test_scan_in_id_order() {
        let mut table = memory_table(100);
        for id in [5, 3, 9, 1, 7] {
            table.insert(test_row(id)).expect("insert");
        }

        let ids: Vec<u32> = table.scan().map(|row| row.id).collect();
        assert_eq!(ids, vec![1, 3, 5, 7, 9]);
    }

    #[test]
    fn test_table_full() {
        let mut table = memory_table(10);
        for id in 0..10 {
            table.insert(test_row(id)).expect("insert");
        }

        let before = table.tree().clone();
        assert_eq!(
            table.insert(test_row(10)),
            Err(TableFull::RowLimit { max_rows: 10 })
        );
        assert_eq!(table.num_rows(), 10);
        assert_eq!(table.tree(), &before);
        assert_eq!(table.find(10), None);
    }

    #[test]
    fn test_duplicate_id_finds_latest() {
        let mut table = memory_table(10);
        table.insert(Row::new(1, "first", "a@example.com")).expect("insert");
        table.insert(Row::new(1, "second", "b@example.com")).expect("insert");

        assert_eq!(table.num_rows(), 2);
        assert_eq!(table.find(1).map(|r| r.username.as_str()), Some("second"));
    }

    #[test]
    fn test_shutdown_persists_once() {
        let mut table = memory_table(100);
        assert_eq!(table.num_rows(), 0);
        table.insert(test_row(1)).expect("insert");

        let store = table.shutdown().expect("shutdown");
        assert_eq!(store.writes(), 1);
        assert!(store.contains(ROOT_PAGE));

        let table = Table::open_with_store(store, 3, 100).expect("reopen");
        assert_eq!(table.num_rows(), 1);
        assert_eq!(table.find(1), Some(&test_row(1)));
    }

    #[test]
    fn test_reopen_from_file() {
        let (_dir, path) = test_db_path();
        let config = DbConfig {
            database_file: path,
            ..DbConfig::default()
        };

        {
            let mut table = Table::open(&config).expect("open table");
            for id in 0..50 {
                table.insert(test_row(id)).expect("insert");
            }
            table.close().expect("close");
        }

        let table = Table::open(&config).expect("reopen table");
        assert_eq!(table.num_rows(), 50);
        assert_eq!(table.find(42), Some(&test_row(42)));
        let ids: Vec<u32> = table.scan().map(|row| row.id).collect();
        assert_eq!(ids, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn test_close_without_inserts_creates_empty_table() {
        let (_dir, path) = test_db_path();
        let config = DbConfig {
            database_file: path.clone(),
            ..DbConfig::default()
        };

        Table::open(&config).expect("open").close().expect("close");

        assert_eq!(
            std::fs::metadata(&path).expect("file exists").len(),
            crate::storage::PAGE_SIZE as u64
        );
        let table = Table::open(&config).expect("reopen");
        assert_eq!(table.num_rows(), 0);
    }

    #[test]
    fn test_failed_shutdown_is_reported() {
        let store = MemoryStorage::with_faults(100, FaultConfig::fail_after(0), 0);
        let mut table = Table::open_with_store(store, 3, 100).expect("open table");
        table.insert(test_row(1)).expect("insert");

        assert!(matches!(
            table.shutdown(),
            Err(TableError::BTree(BTreeError::Store(StoreError::InjectedFault(_))))
        ));
    }

    #[test]
    fn test_full_table_survives_repeated_reopen() {
        let (_dir, path) = test_db_path();
        let config = DbConfig {
            database_file: path,
            ..DbConfig::default()
        };

        let mut table = Table::open(&config).expect("open table");
        let mut inserted = 0;
        let full = loop {
            match table.insert(test_row(inserted)) {
                Ok(()) => inserted += 1,
                Err(e) => break e,
            }
        };
        assert_eq!(full, TableFull::PageLimit { capacity: 100 });
        assert!(inserted > 10);
        table.close().expect("close after filling");

        // Each reopen leaves the previous tree's pages in use
        for round in 0..3 {
            let mut table = Table::open(&config).expect("reopen table");
            assert_eq!(table.num_rows(), inserted as usize, "round {round}");
            let ids: Vec<u32> = table.scan().map(|row| row.id).collect();
            assert_eq!(ids, (0..inserted).collect::<Vec<_>>());
            assert!(table.insert(test_row(inserted)).is_err());
            table.close().expect("close unchanged table");
        }
    }

    #[test]
    fn test_page_limit_leaves_tree_untouched() {
        let store = MemoryStorage::with_capacity(16);
        let mut table = Table::open_with_store(store, 3, 1000).expect("open table");
        let mut id = 0;
        while table.insert(test_row(id)).is_ok() {
            id += 1;
        }

        let before = table.tree().clone();
        assert_eq!(
            table.insert(test_row(id)),
            Err(TableFull::PageLimit { capacity: 16 })
        );
        assert_eq!(table.tree(), &before);
        assert_eq!(table.num_rows(), id as usize);

        let store = table.shutdown().expect("persist full table");
        let table = Table::open_with_store(store, 3, 1000).expect("reopen");
        assert_eq!(table.num_rows(), id as usize);
    }

    #[test]
    fn test_open_rejects_corrupt_root() {
        let mut store = MemoryStorage::new();
        store.set_page(ROOT_PAGE, &[9]).expect("set");

        assert!(matches!(
            Table::open_with_store(store, 3, 100),
            Err(TableError::BTree(BTreeError::Node { page_id: 0, .. }))
        ));
    }
}

//! Database configuration.
//!
//! Loaded from environment variables, every one of them optional.
//!
//! # Environment Variables
//!
//! - `MINIDB_DATABASE_FILE`: Path of the database file (default: `minidb.db`)
//! - `MINIDB_BTREE_ORDER`: Minimum degree `t` of the B-tree (default: `3`)
//! - `MINIDB_MAX_ROWS`: Row limit before inserts fail with table full
//!   (default: `1400`)
//!
//! # Invariants
//!
//! - `order` is at least 2 and small enough for a full node of rows to fit in
//!   one page

use std::path::PathBuf;

use crate::row::{ROWS_PER_PAGE, Row};
use crate::storage::TABLE_MAX_PAGES;
use crate::storage::btree::max_order;

const DATABASE_FILE_VAR: &str = "MINIDB_DATABASE_FILE";
const ORDER_VAR: &str = "MINIDB_BTREE_ORDER";
const MAX_ROWS_VAR: &str = "MINIDB_MAX_ROWS";

/// Database configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbConfig {
    /// Path of the single database file. Created on first open.
    pub database_file: PathBuf,
    /// Minimum degree `t` of the B-tree.
    pub order: usize,
    /// Number of rows after which inserts are rejected.
    pub max_rows: usize,
}

/// Error returned when loading configuration fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    InvalidValue { name: String, message: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidValue { name, message } => {
                write!(f, "invalid value for {name}: {message}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl DbConfig {
    /// Default database file.
    pub const DEFAULT_DATABASE_FILE: &'static str = "minidb.db";
    /// Default B-tree order.
    pub const DEFAULT_ORDER: usize = 3;
    /// Default row limit: as many rows as the page capacity could hold packed.
    pub const DEFAULT_MAX_ROWS: usize = ROWS_PER_PAGE * TABLE_MAX_PAGES as usize;

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through `lookup`, which maps a variable name to its
    /// value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database_file = lookup(DATABASE_FILE_VAR)
            .map_or_else(|| PathBuf::from(Self::DEFAULT_DATABASE_FILE), PathBuf::from);
        let order = Self::load_order(lookup(ORDER_VAR))?;
        let max_rows = Self::load_max_rows(lookup(MAX_ROWS_VAR))?;

        Ok(Self {
            database_file,
            order,
            max_rows,
        })
    }

    /// Parse the B-tree order, checking it against the row width.
    fn load_order(value: Option<String>) -> Result<usize, ConfigError> {
        let Some(value) = value else {
            return Ok(Self::DEFAULT_ORDER);
        };

        let max = max_order::<Row>();
        match value.trim().parse::<usize>() {
            Ok(order) if (2..=max).contains(&order) => Ok(order),
            _ => Err(ConfigError::InvalidValue {
                name: ORDER_VAR.to_string(),
                message: format!("'{value}' is not a valid order (must be 2-{max})"),
            }),
        }
    }

    fn load_max_rows(value: Option<String>) -> Result<usize, ConfigError> {
        let Some(value) = value else {
            return Ok(Self::DEFAULT_MAX_ROWS);
        };

        value
            .trim()
            .parse::<usize>()
            .map_err(|_| ConfigError::InvalidValue {
                name: MAX_ROWS_VAR.to_string(),
                message: format!("'{value}' is not a row count"),
            })
    }
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            database_file: PathBuf::from(Self::DEFAULT_DATABASE_FILE),
            order: Self::DEFAULT_ORDER,
            max_rows: Self::DEFAULT_MAX_ROWS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<DbConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        DbConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_default_values() {
        assert_eq!(DbConfig::DEFAULT_DATABASE_FILE, "minidb.db");
        assert_eq!(DbConfig::DEFAULT_ORDER, 3);
        assert_eq!(DbConfig::DEFAULT_MAX_ROWS, 1400);
        assert_eq!(load(&[]).expect("defaults"), DbConfig::default());
    }

    #[test]
    fn test_values_from_environment() {
        let config = load(&[
            ("MINIDB_DATABASE_FILE", "/tmp/other.db"),
            ("MINIDB_BTREE_ORDER", "5"),
            ("MINIDB_MAX_ROWS", "20"),
        ])
        .expect("valid config");

        assert_eq!(config.database_file, PathBuf::from("/tmp/other.db"));
        assert_eq!(config.order, 5);
        assert_eq!(config.max_rows, 20);
    }

    #[test]
    fn test_order_bounds() {
        assert_eq!(load(&[("MINIDB_BTREE_ORDER", "2")]).expect("min").order, 2);
        assert_eq!(load(&[("MINIDB_BTREE_ORDER", "7")]).expect("max").order, 7);

        for bad in ["0", "1", "8", "three", "-3"] {
            let err = load(&[("MINIDB_BTREE_ORDER", bad)]).expect_err("invalid order");
            assert!(matches!(
                err,
                ConfigError::InvalidValue { ref name, .. } if name == "MINIDB_BTREE_ORDER"
            ));
        }
    }

    #[test]
    fn test_invalid_max_rows() {
        let err = load(&[("MINIDB_MAX_ROWS", "lots")]).expect_err("invalid max rows");
        assert_eq!(
            err.to_string(),
            "invalid value for MINIDB_MAX_ROWS: 'lots' is not a row count"
        );
    }
}

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]
// Life of a statement:
// 1. The REPL reads a line and parses it into a statement or meta command
// 2. Statements run against the table:
//     - insert: row goes into the in-memory B-tree under its id
//     - select: in-order walk of the tree, or a single search
// 3. On exit the whole tree is written out, children first, root to page 0
//
// System components:
//  - Paged file store (page cache + allocator)
//  - B-tree over fixed-width payloads, with its page codec
//  - Table and REPL

pub mod config;
pub mod repl;
pub mod row;
pub mod storage;
pub mod table;

#[cfg(test)]
mod testing;

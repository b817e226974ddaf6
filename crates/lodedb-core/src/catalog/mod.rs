//! Catalog of tables and indexes.
//!
//! Definitions are stored in the `catalog` tree and read through a
//! [`Transaction`](crate::storage::Transaction), so DDL commits and rolls
//! back with the rest of the transaction.

mod catalog;
mod schema;
mod table;

pub use catalog::Catalog;
pub use schema::{IndexInfo, TableInfo};
pub use table::{DocumentIter, Index, Table};

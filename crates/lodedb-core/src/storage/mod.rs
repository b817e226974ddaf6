//! Storage layer for LodeDB.
//!
//! This module provides a sled-based storage engine with undo-log
//! transactions.

mod config;
mod engine;
mod transaction;

pub mod key;

pub use config::StorageConfig;
pub use engine::StorageEngine;
pub(crate) use engine::{index_tree_name, table_tree_name, CATALOG_TREE};
pub use transaction::Transaction;

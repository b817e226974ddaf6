//! LodeDB Core - Storage engine, catalog, and query execution.
//!
//! This crate runs statements built from operator streams over documents
//! stored in sled.

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

pub mod catalog;
pub mod database;
pub mod error;
pub mod query;
pub mod storage;

pub use catalog::{Catalog, IndexInfo, TableInfo};
pub use database::Database;
pub use error::Error;
pub use query::{
    optimize, ExplainStmt, Expr, Operator, Optimizer, Param, QueryResult, Statement, Stream,
    StreamStmt,
};
pub use storage::{StorageConfig, StorageEngine, Transaction};

/// Re-export of the document model.
pub use lodedb_document as document;

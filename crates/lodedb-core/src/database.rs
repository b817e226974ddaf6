//! Database handle running statements in their own transactions.

use lodedb_document::FieldBuffer;
use tracing::{debug, warn};

use crate::error::Error;
use crate::query::{Param, Statement};
use crate::storage::{StorageConfig, StorageEngine, Transaction};

/// A database over a storage engine.
///
/// Each call runs one statement in a fresh transaction: writable unless the
/// statement is read-only, committed on success and rolled back on error.
pub struct Database {
    engine: StorageEngine,
}

impl Database {
    /// Open a database with the given storage configuration.
    pub fn open(config: StorageConfig) -> Result<Self, Error> {
        Ok(Self {
            engine: StorageEngine::open(config)?,
        })
    }

    /// Get a reference to the storage engine.
    pub fn engine(&self) -> &StorageEngine {
        &self.engine
    }

    /// Run a statement, returning the number of rows it wrote.
    pub fn exec(&self, stmt: &dyn Statement, params: &[Param]) -> Result<u64, Error> {
        self.run(stmt, |tx| Ok(stmt.run(tx, params)?.rows_affected()))
    }

    /// Run a statement and collect the documents it produces.
    pub fn query(&self, stmt: &dyn Statement, params: &[Param]) -> Result<Vec<FieldBuffer>, Error> {
        self.run(stmt, |tx| stmt.run(tx, params)?.documents())
    }

    /// Flush pending writes to disk.
    pub fn flush(&self) -> Result<(), Error> {
        self.engine.flush()
    }

    fn run<T>(
        &self,
        stmt: &dyn Statement,
        f: impl FnOnce(&Transaction<'_>) -> Result<T, Error>,
    ) -> Result<T, Error> {
        let tx = self.engine.begin(!stmt.is_read_only());
        debug!(kind = ?stmt.kind(), writable = tx.is_writable(), "Statement transaction started");
        match f(&tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(e) => {
                warn!(kind = ?stmt.kind(), error = %e, "Statement failed, rolling back");
                tx.rollback()?;
                Err(e)
            }
        }
    }
}

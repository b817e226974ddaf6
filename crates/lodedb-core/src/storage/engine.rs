//! Storage engine implementation.

use parking_lot::Mutex;
use sled::{Db, Tree};
use tracing::info;

use super::{StorageConfig, Transaction};
use crate::error::Error;

/// Tree name for table and index metadata.
pub(crate) const CATALOG_TREE: &str = "catalog";

/// Prefix of the tree holding a table's documents.
const TABLE_TREE_PREFIX: &str = "t:";

/// Prefix of the tree holding an index's entries.
const INDEX_TREE_PREFIX: &str = "i:";

/// The main storage engine wrapping sled.
///
/// Each table and each index lives in its own sled tree. Writable
/// transactions are serialized by an engine-wide lock; read-only
/// transactions take no lock.
pub struct StorageEngine {
    /// The underlying sled database.
    db: Db,

    /// Configuration the engine was opened with.
    config: StorageConfig,

    /// Held by the active writable transaction.
    write_lock: Mutex<()>,
}

impl StorageEngine {
    /// Open or create a storage engine with the given configuration.
    pub fn open(config: StorageConfig) -> Result<Self, Error> {
        let db = config.to_sled_config().open()?;
        info!(
            path = %config.path.display(),
            temporary = config.temporary,
            recovered = db.was_recovered(),
            "Storage engine opened"
        );

        Ok(Self {
            db,
            config,
            write_lock: Mutex::new(()),
        })
    }

    /// Begin a transaction.
    ///
    /// A writable transaction blocks until any other writable transaction
    /// has finished.
    pub fn begin(&self, writable: bool) -> Transaction<'_> {
        let guard = writable.then(|| self.write_lock.lock());
        Transaction::new(self, guard)
    }

    /// Check if the database was recovered from a previous crash.
    pub fn was_recovered(&self) -> bool {
        self.db.was_recovered()
    }

    /// Flush all pending writes to disk.
    pub fn flush(&self) -> Result<(), Error> {
        self.db.flush()?;
        Ok(())
    }

    /// Get database size in bytes.
    pub fn size_on_disk(&self) -> Result<u64, Error> {
        Ok(self.db.size_on_disk()?)
    }

    /// Generate a new, monotonically increasing document id.
    pub fn generate_id(&self) -> Result<u64, Error> {
        Ok(self.db.generate_id()?)
    }

    /// The configuration the engine was opened with.
    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Get the underlying sled database.
    pub fn db(&self) -> &Db {
        &self.db
    }

    pub(crate) fn open_tree(&self, name: &str) -> Result<Tree, Error> {
        Ok(self.db.open_tree(name)?)
    }

    pub(crate) fn drop_tree(&self, name: &str) -> Result<bool, Error> {
        Ok(self.db.drop_tree(name)?)
    }
}

/// Name of the tree storing a table's documents.
pub(crate) fn table_tree_name(table: &str) -> String {
    format!("{}{}", TABLE_TREE_PREFIX, table)
}

/// Name of the tree storing an index's entries.
pub(crate) fn index_tree_name(index: &str) -> String {
    format!("{}{}", INDEX_TREE_PREFIX, index)
}

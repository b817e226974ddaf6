//! Catalog of tables and indexes.

use sled::Tree;
use tracing::info;

use super::{Index, IndexInfo, Table, TableInfo};
use crate::error::Error;
use crate::storage::{index_tree_name, table_tree_name, Transaction, CATALOG_TREE};

/// Key prefix of table definitions in the catalog tree.
const TABLE_KEY_PREFIX: &str = "table:";

/// Key prefix of index definitions in the catalog tree.
const INDEX_KEY_PREFIX: &str = "index:";

fn table_key(name: &str) -> String {
    format!("{}{}", TABLE_KEY_PREFIX, name)
}

fn index_key(name: &str) -> String {
    format!("{}{}", INDEX_KEY_PREFIX, name)
}

/// Table and index metadata as seen by one transaction.
///
/// Every change goes through the transaction, so it is undone with it.
pub struct Catalog<'t> {
    tx: &'t Transaction<'t>,
    tree: Tree,
}

impl<'t> Catalog<'t> {
    pub(crate) fn open(tx: &'t Transaction<'t>) -> Result<Self, Error> {
        let tree = tx.tree(CATALOG_TREE)?;
        Ok(Self { tx, tree })
    }

    /// Get the definition of a table.
    pub fn get_table_info(&self, name: &str) -> Result<TableInfo, Error> {
        match self.tx.get(&self.tree, table_key(name).as_bytes())? {
            Some(bytes) => TableInfo::from_bytes(&bytes),
            None => Err(Error::TableNotFound(name.to_string())),
        }
    }

    /// List every table, ordered by name.
    pub fn list_tables(&self) -> Result<Vec<TableInfo>, Error> {
        self.tree
            .scan_prefix(TABLE_KEY_PREFIX)
            .map(|entry| {
                let (_, bytes) = entry?;
                TableInfo::from_bytes(&bytes)
            })
            .collect()
    }

    /// Create a table.
    pub fn create_table(&self, info: TableInfo) -> Result<(), Error> {
        info.primary_key_path()?;
        let key = table_key(&info.name);
        if self.tx.get(&self.tree, key.as_bytes())?.is_some() {
            return Err(Error::TableAlreadyExists(info.name));
        }
        self.tx.insert(&self.tree, key.as_bytes(), info.to_bytes()?)?;

        info!(
            table = %info.name,
            primary_key = ?info.primary_key,
            "Table created"
        );
        Ok(())
    }

    /// Drop a table, its documents and its indexes.
    pub fn drop_table(&self, name: &str) -> Result<(), Error> {
        self.get_table_info(name)?;
        for index in self.list_indexes(name)? {
            self.drop_index(&index.name)?;
        }
        self.tx.drop_tree(&table_tree_name(name))?;
        self.tx.remove(&self.tree, table_key(name).as_bytes())?;

        info!(table = %name, "Table dropped");
        Ok(())
    }

    /// Get the definition of an index.
    pub fn get_index_info(&self, name: &str) -> Result<IndexInfo, Error> {
        match self.tx.get(&self.tree, index_key(name).as_bytes())? {
            Some(bytes) => IndexInfo::from_bytes(&bytes),
            None => Err(Error::IndexNotFound(name.to_string())),
        }
    }

    /// List the indexes of a table, ordered by name.
    pub fn list_indexes(&self, table: &str) -> Result<Vec<IndexInfo>, Error> {
        let mut indexes = Vec::new();
        for entry in self.tree.scan_prefix(INDEX_KEY_PREFIX) {
            let (_, bytes) = entry?;
            let info = IndexInfo::from_bytes(&bytes)?;
            if info.table == table {
                indexes.push(info);
            }
        }
        Ok(indexes)
    }

    /// Create an index and fill it with the documents already in its table.
    ///
    /// Fails with [`Error::DuplicateDocument`] if the index is unique and two
    /// existing documents share a value.
    pub fn create_index(&self, info: IndexInfo) -> Result<(), Error> {
        info.parsed_path()?;
        self.get_table_info(&info.table)?;
        let key = index_key(&info.name);
        if self.tx.get(&self.tree, key.as_bytes())?.is_some() {
            return Err(Error::IndexAlreadyExists(info.name));
        }
        self.tx.insert(&self.tree, key.as_bytes(), info.to_bytes()?)?;

        let table = self.get_table(&info.table)?;
        let index = Index::open(self.tx, info)?;
        let count = table.backfill(&index)?;

        info!(
            index = %index.info().name,
            table = %index.info().table,
            path = %index.info().path,
            unique = index.info().unique,
            backfilled = count,
            "Index created"
        );
        Ok(())
    }

    /// Drop an index and its entries.
    pub fn drop_index(&self, name: &str) -> Result<(), Error> {
        self.get_index_info(name)?;
        self.tx.drop_tree(&index_tree_name(name))?;
        self.tx.remove(&self.tree, index_key(name).as_bytes())?;

        info!(index = %name, "Index dropped");
        Ok(())
    }

    /// Open a table with all of its indexes.
    pub fn get_table(&self, name: &str) -> Result<Table<'t>, Error> {
        let info = self.get_table_info(name)?;
        let indexes = self
            .list_indexes(name)?
            .into_iter()
            .map(|index| Index::open(self.tx, index))
            .collect::<Result<Vec<_>, _>>()?;
        Table::open(self.tx, info, indexes)
    }

    /// Open an index.
    pub fn get_index(&self, name: &str) -> Result<Index<'t>, Error> {
        Index::open(self.tx, self.get_index_info(name)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{StorageConfig, StorageEngine};
    use lodedb_document::FieldBuffer;

    fn engine() -> StorageEngine {
        StorageEngine::open(StorageConfig::temporary()).unwrap()
    }

    #[test]
    fn test_create_and_list_tables() {
        let engine = engine();
        let tx = engine.begin(true);
        let catalog = tx.catalog().unwrap();
        catalog.create_table(TableInfo::new("b")).unwrap();
        catalog
            .create_table(TableInfo::new("a").with_primary_key("id"))
            .unwrap();

        let names: Vec<_> = catalog
            .list_tables()
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(
            catalog.get_table_info("a").unwrap().primary_key.as_deref(),
            Some("id")
        );
        assert!(matches!(
            catalog.create_table(TableInfo::new("a")),
            Err(Error::TableAlreadyExists(_))
        ));
        assert!(matches!(
            catalog.get_table_info("c"),
            Err(Error::TableNotFound(_))
        ));
    }

    #[test]
    fn test_catalog_changes_roll_back() {
        let engine = engine();
        {
            let tx = engine.begin(true);
            tx.catalog().unwrap().create_table(TableInfo::new("t")).unwrap();
            tx.rollback().unwrap();
        }
        let tx = engine.begin(false);
        assert!(tx.catalog().unwrap().list_tables().unwrap().is_empty());
    }

    #[test]
    fn test_read_only_catalog_rejects_ddl() {
        let engine = engine();
        let tx = engine.begin(false);
        assert!(matches!(
            tx.catalog().unwrap().create_table(TableInfo::new("t")),
            Err(Error::ReadOnlyTransaction)
        ));
    }

    #[test]
    fn test_create_index_backfills() {
        let engine = engine();
        let tx = engine.begin(true);
        let catalog = tx.catalog().unwrap();
        catalog.create_table(TableInfo::new("users")).unwrap();
        let table = catalog.get_table("users").unwrap();
        for age in [30, 20, 30] {
            table
                .insert(&FieldBuffer::new().with_field("age", age))
                .unwrap();
        }

        catalog
            .create_index(IndexInfo::new("idx_age", "users", "age"))
            .unwrap();
        let index = catalog.get_index("idx_age").unwrap();
        assert_eq!(index.len(), 3);
        assert_eq!(catalog.get_table("users").unwrap().indexes().len(), 1);

        assert!(matches!(
            catalog.create_index(IndexInfo::new("idx_age", "users", "name")),
            Err(Error::IndexAlreadyExists(_))
        ));
        assert!(matches!(
            catalog.create_index(IndexInfo::new("idx_x", "nope", "a")),
            Err(Error::TableNotFound(_))
        ));
    }

    #[test]
    fn test_unique_index_rejects_existing_duplicates() {
        let engine = engine();
        let tx = engine.begin(true);
        let catalog = tx.catalog().unwrap();
        catalog.create_table(TableInfo::new("users")).unwrap();
        let table = catalog.get_table("users").unwrap();
        table
            .insert(&FieldBuffer::new().with_field("email", "a@x"))
            .unwrap();
        table
            .insert(&FieldBuffer::new().with_field("email", "a@x"))
            .unwrap();

        let result = catalog.create_index(IndexInfo::new("idx_email", "users", "email").unique());
        assert!(matches!(result, Err(Error::DuplicateDocument)));
    }

    #[test]
    fn test_drop_table_drops_indexes() {
        let engine = engine();
        let tx = engine.begin(true);
        let catalog = tx.catalog().unwrap();
        catalog.create_table(TableInfo::new("users")).unwrap();
        catalog
            .create_index(IndexInfo::new("idx_age", "users", "age"))
            .unwrap();
        catalog.drop_table("users").unwrap();

        assert!(matches!(
            catalog.get_index_info("idx_age"),
            Err(Error::IndexNotFound(_))
        ));
        assert!(matches!(
            catalog.drop_table("users"),
            Err(Error::TableNotFound(_))
        ));
        assert!(matches!(
            catalog.drop_index("idx_age"),
            Err(Error::IndexNotFound(_))
        ));
    }
}

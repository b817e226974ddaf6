//! Table and index handles.

use std::ops::Bound;
use std::sync::Arc;

use bytes::Bytes;
use lodedb_document::{BinaryCodec, Codec, Document, Path, Value};
use sled::{IVec, Tree};

use super::{IndexInfo, TableInfo};
use crate::error::Error;
use crate::storage::{index_tree_name, key, table_tree_name, Transaction};

/// Iterator over the stored documents of a table and their keys.
pub type DocumentIter = Box<dyn Iterator<Item = Result<(Bytes, Arc<dyn Document>), Error>>>;

/// Build a lazy document over a stored value without copying it.
fn decode(value: IVec) -> Arc<dyn Document> {
    BinaryCodec.new_document(Bytes::from_owner(value))
}

/// A secondary index over one path of a table.
///
/// Entry key: `[encoded value][document key]`, entry value: the document
/// key. Documents where the path is missing or holds an array or a
/// document are not indexed.
pub struct Index<'t> {
    tx: &'t Transaction<'t>,
    info: IndexInfo,
    path: Path,
    tree: Tree,
}

impl<'t> Index<'t> {
    pub(crate) fn open(tx: &'t Transaction<'t>, info: IndexInfo) -> Result<Self, Error> {
        let path = info.parsed_path()?;
        let tree = tx.tree(&index_tree_name(&info.name))?;
        Ok(Self {
            tx,
            info,
            path,
            tree,
        })
    }

    /// The index definition.
    pub fn info(&self) -> &IndexInfo {
        &self.info
    }

    /// The indexed path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    /// Check if the index has no entries.
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    fn indexed_value(&self, document: &dyn Document) -> Result<Option<Value>, Error> {
        match self.path.get_value_from_document(document) {
            Ok(value) if value.value_type().is_composite() => Ok(None),
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn entry_key(value: &Value, doc_key: &[u8]) -> Result<Vec<u8>, Error> {
        let mut entry = key::encode_value(value)?;
        entry.extend_from_slice(doc_key);
        Ok(entry)
    }

    /// Fail with [`Error::DuplicateDocument`] if the index is unique and
    /// another document already holds the same non-null value.
    pub(crate) fn check_unique(&self, document: &dyn Document, doc_key: &[u8]) -> Result<(), Error> {
        if !self.info.unique {
            return Ok(());
        }
        let value = match self.indexed_value(document)? {
            Some(value) if !value.is_null() => value,
            _ => return Ok(()),
        };
        for entry in self.tree.scan_prefix(key::encode_value(&value)?) {
            let (_, owner) = entry?;
            if owner.as_ref() != doc_key {
                return Err(Error::DuplicateDocument);
            }
        }
        Ok(())
    }

    pub(crate) fn add(&self, document: &dyn Document, doc_key: &[u8]) -> Result<(), Error> {
        if let Some(value) = self.indexed_value(document)? {
            let entry = Self::entry_key(&value, doc_key)?;
            self.tx.insert(&self.tree, &entry, doc_key)?;
        }
        Ok(())
    }

    pub(crate) fn remove(&self, document: &dyn Document, doc_key: &[u8]) -> Result<(), Error> {
        if let Some(value) = self.indexed_value(document)? {
            let entry = Self::entry_key(&value, doc_key)?;
            self.tx.remove(&self.tree, &entry)?;
        }
        Ok(())
    }

    /// Keys of the documents whose entries fall between two encoded
    /// bounds, in index order.
    pub fn scan(&self, lower: Bound<&[u8]>, upper: Bound<&[u8]>) -> Result<Vec<IVec>, Error> {
        self.tree
            .range::<&[u8], _>((lower, upper))
            .map(|entry| Ok(entry?.1))
            .collect()
    }
}

/// A table as seen by one transaction, with its indexes.
pub struct Table<'t> {
    tx: &'t Transaction<'t>,
    info: TableInfo,
    primary_key: Option<Path>,
    tree: Tree,
    indexes: Vec<Index<'t>>,
}

impl<'t> Table<'t> {
    pub(crate) fn open(
        tx: &'t Transaction<'t>,
        info: TableInfo,
        indexes: Vec<Index<'t>>,
    ) -> Result<Self, Error> {
        let primary_key = info.primary_key_path()?;
        let tree = tx.tree(&table_tree_name(&info.name))?;
        Ok(Self {
            tx,
            info,
            primary_key,
            tree,
            indexes,
        })
    }

    /// The table definition.
    pub fn info(&self) -> &TableInfo {
        &self.info
    }

    /// The indexes maintained on every write.
    pub fn indexes(&self) -> &[Index<'t>] {
        &self.indexes
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    /// Check if the table holds no documents.
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    fn primary_key_of(&self, document: &dyn Document) -> Result<Option<Vec<u8>>, Error> {
        match &self.primary_key {
            Some(path) => {
                let value = path.get_value_from_document(document)?;
                Ok(Some(key::encode_value(&value)?))
            }
            None => Ok(None),
        }
    }

    /// Store a new document.
    ///
    /// The key is the encoded primary key value, or a generated sequence
    /// number when the table has no primary key. Returns the key and the
    /// stored document.
    pub fn insert(&self, document: &dyn Document) -> Result<(Bytes, Arc<dyn Document>), Error> {
        let doc_key = match self.primary_key_of(document)? {
            Some(pk) => pk,
            None => key::encode_sequence(self.tx.engine().generate_id()?).to_vec(),
        };
        if self.tx.get(&self.tree, &doc_key)?.is_some() {
            return Err(Error::DuplicateDocument);
        }
        let encoded = BinaryCodec.encode(document)?;
        for index in &self.indexes {
            index.check_unique(document, &doc_key)?;
        }

        self.tx.insert(&self.tree, &doc_key, encoded.as_slice())?;
        for index in &self.indexes {
            index.add(document, &doc_key)?;
        }
        Ok((
            Bytes::from(doc_key),
            BinaryCodec.new_document(Bytes::from(encoded)),
        ))
    }

    /// Replace the document stored under `doc_key`.
    ///
    /// The primary key value cannot change.
    pub fn replace(&self, doc_key: &[u8], document: &dyn Document) -> Result<Arc<dyn Document>, Error> {
        let previous = self.get(doc_key)?;
        if let Some(pk) = self.primary_key_of(document)? {
            if pk != doc_key {
                return Err(Error::InvalidExpression(
                    "primary key cannot be modified".to_string(),
                ));
            }
        }
        let encoded = BinaryCodec.encode(document)?;
        for index in &self.indexes {
            index.check_unique(document, doc_key)?;
        }

        for index in &self.indexes {
            index.remove(previous.as_ref(), doc_key)?;
        }
        self.tx.insert(&self.tree, doc_key, encoded.as_slice())?;
        for index in &self.indexes {
            index.add(document, doc_key)?;
        }
        Ok(BinaryCodec.new_document(Bytes::from(encoded)))
    }

    /// Delete the document stored under `doc_key`.
    pub fn delete(&self, doc_key: &[u8]) -> Result<(), Error> {
        let previous = self.get(doc_key)?;
        for index in &self.indexes {
            index.remove(previous.as_ref(), doc_key)?;
        }
        self.tx.remove(&self.tree, doc_key)?;
        Ok(())
    }

    /// Get the document stored under `doc_key`.
    pub fn get(&self, doc_key: &[u8]) -> Result<Arc<dyn Document>, Error> {
        match self.tx.get(&self.tree, doc_key)? {
            Some(value) => Ok(decode(value)),
            None => Err(Error::DocumentNotFound),
        }
    }

    /// Iterate over the documents in key order.
    ///
    /// The iteration stops at the last key present when it starts, so
    /// documents inserted while iterating are not visited.
    pub fn iter(&self) -> Result<DocumentIter, Error> {
        let last = match self.tree.last()? {
            Some((last, _)) => last,
            None => return Ok(Box::new(std::iter::empty())),
        };
        Ok(Box::new(self.tree.range(..=last).map(|entry| {
            let (doc_key, value) = entry?;
            Ok((Bytes::from_owner(doc_key), decode(value)))
        })))
    }

    /// Index every stored document, returning how many were visited.
    pub(crate) fn backfill(&self, index: &Index<'_>) -> Result<usize, Error> {
        let mut count = 0;
        for entry in self.iter()? {
            let (doc_key, document) = entry?;
            index.check_unique(document.as_ref(), &doc_key)?;
            index.add(document.as_ref(), &doc_key)?;
            count += 1;
        }
        Ok(count)
    }
}

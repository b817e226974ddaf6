//! Transactions over the storage engine.

use std::cell::RefCell;

use parking_lot::MutexGuard;
use sled::{IVec, Tree};
use tracing::{debug, warn};

use super::StorageEngine;
use crate::catalog::Catalog;
use crate::error::Error;

/// The value a key held before a write, restored on rollback.
struct UndoEntry {
    tree: Tree,
    key: IVec,
    previous: Option<IVec>,
}

/// A transaction over the storage engine.
///
/// Writes are applied to the trees as they happen, so reads within the
/// transaction observe them. Every write records the value it replaced;
/// [`rollback`](Self::rollback), or dropping the transaction without
/// committing, restores those values in reverse order.
///
/// Only one writable transaction exists at a time. Read-only transactions
/// reject every write with [`Error::ReadOnlyTransaction`] and take no lock:
/// they read the trees as they are, including uncommitted writes of a
/// concurrent writable transaction that may still roll back.
pub struct Transaction<'a> {
    engine: &'a StorageEngine,
    write_guard: Option<MutexGuard<'a, ()>>,
    undo: RefCell<Vec<UndoEntry>>,
    /// Trees emptied in this transaction, dropped on commit.
    dropped_trees: RefCell<Vec<String>>,
    finished: bool,
}

impl<'a> Transaction<'a> {
    pub(crate) fn new(engine: &'a StorageEngine, guard: Option<MutexGuard<'a, ()>>) -> Self {
        Self {
            engine,
            write_guard: guard,
            undo: RefCell::new(Vec::new()),
            dropped_trees: RefCell::new(Vec::new()),
            finished: false,
        }
    }

    /// Check if the transaction accepts writes.
    pub fn is_writable(&self) -> bool {
        self.write_guard.is_some()
    }

    /// The storage engine this transaction runs against.
    pub fn engine(&self) -> &'a StorageEngine {
        self.engine
    }

    /// Access table and index metadata.
    pub fn catalog(&self) -> Result<Catalog<'_>, Error> {
        Catalog::open(self)
    }

    /// Open a tree by name, creating it if needed.
    pub fn tree(&self, name: &str) -> Result<Tree, Error> {
        self.engine.open_tree(name)
    }

    /// Read a key.
    pub fn get(&self, tree: &Tree, key: &[u8]) -> Result<Option<IVec>, Error> {
        Ok(tree.get(key)?)
    }

    fn check_writable(&self) -> Result<(), Error> {
        if self.is_writable() {
            Ok(())
        } else {
            Err(Error::ReadOnlyTransaction)
        }
    }

    /// Write a key.
    pub fn insert(&self, tree: &Tree, key: &[u8], value: impl Into<IVec>) -> Result<(), Error> {
        self.check_writable()?;
        let previous = tree.insert(key, value)?;
        self.undo.borrow_mut().push(UndoEntry {
            tree: tree.clone(),
            key: IVec::from(key),
            previous,
        });
        Ok(())
    }

    /// Remove a key, returning its previous value.
    pub fn remove(&self, tree: &Tree, key: &[u8]) -> Result<Option<IVec>, Error> {
        self.check_writable()?;
        let previous = tree.remove(key)?;
        if previous.is_some() {
            self.undo.borrow_mut().push(UndoEntry {
                tree: tree.clone(),
                key: IVec::from(key),
                previous: previous.clone(),
            });
        }
        Ok(previous)
    }

    /// Remove every key of a tree and drop the tree once committed.
    pub(crate) fn drop_tree(&self, name: &str) -> Result<(), Error> {
        self.check_writable()?;
        let tree = self.tree(name)?;
        for entry in tree.iter() {
            let (key, _) = entry?;
            self.remove(&tree, &key)?;
        }
        self.dropped_trees.borrow_mut().push(name.to_string());
        Ok(())
    }

    /// Number of writes recorded so far.
    pub fn write_count(&self) -> usize {
        self.undo.borrow().len()
    }

    /// Commit the transaction.
    pub fn commit(mut self) -> Result<(), Error> {
        self.finished = true;
        if !self.is_writable() {
            return Ok(());
        }
        // a tree recreated after being dropped holds new data and stays
        for name in self.dropped_trees.borrow_mut().drain(..) {
            if self.engine.open_tree(&name)?.is_empty() {
                self.engine.drop_tree(&name)?;
            }
        }
        if self.engine.config().sync_on_commit {
            self.engine.flush()?;
        }
        debug!(writes = self.write_count(), "Transaction committed");
        self.undo.borrow_mut().clear();
        Ok(())
    }

    /// Roll back every write made by the transaction.
    pub fn rollback(mut self) -> Result<(), Error> {
        self.finished = true;
        self.undo_all()
    }

    fn undo_all(&self) -> Result<(), Error> {
        let mut undo = self.undo.borrow_mut();
        let count = undo.len();
        while let Some(entry) = undo.pop() {
            match entry.previous {
                Some(value) => {
                    entry.tree.insert(entry.key, value)?;
                }
                None => {
                    entry.tree.remove(entry.key)?;
                }
            }
        }
        self.dropped_trees.borrow_mut().clear();
        if count > 0 {
            debug!(writes = count, "Transaction rolled back");
        }
        Ok(())
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.finished || self.undo.borrow().is_empty() {
            return;
        }
        warn!(
            writes = self.write_count(),
            "Transaction dropped without commit, rolling back"
        );
        if let Err(e) = self.undo_all() {
            warn!(error = %e, "Rollback failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageConfig;

    fn engine() -> StorageEngine {
        StorageEngine::open(StorageConfig::temporary()).unwrap()
    }

    #[test]
    fn test_read_only_rejects_writes() {
        let engine = engine();
        let tx = engine.begin(false);
        let tree = tx.tree("t:a").unwrap();
        assert!(matches!(
            tx.insert(&tree, b"k", b"v".to_vec()),
            Err(Error::ReadOnlyTransaction)
        ));
        assert!(matches!(tx.remove(&tree, b"k"), Err(Error::ReadOnlyTransaction)));
    }

    #[test]
    fn test_reads_see_own_writes() {
        let engine = engine();
        let tx = engine.begin(true);
        let tree = tx.tree("t:a").unwrap();
        tx.insert(&tree, b"k", b"v".to_vec()).unwrap();
        assert!(tx.get(&tree, b"k").unwrap().is_some());
        assert_eq!(tx.write_count(), 1);
    }

    #[test]
    fn test_read_only_sees_uncommitted_writes() {
        let engine = engine();
        let writer = engine.begin(true);
        let tree = writer.tree("t:a").unwrap();
        writer.insert(&tree, b"k", b"v".to_vec()).unwrap();

        let reader = engine.begin(false);
        assert!(reader.get(&tree, b"k").unwrap().is_some());
        writer.rollback().unwrap();
        assert!(reader.get(&tree, b"k").unwrap().is_none());
    }

    #[test]
    fn test_rollback_restores_previous_values() {
        let engine = engine();
        let tx = engine.begin(true);
        let tree = tx.tree("t:a").unwrap();
        tx.insert(&tree, b"keep", b"1".to_vec()).unwrap();
        tx.insert(&tree, b"gone", b"2".to_vec()).unwrap();
        tx.commit().unwrap();

        let tx = engine.begin(true);
        tx.insert(&tree, b"keep", b"changed".to_vec()).unwrap();
        tx.remove(&tree, b"gone").unwrap();
        tx.insert(&tree, b"new", b"3".to_vec()).unwrap();
        tx.rollback().unwrap();

        assert_eq!(tree.get(b"keep").unwrap().as_deref(), Some(&b"1"[..]));
        assert_eq!(tree.get(b"gone").unwrap().as_deref(), Some(&b"2"[..]));
        assert!(tree.get(b"new").unwrap().is_none());
    }

    #[test]
    fn test_drop_without_commit_rolls_back() {
        let engine = engine();
        let tree = engine.open_tree("t:a").unwrap();
        {
            let tx = engine.begin(true);
            tx.insert(&tree, b"k", b"v".to_vec()).unwrap();
        }
        assert!(tree.get(b"k").unwrap().is_none());
    }

    #[test]
    fn test_drop_tree_is_undone_on_rollback() {
        let engine = engine();
        let tx = engine.begin(true);
        let tree = tx.tree("t:a").unwrap();
        tx.insert(&tree, b"k", b"v".to_vec()).unwrap();
        tx.commit().unwrap();

        let tx = engine.begin(true);
        tx.drop_tree("t:a").unwrap();
        assert!(tree.is_empty());
        tx.rollback().unwrap();
        assert!(tree.get(b"k").unwrap().is_some());
    }
}

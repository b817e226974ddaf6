//! Executable statements.

use std::fmt;

use lodedb_document::{to_json_value, FieldBuffer};
use tracing::{debug, info};

use super::expr::Param;
use super::planner::optimize;
use super::stream::{RowIter, Stream};
use crate::catalog::{IndexInfo, TableInfo};
use crate::error::Error;
use crate::storage::Transaction;

/// What a statement does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    CreateTable,
    CreateIndex,
    DropTable,
    DropIndex,
    Explain,
}

/// A top-level executable unit.
pub trait Statement: fmt::Debug + Send + Sync {
    /// Run the statement in a transaction.
    fn run<'t>(&self, tx: &'t Transaction<'t>, params: &'t [Param]) -> Result<QueryResult<'t>, Error>;

    /// Check if the statement can run in a read-only transaction.
    fn is_read_only(&self) -> bool;

    fn kind(&self) -> StatementKind;

    /// The stream statement behind this one, if it has a stream.
    fn as_stream(&self) -> Option<&StreamStmt> {
        None
    }
}

/// The outcome of a statement.
///
/// Read-only statements hold their optimized stream and produce rows only
/// when iterated. Write statements have already run to completion.
pub struct QueryResult<'t> {
    tx: &'t Transaction<'t>,
    params: &'t [Param],
    stream: Option<Stream>,
    rows_affected: u64,
}

impl<'t> QueryResult<'t> {
    fn rows(tx: &'t Transaction<'t>, params: &'t [Param], stream: Stream) -> Self {
        Self {
            tx,
            params,
            stream: Some(stream),
            rows_affected: 0,
        }
    }

    fn affected(tx: &'t Transaction<'t>, params: &'t [Param], rows_affected: u64) -> Self {
        Self {
            tx,
            params,
            stream: None,
            rows_affected,
        }
    }

    /// The stream producing the rows, if any.
    pub fn stream(&self) -> Option<&Stream> {
        self.stream.as_ref()
    }

    /// Rows written by a write statement.
    pub fn rows_affected(&self) -> u64 {
        self.rows_affected
    }

    /// Iterate over the result rows.
    pub fn iterate(&self) -> Result<RowIter<'_>, Error> {
        match &self.stream {
            Some(stream) => stream.iterate(self.tx, self.params),
            None => Ok(Box::new(std::iter::empty())),
        }
    }

    /// Collect the result rows into buffers.
    pub fn documents(&self) -> Result<Vec<FieldBuffer>, Error> {
        self.iterate()?
            .map(|row| Ok(FieldBuffer::copy_from(row?.document.as_ref())?))
            .collect()
    }

    /// Render the result rows as a JSON array.
    pub fn to_json(&self) -> Result<serde_json::Value, Error> {
        self.iterate()?
            .map(|row| Ok(to_json_value(row?.document.as_ref())?))
            .collect::<Result<Vec<_>, Error>>()
            .map(serde_json::Value::Array)
    }
}

impl fmt::Debug for QueryResult<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryResult")
            .field("stream", &self.stream)
            .field("rows_affected", &self.rows_affected)
            .finish()
    }
}

/// A statement backed by a stream: SELECT, INSERT, UPDATE or DELETE.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamStmt {
    pub stream: Stream,
    pub read_only: bool,
    kind: StatementKind,
}

impl StreamStmt {
    /// A read-only query.
    pub fn select(stream: Stream) -> Self {
        Self {
            stream,
            read_only: true,
            kind: StatementKind::Select,
        }
    }

    pub fn insert(stream: Stream) -> Self {
        Self::write(StatementKind::Insert, stream)
    }

    pub fn update(stream: Stream) -> Self {
        Self::write(StatementKind::Update, stream)
    }

    pub fn delete(stream: Stream) -> Self {
        Self::write(StatementKind::Delete, stream)
    }

    fn write(kind: StatementKind, stream: Stream) -> Self {
        Self {
            stream,
            read_only: false,
            kind,
        }
    }
}

impl Statement for StreamStmt {
    fn run<'t>(&self, tx: &'t Transaction<'t>, params: &'t [Param]) -> Result<QueryResult<'t>, Error> {
        debug!(kind = ?self.kind, plan = %self.stream, "Running statement");
        let Some(stream) = optimize(self.stream.clone(), tx)? else {
            return Ok(QueryResult::affected(tx, params, 0));
        };
        if self.read_only {
            return Ok(QueryResult::rows(tx, params, stream));
        }

        let mut affected = 0;
        for row in stream.iterate(tx, params)? {
            row?;
            affected += 1;
        }
        debug!(kind = ?self.kind, rows = affected, "Statement applied");
        Ok(QueryResult::affected(tx, params, affected))
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn kind(&self) -> StatementKind {
        self.kind
    }

    fn as_stream(&self) -> Option<&StreamStmt> {
        Some(self)
    }
}

/// `CREATE TABLE`.
#[derive(Debug, Clone)]
pub struct CreateTableStmt {
    pub info: TableInfo,
    pub if_not_exists: bool,
}

impl Statement for CreateTableStmt {
    fn run<'t>(&self, tx: &'t Transaction<'t>, params: &'t [Param]) -> Result<QueryResult<'t>, Error> {
        match tx.catalog()?.create_table(self.info.clone()) {
            Err(Error::TableAlreadyExists(name)) if self.if_not_exists => {
                info!(table = %name, "Table exists, skipping");
                Ok(QueryResult::affected(tx, params, 0))
            }
            Err(e) => Err(e),
            Ok(()) => Ok(QueryResult::affected(tx, params, 0)),
        }
    }

    fn is_read_only(&self) -> bool {
        false
    }

    fn kind(&self) -> StatementKind {
        StatementKind::CreateTable
    }
}

/// `CREATE INDEX`.
#[derive(Debug, Clone)]
pub struct CreateIndexStmt {
    pub info: IndexInfo,
    pub if_not_exists: bool,
}

impl Statement for CreateIndexStmt {
    fn run<'t>(&self, tx: &'t Transaction<'t>, params: &'t [Param]) -> Result<QueryResult<'t>, Error> {
        match tx.catalog()?.create_index(self.info.clone()) {
            Err(Error::IndexAlreadyExists(name)) if self.if_not_exists => {
                info!(index = %name, "Index exists, skipping");
                Ok(QueryResult::affected(tx, params, 0))
            }
            Err(e) => Err(e),
            Ok(()) => Ok(QueryResult::affected(tx, params, 0)),
        }
    }

    fn is_read_only(&self) -> bool {
        false
    }

    fn kind(&self) -> StatementKind {
        StatementKind::CreateIndex
    }
}

/// `DROP TABLE`.
#[derive(Debug, Clone)]
pub struct DropTableStmt {
    pub name: String,
    pub if_exists: bool,
}

impl Statement for DropTableStmt {
    fn run<'t>(&self, tx: &'t Transaction<'t>, params: &'t [Param]) -> Result<QueryResult<'t>, Error> {
        match tx.catalog()?.drop_table(&self.name) {
            Err(Error::TableNotFound(_)) if self.if_exists => {
                Ok(QueryResult::affected(tx, params, 0))
            }
            Err(e) => Err(e),
            Ok(()) => Ok(QueryResult::affected(tx, params, 0)),
        }
    }

    fn is_read_only(&self) -> bool {
        false
    }

    fn kind(&self) -> StatementKind {
        StatementKind::DropTable
    }
}

/// `DROP INDEX`.
#[derive(Debug, Clone)]
pub struct DropIndexStmt {
    pub name: String,
    pub if_exists: bool,
}

impl Statement for DropIndexStmt {
    fn run<'t>(&self, tx: &'t Transaction<'t>, params: &'t [Param]) -> Result<QueryResult<'t>, Error> {
        match tx.catalog()?.drop_index(&self.name) {
            Err(Error::IndexNotFound(_)) if self.if_exists => {
                Ok(QueryResult::affected(tx, params, 0))
            }
            Err(e) => Err(e),
            Ok(()) => Ok(QueryResult::affected(tx, params, 0)),
        }
    }

    fn is_read_only(&self) -> bool {
        false
    }

    fn kind(&self) -> StatementKind {
        StatementKind::DropIndex
    }
}

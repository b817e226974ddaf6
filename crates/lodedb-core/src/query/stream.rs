//! Streams: pull-based operator pipelines.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::ops::Bound;
use std::sync::Arc;

use bytes::Bytes;
use lodedb_document::{Document, FieldBuffer, Value};

use super::expr::{EvalEnv, Expr, Param};
use super::operator::{Operator, ProjectedExpr, Range};
use crate::catalog::{Index, Table};
use crate::error::Error;
use crate::storage::{key, Transaction};

/// A row flowing through a stream.
#[derive(Debug, Clone)]
pub struct Row {
    /// Storage key, for rows read from a table.
    pub key: Option<Bytes>,
    pub document: Arc<dyn Document>,
}

impl Row {
    fn new(key: Option<Bytes>, document: Arc<dyn Document>) -> Self {
        Self { key, document }
    }

    fn empty() -> Self {
        Self::new(None, Arc::new(FieldBuffer::new()))
    }
}

/// Iterator over the rows of a stream.
pub type RowIter<'t> = Box<dyn Iterator<Item = Result<Row, Error>> + 't>;

/// An ordered chain of operators, the first one producing the rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Stream {
    pub ops: Vec<Operator>,
}

impl Stream {
    /// Create a stream from operators in execution order.
    pub fn new(ops: Vec<Operator>) -> Self {
        Self { ops }
    }

    /// Append an operator, builder style.
    pub fn pipe(mut self, op: Operator) -> Self {
        self.ops.push(op);
        self
    }

    /// Check if the stream has no operators.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Check if the stream starts with a source operator.
    pub fn has_source(&self) -> bool {
        self.ops.first().is_some_and(Operator::is_source)
    }

    /// Check if any operator, including those of nested streams, writes.
    pub fn is_write(&self) -> bool {
        self.ops.iter().any(|op| match op {
            Operator::Concat(streams) => streams.iter().any(Stream::is_write),
            op => op.is_write(),
        })
    }

    /// Execute the stream.
    ///
    /// Rows are produced as the iterator is pulled. A stream that does not
    /// start with a source operates on one empty row; an empty stream yields
    /// nothing.
    pub fn iterate<'t>(
        &'t self,
        tx: &'t Transaction<'t>,
        params: &'t [Param],
    ) -> Result<RowIter<'t>, Error> {
        let env = EvalEnv::new(params);
        let Some(first) = self.ops.first() else {
            return Ok(Box::new(std::iter::empty()));
        };
        let mut rows: RowIter<'t> = if first.is_source() {
            source(first, tx, env)?
        } else {
            Box::new(std::iter::once(Ok(Row::empty())))
        };
        let skip = usize::from(first.is_source());
        for op in &self.ops[skip..] {
            rows = transform(op, rows, tx, env)?;
        }
        Ok(rows)
    }
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, op) in self.ops.iter().enumerate() {
            if i > 0 {
                f.write_str(" | ")?;
            }
            write!(f, "{}", op)?;
        }
        Ok(())
    }
}

fn source<'t>(op: &'t Operator, tx: &'t Transaction<'t>, env: EvalEnv<'t>) -> Result<RowIter<'t>, Error> {
    match op {
        Operator::SeqScan { table } => {
            let table = tx.catalog()?.get_table(table)?;
            Ok(Box::new(table.iter()?.map(|entry| {
                let (key, document) = entry?;
                Ok(Row::new(Some(key), document))
            })))
        }
        Operator::IndexScan { index, ranges } => index_scan(tx, index, ranges),
        Operator::Documents(exprs) => Ok(Box::new(exprs.iter().map(move |expr| {
            match expr.eval(&env)? {
                Value::Document(document) => Ok(Row::new(None, document)),
                other => Err(Error::InvalidExpression(format!(
                    "expected a document, got {}",
                    other.value_type()
                ))),
            }
        }))),
        Operator::Concat(streams) => Ok(Box::new(streams.iter().flat_map(move |stream| {
            match stream.iterate(tx, env.params) {
                Ok(rows) => rows,
                Err(e) => Box::new(std::iter::once(Err(e))) as RowIter<'t>,
            }
        }))),
        op => Err(Error::InvalidPlan(format!("{} cannot start a stream", op))),
    }
}

/// Encoded bounds covering every entry of an index range.
///
/// Bounds are always inclusive of the bound values themselves: an integer
/// and a double can compare equal without sharing a key, so exact bounds
/// are checked on the fetched documents. An unbounded side stays within
/// the type group of the other bound.
fn range_bounds(range: &Range) -> Result<(Bound<Vec<u8>>, Bound<Vec<u8>>), Error> {
    let lower = match (&range.min, &range.max) {
        (Some(min), _) => Bound::Included(key::encode_prefix(min)?),
        (None, Some(max)) => Bound::Included(vec![key::type_prefix(max)?]),
        (None, None) => Bound::Unbounded,
    };
    let upper = match (&range.max, &range.min) {
        (Some(max), _) => past(&key::encode_prefix(max)?),
        (None, Some(min)) => past(&[key::type_prefix(min)?]),
        (None, None) => Bound::Unbounded,
    };
    Ok((lower, upper))
}

/// Upper bound excluding everything past the keys starting with `prefix`.
fn past(prefix: &[u8]) -> Bound<Vec<u8>> {
    match key::prefix_successor(prefix) {
        Some(next) => Bound::Excluded(next),
        None => Bound::Unbounded,
    }
}

fn index_scan<'t>(tx: &'t Transaction<'t>, name: &str, ranges: &'t [Range]) -> Result<RowIter<'t>, Error> {
    let catalog = tx.catalog()?;
    let index = catalog.get_index(name)?;
    let table = catalog.get_table(&index.info().table)?;

    // Keys are read before the first row is produced: downstream writes
    // move index entries and must not be revisited. Overlapping ranges
    // would yield a key twice.
    let mut seen = HashSet::new();
    let mut keys = Vec::new();
    for range in ranges {
        let (lower, upper) = range_bounds(range)?;
        for key in index.scan(as_slice(&lower), as_slice(&upper))? {
            if seen.insert(key.clone()) {
                keys.push(key);
            }
        }
    }

    Ok(Box::new(keys.into_iter().filter_map(move |key| {
        fetch_in_ranges(&table, &index, ranges, &key).transpose()
    })))
}

fn as_slice(bound: &Bound<Vec<u8>>) -> Bound<&[u8]> {
    match bound {
        Bound::Included(k) => Bound::Included(k.as_slice()),
        Bound::Excluded(k) => Bound::Excluded(k.as_slice()),
        Bound::Unbounded => Bound::Unbounded,
    }
}

/// Fetch the document of an index entry if its value is in one of the
/// ranges.
fn fetch_in_ranges(
    table: &Table<'_>,
    index: &Index<'_>,
    ranges: &[Range],
    key: &[u8],
) -> Result<Option<Row>, Error> {
    let document = table.get(key)?;
    let value = match index.path().get_value_from_document(document.as_ref()) {
        Ok(value) => value,
        Err(e) if e.is_not_found() => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    for range in ranges {
        if range.contains(&value)? {
            return Ok(Some(Row::new(Some(Bytes::copy_from_slice(key)), document)));
        }
    }
    Ok(None)
}

fn transform<'t>(
    op: &'t Operator,
    rows: RowIter<'t>,
    tx: &'t Transaction<'t>,
    env: EvalEnv<'t>,
) -> Result<RowIter<'t>, Error> {
    match op {
        Operator::Filter(expr) => Ok(Box::new(rows.filter_map(move |row| {
            let keep = |row: &Row| -> Result<bool, Error> {
                let value = expr.eval(&env.with_document(row.document.as_ref()))?;
                Ok(value.is_truthy()?)
            };
            match row {
                Ok(row) => match keep(&row) {
                    Ok(true) => Some(Ok(row)),
                    Ok(false) => None,
                    Err(e) => Some(Err(e)),
                },
                Err(e) => Some(Err(e)),
            }
        }))),
        Operator::Project(fields) => Ok(Box::new(rows.map(move |row| {
            let row = row?;
            let mut buf = FieldBuffer::with_capacity(fields.len());
            for field in fields {
                match field {
                    ProjectedExpr::Wildcard => {
                        for entry in row.document.fields() {
                            let (name, value) = entry?;
                            buf.set(name.into_owned(), value);
                        }
                    }
                    ProjectedExpr::Named { expr, name } => {
                        let value = expr.eval(&env.with_document(row.document.as_ref()))?;
                        buf.set(name.clone(), value);
                    }
                }
            }
            Ok(Row::new(row.key, Arc::new(buf)))
        }))),
        Operator::Take(n) => Ok(Box::new(rows.take(to_usize(*n)))),
        Operator::Skip(n) => Ok(Box::new(rows.skip(to_usize(*n)))),
        Operator::Sort { expr, desc } => {
            let mut upstream = Some(rows);
            let mut sorted = Vec::new().into_iter();
            Ok(Box::new(std::iter::from_fn(move || {
                if let Some(rows) = upstream.take() {
                    sorted = match sort_rows(rows, expr, *desc, env) {
                        Ok(rows) => rows.into_iter().map(Ok).collect::<Vec<_>>(),
                        Err(e) => vec![Err(e)],
                    }
                    .into_iter();
                }
                sorted.next()
            })))
        }
        Operator::Set { path, expr } => Ok(Box::new(rows.map(move |row| {
            let row = row?;
            let value = expr.eval(&env.with_document(row.document.as_ref()))?;
            let mut buf = FieldBuffer::copy_from(row.document.as_ref())?;
            match buf.set_path(path, value) {
                Ok(()) => Ok(Row::new(row.key, Arc::new(buf))),
                Err(e) if e.is_not_found() => Ok(row),
                Err(e) => Err(e.into()),
            }
        }))),
        Operator::Unset { path } => Ok(Box::new(rows.map(move |row| {
            let row = row?;
            let mut buf = FieldBuffer::copy_from(row.document.as_ref())?;
            match buf.delete_path(path) {
                Ok(()) => Ok(Row::new(row.key, Arc::new(buf))),
                Err(e) if e.is_not_found() => Ok(row),
                Err(e) => Err(e.into()),
            }
        }))),
        Operator::TableInsert { table } => {
            let table = tx.catalog()?.get_table(table)?;
            Ok(Box::new(rows.map(move |row| {
                let (key, document) = table.insert(row?.document.as_ref())?;
                Ok(Row::new(Some(key), document))
            })))
        }
        Operator::TableReplace { table } => {
            let table = tx.catalog()?.get_table(table)?;
            Ok(Box::new(rows.map(move |row| {
                let row = row?;
                let key = stored_key(&row, op)?;
                let document = table.replace(&key, row.document.as_ref())?;
                Ok(Row::new(Some(key), document))
            })))
        }
        Operator::TableDelete { table } => {
            let table = tx.catalog()?.get_table(table)?;
            Ok(Box::new(rows.map(move |row| {
                let row = row?;
                table.delete(&stored_key(&row, op)?)?;
                Ok(row)
            })))
        }
        op => Err(Error::InvalidPlan(format!("{} must start the stream", op))),
    }
}

fn stored_key(row: &Row, op: &Operator) -> Result<Bytes, Error> {
    row.key
        .clone()
        .ok_or_else(|| Error::InvalidPlan(format!("{} needs rows read from a table", op)))
}

fn to_usize(n: u64) -> usize {
    usize::try_from(n).unwrap_or(usize::MAX)
}

fn sort_rows(rows: RowIter<'_>, expr: &Expr, desc: bool, env: EvalEnv<'_>) -> Result<Vec<Row>, Error> {
    let mut keyed = Vec::new();
    for row in rows {
        let row = row?;
        let key = expr.eval(&env.with_document(row.document.as_ref()))?;
        keyed.push((key, row));
    }

    let mut failure = None;
    keyed.sort_by(|(a, _), (b, _)| match a.sort_cmp(b) {
        Ok(ord) if desc => ord.reverse(),
        Ok(ord) => ord,
        Err(e) => {
            failure.get_or_insert(e);
            Ordering::Equal
        }
    });
    if let Some(e) = failure {
        return Err(e.into());
    }
    Ok(keyed.into_iter().map(|(_, row)| row).collect())
}

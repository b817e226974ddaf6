//! Standard optimizer rules.

use lodedb_document::{Path, Value};

use super::expr::{CmpOp, EvalEnv, Expr};
use super::operator::{Operator, ProjectedExpr, Range};
use super::planner::Rule;
use super::stream::Stream;
use crate::error::Error;
use crate::storage::Transaction;

/// Splits `filter(a AND b)` into `filter(a) | filter(b)`.
pub struct SplitAndConditions;

impl Rule for SplitAndConditions {
    fn name(&self) -> &'static str {
        "SplitAndConditions"
    }

    fn apply(&self, stream: Stream, _tx: &Transaction<'_>) -> Result<Option<Stream>, Error> {
        let mut ops = Vec::with_capacity(stream.ops.len());
        for op in stream.ops {
            match op {
                Operator::Filter(expr) => split_and(expr, &mut ops),
                op => ops.push(op),
            }
        }
        Ok(Some(Stream::new(ops)))
    }
}

fn split_and(expr: Expr, ops: &mut Vec<Operator>) {
    match expr {
        Expr::And(l, r) => {
            split_and(*l, ops);
            split_and(*r, ops);
        }
        expr => ops.push(Operator::Filter(expr)),
    }
}

/// Replaces sub-expressions that only depend on literals by their value.
pub struct PrecalculateExprs;

impl Rule for PrecalculateExprs {
    fn name(&self) -> &'static str {
        "PrecalculateExprs"
    }

    fn apply(&self, stream: Stream, _tx: &Transaction<'_>) -> Result<Option<Stream>, Error> {
        precalculate_stream(stream).map(Some)
    }
}

fn precalculate_stream(stream: Stream) -> Result<Stream, Error> {
    let ops = stream
        .ops
        .into_iter()
        .map(precalculate_op)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Stream::new(ops))
}

fn precalculate_op(op: Operator) -> Result<Operator, Error> {
    Ok(match op {
        Operator::Filter(expr) => Operator::Filter(fold(expr)?),
        Operator::Documents(exprs) => Operator::Documents(
            exprs
                .into_iter()
                .map(fold)
                .collect::<Result<Vec<_>, _>>()?,
        ),
        Operator::Project(fields) => Operator::Project(
            fields
                .into_iter()
                .map(|field| match field {
                    ProjectedExpr::Named { expr, name } => Ok(ProjectedExpr::Named {
                        expr: fold(expr)?,
                        name,
                    }),
                    ProjectedExpr::Wildcard => Ok(ProjectedExpr::Wildcard),
                })
                .collect::<Result<Vec<_>, Error>>()?,
        ),
        Operator::Sort { expr, desc } => Operator::Sort {
            expr: fold(expr)?,
            desc,
        },
        Operator::Set { path, expr } => Operator::Set {
            path,
            expr: fold(expr)?,
        },
        Operator::Concat(streams) => Operator::Concat(
            streams
                .into_iter()
                .map(precalculate_stream)
                .collect::<Result<Vec<_>, _>>()?,
        ),
        op => op,
    })
}

fn fold(expr: Expr) -> Result<Expr, Error> {
    if matches!(expr, Expr::Literal(_)) {
        return Ok(expr);
    }
    if expr.is_constant() {
        return Ok(Expr::Literal(expr.eval(&EvalEnv::new(&[]))?));
    }
    let boxed = |e: Box<Expr>| fold(*e).map(Box::new);
    Ok(match expr {
        Expr::Cmp(op, l, r) => Expr::Cmp(op, boxed(l)?, boxed(r)?),
        Expr::And(l, r) => Expr::And(boxed(l)?, boxed(r)?),
        Expr::Or(l, r) => Expr::Or(boxed(l)?, boxed(r)?),
        Expr::Not(e) => Expr::Not(boxed(e)?),
        Expr::Arith(op, l, r) => Expr::Arith(op, boxed(l)?, boxed(r)?),
        Expr::Document(fields) => Expr::Document(
            fields
                .into_iter()
                .map(|(name, e)| Ok((name, fold(e)?)))
                .collect::<Result<Vec<_>, Error>>()?,
        ),
        Expr::Array(items) => {
            Expr::Array(items.into_iter().map(fold).collect::<Result<Vec<_>, _>>()?)
        }
        expr => expr,
    })
}

/// Removes filters whose predicate is a truthy literal.
///
/// A falsy literal predicate means no row gets past the filter; unless a
/// write happens before it, the stream has nothing to execute.
pub struct RemoveUnnecessaryFilters;

impl Rule for RemoveUnnecessaryFilters {
    fn name(&self) -> &'static str {
        "RemoveUnnecessaryFilters"
    }

    fn apply(&self, stream: Stream, _tx: &Transaction<'_>) -> Result<Option<Stream>, Error> {
        let total = stream.ops.len();
        let mut ops: Vec<Operator> = Vec::with_capacity(total);
        for op in stream.ops {
            let truthy = match &op {
                Operator::Filter(Expr::Literal(value)) => Some(value.is_truthy()?),
                _ => None,
            };
            match truthy {
                None => ops.push(op),
                Some(false) if ops.iter().any(writes) => ops.push(op),
                Some(false) => return Ok(None),
                Some(true) => {}
            }
        }
        // a stream of only true filters still yields the empty row
        if ops.is_empty() && total > 0 {
            ops.push(Operator::Filter(Expr::lit(true)));
        }
        Ok(Some(Stream::new(ops)))
    }
}

fn writes(op: &Operator) -> bool {
    match op {
        Operator::Concat(streams) => streams.iter().any(Stream::is_write),
        op => op.is_write(),
    }
}

/// Removes a `project(*)` that is the only projection of a stream reading
/// from a source.
pub struct RemoveUnnecessaryProjections;

impl Rule for RemoveUnnecessaryProjections {
    fn name(&self) -> &'static str {
        "RemoveUnnecessaryProjections"
    }

    fn apply(&self, mut stream: Stream, _tx: &Transaction<'_>) -> Result<Option<Stream>, Error> {
        if !stream.has_source() {
            return Ok(Some(stream));
        }
        let projections: Vec<usize> = stream
            .ops
            .iter()
            .enumerate()
            .filter(|(_, op)| matches!(op, Operator::Project(_)))
            .map(|(i, _)| i)
            .collect();
        if let [i] = projections[..] {
            if matches!(&stream.ops[i], Operator::Project(fields) if fields[..] == [ProjectedExpr::Wildcard])
            {
                stream.ops.remove(i);
            }
        }
        Ok(Some(stream))
    }
}

/// Replaces a leading `seqScan` by an `indexScan` when one of the filters
/// right after it compares an indexed path with a constant.
///
/// Equality is preferred over ranges; among equals, the earliest filter
/// wins. The filter stays in the stream.
pub struct UseIndexBasedOnFilter;

impl Rule for UseIndexBasedOnFilter {
    fn name(&self) -> &'static str {
        "UseIndexBasedOnFilter"
    }

    fn apply(&self, mut stream: Stream, tx: &Transaction<'_>) -> Result<Option<Stream>, Error> {
        let table = match stream.ops.first() {
            Some(Operator::SeqScan { table }) => table.clone(),
            _ => return Ok(Some(stream)),
        };
        let catalog = tx.catalog()?;
        catalog.get_table_info(&table)?;
        let indexes = catalog
            .list_indexes(&table)?
            .into_iter()
            .map(|info| Ok((info.parsed_path()?, info.name)))
            .collect::<Result<Vec<_>, Error>>()?;
        if indexes.is_empty() {
            return Ok(Some(stream));
        }

        let mut best: Option<(bool, &str, Range)> = None;
        for op in &stream.ops[1..] {
            let Operator::Filter(expr) = op else {
                break;
            };
            let Some((path, cmp, value)) = indexable(expr) else {
                continue;
            };
            let Some((_, index)) = indexes.iter().find(|(p, _)| p == path) else {
                continue;
            };
            let range = match cmp {
                CmpOp::Eq => Range::exact(value.clone()),
                CmpOp::Gt => Range::above(value.clone(), false),
                CmpOp::Gte => Range::above(value.clone(), true),
                CmpOp::Lt => Range::below(value.clone(), false),
                CmpOp::Lte => Range::below(value.clone(), true),
                CmpOp::Neq => continue,
            };
            let exact = cmp == CmpOp::Eq;
            let better = match &best {
                None => true,
                Some((best_exact, ..)) => exact && !best_exact,
            };
            if better {
                best = Some((exact, index.as_str(), range));
            }
        }

        if let Some((_, index, range)) = best {
            stream.ops[0] = Operator::IndexScan {
                index: index.to_string(),
                ranges: vec![range],
            };
        }
        Ok(Some(stream))
    }
}

/// Split `path <op> constant`, in either operand order.
fn indexable(expr: &Expr) -> Option<(&Path, CmpOp, &Value)> {
    let Expr::Cmp(op, l, r) = expr else {
        return None;
    };
    let (path, op, value) = match (l.as_ref(), r.as_ref()) {
        (Expr::Field(path), Expr::Literal(value)) => (path, *op, value),
        (Expr::Literal(value), Expr::Field(path)) => (path, op.flip(), value),
        _ => return None,
    };
    if value.is_null() || value.value_type().is_composite() {
        return None;
    }
    Some((path, op, value))
}

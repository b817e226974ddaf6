//! Stream operators and their plan descriptions.

use std::fmt;

use lodedb_document::{Path, PathFragment, Value};

use super::expr::Expr;
use super::stream::Stream;

/// A range of indexed values.
///
/// A missing bound is unbounded on that side.
#[derive(Debug, Clone, PartialEq)]
pub struct Range {
    pub min: Option<Value>,
    pub max: Option<Value>,
    pub exclusive_min: bool,
    pub exclusive_max: bool,
}

impl Range {
    /// The range holding exactly `value`.
    pub fn exact(value: Value) -> Self {
        Self {
            min: Some(value.clone()),
            max: Some(value),
            exclusive_min: false,
            exclusive_max: false,
        }
    }

    /// Values above `value`.
    pub fn above(value: Value, inclusive: bool) -> Self {
        Self {
            min: Some(value),
            max: None,
            exclusive_min: !inclusive,
            exclusive_max: false,
        }
    }

    /// Values below `value`.
    pub fn below(value: Value, inclusive: bool) -> Self {
        Self {
            min: None,
            max: Some(value),
            exclusive_min: false,
            exclusive_max: !inclusive,
        }
    }

    /// Check if `value` falls in the range.
    pub fn contains(&self, value: &Value) -> Result<bool, lodedb_document::Error> {
        if let Some(min) = &self.min {
            match value.compare(min)? {
                Some(ord) if ord.is_gt() || (ord.is_eq() && !self.exclusive_min) => {}
                _ => return Ok(false),
            }
        }
        if let Some(max) = &self.max {
            match value.compare(max)? {
                Some(ord) if ord.is_lt() || (ord.is_eq() && !self.exclusive_max) => {}
                _ => return Ok(false),
            }
        }
        Ok(true)
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let open = self.exclusive_min || self.min.is_none();
        f.write_str(if open { "(" } else { "[" })?;
        match &self.min {
            Some(v) => write!(f, "{}", v)?,
            None => f.write_str("-inf")?,
        }
        f.write_str(", ")?;
        match &self.max {
            Some(v) => write!(f, "{}", v)?,
            None => f.write_str("+inf")?,
        }
        let close = self.exclusive_max || self.max.is_none();
        f.write_str(if close { ")" } else { "]" })
    }
}

/// A projected column.
#[derive(Debug, Clone, PartialEq)]
pub enum ProjectedExpr {
    /// `expr AS name`.
    Named { expr: Expr, name: String },
    /// Every field of the row, `*`.
    Wildcard,
}

impl ProjectedExpr {
    /// Project an expression under a name.
    pub fn named(expr: Expr, name: impl Into<String>) -> Self {
        ProjectedExpr::Named {
            expr,
            name: name.into(),
        }
    }

    /// Project a top-level field under its own name.
    pub fn field(name: impl Into<String>) -> Self {
        let name = name.into();
        ProjectedExpr::Named {
            expr: Expr::field(name.clone()),
            name,
        }
    }
}

impl fmt::Display for ProjectedExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProjectedExpr::Wildcard => f.write_str("*"),
            ProjectedExpr::Named {
                expr: Expr::Field(path),
                name,
            } if is_single_field(path, name) => f.write_str(name),
            ProjectedExpr::Named { expr, name } => write!(f, "{} AS {}", expr, name),
        }
    }
}

fn is_single_field(path: &Path, name: &str) -> bool {
    matches!(path.fragments(), [PathFragment::Field(field)] if field == name)
}

/// One step of a [`Stream`].
///
/// Source operators (`SeqScan`, `IndexScan`, `Documents`, `Concat`) produce
/// rows and may only start a stream; every other operator transforms the
/// rows of the operator before it.
#[derive(Debug, Clone, PartialEq)]
pub enum Operator {
    /// Every document of a table, in key order.
    SeqScan { table: String },
    /// Documents of the index's table whose indexed value is in a range.
    IndexScan { index: String, ranges: Vec<Range> },
    /// One row per expression, each evaluating to a document.
    Documents(Vec<Expr>),
    /// The rows of each stream in turn.
    Concat(Vec<Stream>),
    /// Rows whose predicate is truthy.
    Filter(Expr),
    /// A new document built from the projected columns.
    Project(Vec<ProjectedExpr>),
    /// At most `n` rows.
    Take(u64),
    /// Every row after the first `n`.
    Skip(u64),
    /// Rows ordered by an expression, stable.
    Sort { expr: Expr, desc: bool },
    /// Set the value at a path.
    Set { path: Path, expr: Expr },
    /// Remove the value at a path.
    Unset { path: Path },
    /// Store each row in a table and yield the stored document.
    TableInsert { table: String },
    /// Replace the stored document of each row.
    TableReplace { table: String },
    /// Delete the stored document of each row.
    TableDelete { table: String },
}

impl Operator {
    /// Check if the operator produces rows without an upstream.
    pub fn is_source(&self) -> bool {
        matches!(
            self,
            Operator::SeqScan { .. }
                | Operator::IndexScan { .. }
                | Operator::Documents(_)
                | Operator::Concat(_)
        )
    }

    /// Check if the operator writes to a table.
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            Operator::TableInsert { .. }
                | Operator::TableReplace { .. }
                | Operator::TableDelete { .. }
        )
    }
}

fn write_list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operator::SeqScan { table } => write!(f, "seqScan({})", table),
            Operator::IndexScan { index, ranges } => {
                write!(f, "indexScan(\"{}\", ", index)?;
                write_list(f, ranges)?;
                f.write_str(")")
            }
            Operator::Documents(exprs) => {
                f.write_str("documents(")?;
                write_list(f, exprs)?;
                f.write_str(")")
            }
            Operator::Concat(streams) => {
                f.write_str("concat(")?;
                write_list(f, streams)?;
                f.write_str(")")
            }
            Operator::Filter(expr) => write!(f, "filter({})", expr),
            Operator::Project(fields) => {
                f.write_str("project(")?;
                write_list(f, fields)?;
                f.write_str(")")
            }
            Operator::Take(n) => write!(f, "take({})", n),
            Operator::Skip(n) => write!(f, "skip({})", n),
            Operator::Sort { expr, desc: false } => write!(f, "sort({})", expr),
            Operator::Sort { expr, desc: true } => write!(f, "sortReverse({})", expr),
            Operator::Set { path, expr } => write!(f, "set({}, {})", path, expr),
            Operator::Unset { path } => write!(f, "unset({})", path),
            Operator::TableInsert { table } => write!(f, "tableInsert('{}')", table),
            Operator::TableReplace { table } => write!(f, "tableReplace('{}')", table),
            Operator::TableDelete { table } => write!(f, "tableDelete('{}')", table),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::expr::CmpOp;

    #[test]
    fn test_range_display() {
        assert_eq!(Range::exact(Value::Integer(1)).to_string(), "[1, 1]");
        assert_eq!(Range::above(Value::Integer(1), false).to_string(), "(1, +inf)");
        assert_eq!(Range::below(Value::text("m"), true).to_string(), "(-inf, \"m\"]");
    }

    #[test]
    fn test_range_contains() {
        let above = Range::above(Value::Integer(10), false);
        assert!(!above.contains(&Value::Integer(10)).unwrap());
        assert!(above.contains(&Value::Double(10.5)).unwrap());
        assert!(!above.contains(&Value::text("z")).unwrap());
        assert!(Range::exact(Value::Integer(3)).contains(&Value::Double(3.0)).unwrap());
        assert!(Range::below(Value::Integer(3), true).contains(&Value::Integer(3)).unwrap());
    }

    #[test]
    fn test_operator_display() {
        let filter = Operator::Filter(Expr::compare(CmpOp::Gt, Expr::field("a"), Expr::lit(1)));
        assert_eq!(filter.to_string(), "filter(a > 1)");
        let project = Operator::Project(vec![
            ProjectedExpr::field("a"),
            ProjectedExpr::named(Expr::field("b"), "c"),
            ProjectedExpr::Wildcard,
        ]);
        assert_eq!(project.to_string(), "project(a, b AS c, *)");
        let scan = Operator::IndexScan {
            index: "idx_a".into(),
            ranges: vec![Range::exact(Value::Integer(1))],
        };
        assert_eq!(scan.to_string(), "indexScan(\"idx_a\", [1, 1])");
        assert_eq!(
            Operator::Sort {
                expr: Expr::field("a"),
                desc: true
            }
            .to_string(),
            "sortReverse(a)"
        );
        assert_eq!(
            Operator::Set {
                path: Path::parse("a.b").unwrap(),
                expr: Expr::lit("x")
            }
            .to_string(),
            "set(a.b, \"x\")"
        );
        assert_eq!(
            Operator::TableDelete { table: "t".into() }.to_string(),
            "tableDelete('t')"
        );
    }

    #[test]
    fn test_operator_kinds() {
        assert!(Operator::SeqScan { table: "t".into() }.is_source());
        assert!(!Operator::Take(1).is_source());
        assert!(Operator::TableInsert { table: "t".into() }.is_write());
        assert!(!Operator::Filter(Expr::lit(true)).is_write());
    }
}

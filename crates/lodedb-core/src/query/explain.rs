//! `EXPLAIN`: show the plan a statement would run, without running it.

use tracing::debug;

use super::expr::{Expr, Param};
use super::operator::{Operator, ProjectedExpr};
use super::planner::optimize;
use super::statement::{QueryResult, Statement, StatementKind, StreamStmt};
use super::stream::Stream;
use crate::error::Error;
use crate::storage::Transaction;

/// Plan text for a statement that has nothing to execute.
pub const NO_EXEC: &str = "<no exec>";

/// Wraps a statement and reports its optimized plan.
///
/// The result is a single document `{"plan": "<plan>"}`. The wrapped
/// statement is optimized against the current catalog but never executed,
/// so an explained write leaves the data untouched.
#[derive(Debug)]
pub struct ExplainStmt {
    pub statement: Box<dyn Statement>,
}

impl ExplainStmt {
    pub fn new(statement: impl Statement + 'static) -> Self {
        Self {
            statement: Box::new(statement),
        }
    }

    /// The optimized plan of the wrapped statement.
    pub fn plan(&self, tx: &Transaction<'_>) -> Result<String, Error> {
        let Some(stmt) = self.statement.as_stream() else {
            return Err(Error::UnsupportedStatement(
                "EXPLAIN only works on INSERT, SELECT, UPDATE AND DELETE statements".into(),
            ));
        };
        Ok(match optimize(stmt.stream.clone(), tx)? {
            Some(stream) => stream.to_string(),
            None => NO_EXEC.to_string(),
        })
    }
}

impl Statement for ExplainStmt {
    fn run<'t>(&self, tx: &'t Transaction<'t>, params: &'t [Param]) -> Result<QueryResult<'t>, Error> {
        let plan = self.plan(tx)?;
        debug!(kind = ?self.statement.kind(), plan = %plan, "Explained statement");

        let project = Operator::Project(vec![ProjectedExpr::named(Expr::lit(plan), "plan")]);
        StreamStmt::select(Stream::new(vec![project])).run(tx, params)
    }

    fn is_read_only(&self) -> bool {
        true
    }

    fn kind(&self) -> StatementKind {
        StatementKind::Explain
    }
}

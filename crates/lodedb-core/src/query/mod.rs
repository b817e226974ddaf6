//! Query engine for LodeDB.
//!
//! Statements are built from [`Stream`]s: pipelines of operators whose
//! rendering doubles as the query plan. Before a stream runs, the
//! [`Optimizer`] rewrites it with a fixed list of rules, and
//! [`ExplainStmt`] reports the result of that rewrite without executing it.

mod explain;
mod expr;
mod operator;
mod planner;
mod rules;
mod statement;
mod stream;

pub use explain::{ExplainStmt, NO_EXEC};
pub use expr::{ArithOp, CmpOp, EvalEnv, Expr, Param};
pub use operator::{Operator, ProjectedExpr, Range};
pub use planner::{optimize, Optimizer, Rule, DEFAULT_MAX_PASSES};
pub use rules::{
    PrecalculateExprs, RemoveUnnecessaryFilters, RemoveUnnecessaryProjections,
    SplitAndConditions, UseIndexBasedOnFilter,
};
pub use statement::{
    CreateIndexStmt, CreateTableStmt, DropIndexStmt, DropTableStmt, QueryResult, Statement,
    StatementKind, StreamStmt,
};
pub use stream::{Row, RowIter, Stream};

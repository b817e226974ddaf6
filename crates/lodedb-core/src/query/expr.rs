//! Expressions evaluated against a row.
//!
//! Expressions are built programmatically by whatever parses the query
//! language. Evaluation follows SQL conventions:
//!
//! - a field missing from the row evaluates to NULL
//! - comparisons and arithmetic with a NULL operand yield NULL
//! - `AND`/`OR`/`NOT` use three-valued logic
//! - division or modulo by zero yields NULL

use std::cmp::Ordering;
use std::fmt;

use lodedb_document::{Document, FieldBuffer, Path, Value, ValueBuffer};

use crate::error::Error;

/// A query parameter, bound positionally or by name.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    /// Name for `$name` references, `None` for positional ones.
    pub name: Option<String>,
    /// Bound value.
    pub value: Value,
}

impl Param {
    /// A positional parameter, referenced as `?`.
    pub fn positional(value: impl Into<Value>) -> Self {
        Self {
            name: None,
            value: value.into(),
        }
    }

    /// A named parameter, referenced as `$name`.
    pub fn named(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: Some(name.into()),
            value: value.into(),
        }
    }
}

/// What an expression can see while it is evaluated.
#[derive(Clone, Copy)]
pub struct EvalEnv<'a> {
    /// Parameters of the running statement.
    pub params: &'a [Param],
    /// The current row, if any.
    pub document: Option<&'a dyn Document>,
}

impl<'a> EvalEnv<'a> {
    /// An environment with parameters and no row.
    pub fn new(params: &'a [Param]) -> Self {
        Self {
            params,
            document: None,
        }
    }

    /// The same environment positioned on `document`.
    pub fn with_document(self, document: &'a dyn Document) -> Self {
        Self {
            document: Some(document),
            ..self
        }
    }
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl CmpOp {
    /// The operator that gives the same result with its operands swapped.
    pub fn flip(self) -> Self {
        match self {
            CmpOp::Lt => CmpOp::Gt,
            CmpOp::Lte => CmpOp::Gte,
            CmpOp::Gt => CmpOp::Lt,
            CmpOp::Gte => CmpOp::Lte,
            op => op,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            CmpOp::Eq => "=",
            CmpOp::Neq => "!=",
            CmpOp::Lt => "<",
            CmpOp::Lte => "<=",
            CmpOp::Gt => ">",
            CmpOp::Gte => ">=",
        }
    }

    fn apply(self, left: &Value, right: &Value) -> Result<bool, Error> {
        let ordered = |accept: fn(Ordering) -> bool| -> Result<bool, Error> {
            Ok(left.compare(right)?.is_some_and(accept))
        };
        match self {
            CmpOp::Eq => Ok(left.is_equal(right)?),
            CmpOp::Neq => Ok(!left.is_equal(right)?),
            CmpOp::Lt => ordered(Ordering::is_lt),
            CmpOp::Lte => ordered(Ordering::is_le),
            CmpOp::Gt => ordered(Ordering::is_gt),
            CmpOp::Gte => ordered(Ordering::is_ge),
        }
    }
}

/// Arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl ArithOp {
    fn symbol(self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
            ArithOp::Mod => "%",
        }
    }

    fn apply(self, left: &Value, right: &Value) -> Value {
        match (left, right) {
            (Value::Integer(a), Value::Integer(b)) => self.apply_integers(*a, *b),
            (Value::Duration(a), Value::Duration(b)) => match self {
                ArithOp::Add => a.checked_add(*b).map_or(Value::Null, Value::Duration),
                ArithOp::Sub => a.checked_sub(*b).map_or(Value::Null, Value::Duration),
                _ => Value::Null,
            },
            (a, b) if a.value_type().is_number() && b.value_type().is_number() => {
                match (a.as_double(), b.as_double()) {
                    (Ok(a), Ok(b)) => self.apply_doubles(a, b),
                    _ => Value::Null,
                }
            }
            _ => Value::Null,
        }
    }

    fn apply_integers(self, a: i64, b: i64) -> Value {
        let checked = match self {
            ArithOp::Add => a.checked_add(b),
            ArithOp::Sub => a.checked_sub(b),
            ArithOp::Mul => a.checked_mul(b),
            ArithOp::Div | ArithOp::Mod if b == 0 => return Value::Null,
            ArithOp::Div => a.checked_div(b),
            // only i64::MIN % -1 overflows, and its remainder is 0
            ArithOp::Mod => Some(a.checked_rem(b).unwrap_or(0)),
        };
        // on overflow, fall back to floating point
        checked.map_or_else(|| self.apply_doubles(a as f64, b as f64), Value::Integer)
    }

    fn apply_doubles(self, a: f64, b: f64) -> Value {
        match self {
            ArithOp::Add => Value::Double(a + b),
            ArithOp::Sub => Value::Double(a - b),
            ArithOp::Mul => Value::Double(a * b),
            ArithOp::Div | ArithOp::Mod if b == 0.0 => Value::Null,
            ArithOp::Div => Value::Double(a / b),
            ArithOp::Mod => Value::Double(a % b),
        }
    }
}

/// An expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A constant.
    Literal(Value),
    /// The value at a path of the current row.
    Field(Path),
    /// The n-th positional parameter, starting at 1.
    PositionalParam(usize),
    /// A named parameter.
    NamedParam(String),
    Cmp(CmpOp, Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Arith(ArithOp, Box<Expr>, Box<Expr>),
    /// A document built from named expressions.
    Document(Vec<(String, Expr)>),
    /// An array built from expressions.
    Array(Vec<Expr>),
}

impl Expr {
    /// A literal value.
    pub fn lit(value: impl Into<Value>) -> Self {
        Expr::Literal(value.into())
    }

    /// A top-level field of the current row.
    pub fn field(name: impl Into<String>) -> Self {
        Expr::Field(Path::field(name))
    }

    /// A comparison.
    pub fn compare(op: CmpOp, left: Expr, right: Expr) -> Self {
        Expr::Cmp(op, Box::new(left), Box::new(right))
    }

    pub fn and(left: Expr, right: Expr) -> Self {
        Expr::And(Box::new(left), Box::new(right))
    }

    pub fn or(left: Expr, right: Expr) -> Self {
        Expr::Or(Box::new(left), Box::new(right))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(expr: Expr) -> Self {
        Expr::Not(Box::new(expr))
    }

    /// An arithmetic operation.
    pub fn arith(op: ArithOp, left: Expr, right: Expr) -> Self {
        Expr::Arith(op, Box::new(left), Box::new(right))
    }

    /// Check if the expression depends on neither the row nor parameters.
    pub fn is_constant(&self) -> bool {
        match self {
            Expr::Literal(_) => true,
            Expr::Field(_) | Expr::PositionalParam(_) | Expr::NamedParam(_) => false,
            Expr::Cmp(_, l, r) | Expr::And(l, r) | Expr::Or(l, r) | Expr::Arith(_, l, r) => {
                l.is_constant() && r.is_constant()
            }
            Expr::Not(e) => e.is_constant(),
            Expr::Document(fields) => fields.iter().all(|(_, e)| e.is_constant()),
            Expr::Array(items) => items.iter().all(Expr::is_constant),
        }
    }

    /// Evaluate the expression.
    pub fn eval(&self, env: &EvalEnv<'_>) -> Result<Value, Error> {
        match self {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Field(path) => {
                let Some(document) = env.document else {
                    return Ok(Value::Null);
                };
                match path.get_value_from_document(document) {
                    Ok(value) => Ok(value),
                    Err(e) if e.is_not_found() => Ok(Value::Null),
                    Err(e) => Err(e.into()),
                }
            }
            Expr::PositionalParam(pos) => pos
                .checked_sub(1)
                .and_then(|i| env.params.get(i))
                .map(|p| p.value.clone())
                .ok_or_else(|| Error::ParamNotFound(format!("?{}", pos))),
            Expr::NamedParam(name) => env
                .params
                .iter()
                .find(|p| p.name.as_deref() == Some(name.as_str()))
                .map(|p| p.value.clone())
                .ok_or_else(|| Error::ParamNotFound(format!("${}", name))),
            Expr::Cmp(op, l, r) => {
                let (l, r) = (l.eval(env)?, r.eval(env)?);
                if l.is_null() || r.is_null() {
                    return Ok(Value::Null);
                }
                Ok(Value::Bool(op.apply(&l, &r)?))
            }
            Expr::And(l, r) => {
                let l = truth(&l.eval(env)?)?;
                if l == Some(false) {
                    return Ok(Value::Bool(false));
                }
                match (l, truth(&r.eval(env)?)?) {
                    (_, Some(false)) => Ok(Value::Bool(false)),
                    (Some(true), Some(true)) => Ok(Value::Bool(true)),
                    _ => Ok(Value::Null),
                }
            }
            Expr::Or(l, r) => {
                let l = truth(&l.eval(env)?)?;
                if l == Some(true) {
                    return Ok(Value::Bool(true));
                }
                match (l, truth(&r.eval(env)?)?) {
                    (_, Some(true)) => Ok(Value::Bool(true)),
                    (Some(false), Some(false)) => Ok(Value::Bool(false)),
                    _ => Ok(Value::Null),
                }
            }
            Expr::Not(e) => Ok(truth(&e.eval(env)?)?.map_or(Value::Null, |b| Value::Bool(!b))),
            Expr::Arith(op, l, r) => {
                let (l, r) = (l.eval(env)?, r.eval(env)?);
                Ok(op.apply(&l, &r))
            }
            Expr::Document(fields) => {
                let mut buf = FieldBuffer::with_capacity(fields.len());
                for (name, e) in fields {
                    buf.set(name.clone(), e.eval(env)?);
                }
                Ok(Value::from(buf))
            }
            Expr::Array(items) => {
                let values = items
                    .iter()
                    .map(|e| e.eval(env))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::from(values.into_iter().collect::<ValueBuffer>()))
            }
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            Expr::Or(..) => 1,
            Expr::And(..) => 2,
            Expr::Not(_) => 3,
            Expr::Cmp(..) => 4,
            Expr::Arith(ArithOp::Add | ArithOp::Sub, ..) => 5,
            Expr::Arith(..) => 6,
            _ => 7,
        }
    }
}

/// Truth value in three-valued logic, `None` standing for unknown.
fn truth(value: &Value) -> Result<Option<bool>, Error> {
    if value.is_null() {
        Ok(None)
    } else {
        Ok(Some(value.is_truthy()?))
    }
}

/// Write `expr`, parenthesized if it binds looser than `min`.
fn write_operand(f: &mut fmt::Formatter<'_>, expr: &Expr, min: u8) -> fmt::Result {
    if expr.precedence() < min {
        write!(f, "({})", expr)
    } else {
        write!(f, "{}", expr)
    }
}

fn write_binary(f: &mut fmt::Formatter<'_>, prec: u8, op: &str, l: &Expr, r: &Expr) -> fmt::Result {
    write_operand(f, l, prec)?;
    write!(f, " {} ", op)?;
    write_operand(f, r, prec + 1)
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prec = self.precedence();
        match self {
            Expr::Literal(value) => write!(f, "{}", value),
            Expr::Field(path) => write!(f, "{}", path),
            Expr::PositionalParam(_) => f.write_str("?"),
            Expr::NamedParam(name) => write!(f, "${}", name),
            Expr::Cmp(op, l, r) => {
                write_operand(f, l, prec + 1)?;
                write!(f, " {} ", op.symbol())?;
                write_operand(f, r, prec + 1)
            }
            Expr::And(l, r) => write_binary(f, prec, "AND", l, r),
            Expr::Or(l, r) => write_binary(f, prec, "OR", l, r),
            Expr::Not(e) => {
                f.write_str("NOT ")?;
                write_operand(f, e, prec)
            }
            Expr::Arith(op, l, r) => write_binary(f, prec, op.symbol(), l, r),
            Expr::Document(fields) => {
                f.write_str("{")?;
                for (i, (name, e)) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", name, e)?;
                }
                f.write_str("}")
            }
            Expr::Array(items) => {
                f.write_str("[")?;
                for (i, e) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", e)?;
                }
                f.write_str("]")
            }
        }
    }
}

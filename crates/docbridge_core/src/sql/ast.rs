//! Parsed statement forms.

use crate::error::{CoreError, CoreResult};
use crate::value::{Id, Object, Thing, Value};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Bound query parameters.
pub type Vars = BTreeMap<String, Value>;

/// One parsed statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// `CREATE [ONLY] target [data]`
    Create {
        /// Return a single value instead of an array.
        only: bool,
        /// Table or record to create.
        what: Target,
        /// Field assignments.
        data: Option<Data>,
    },
    /// `SELECT projection FROM [ONLY] target [WHERE ...] [LIMIT n]`
    Select {
        /// What to return from each record.
        projection: Projection,
        /// Return a single value instead of an array.
        only: bool,
        /// Table or record to read.
        what: Target,
        /// Optional filter.
        cond: Option<Cond>,
        /// Optional row limit.
        limit: Option<usize>,
    },
    /// `UPDATE [ONLY] target [data] [WHERE ...]`
    Update {
        /// Return a single value instead of an array.
        only: bool,
        /// Table or record to update.
        what: Target,
        /// Field assignments.
        data: Option<Data>,
        /// Optional filter.
        cond: Option<Cond>,
    },
    /// `DELETE [ONLY] target [WHERE ...]`
    Delete {
        /// Return a single value instead of an array.
        only: bool,
        /// Table or record to delete.
        what: Target,
        /// Optional filter.
        cond: Option<Cond>,
    },
    /// `RETURN expr`
    Return(Expr),
    /// `DEFINE TABLE name`
    DefineTable(String),
    /// `USE [NS name] [DB name]`
    Use {
        /// Namespace to switch to.
        ns: Option<String>,
        /// Database to switch to.
        db: Option<String>,
    },
}

impl Statement {
    /// Returns true if the statement needs a namespace and database.
    pub fn needs_database(&self) -> bool {
        !matches!(self, Statement::Use { .. } | Statement::Return(_))
    }
}

/// The resource a statement operates on.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    /// Every record of a table.
    Table(String),
    /// One record.
    Record(String, Expr),
}

impl Target {
    /// Table name.
    pub fn table(&self) -> &str {
        match self {
            Target::Table(tb) | Target::Record(tb, _) => tb,
        }
    }

    /// Resolves the record id, if the target names one.
    pub fn resolve_id(&self, vars: &Vars) -> CoreResult<Option<Id>> {
        match self {
            Target::Table(_) => Ok(None),
            Target::Record(_, expr) => expr.eval(vars).and_then(value_to_id).map(Some),
        }
    }
}

/// Converts an evaluated id expression into a record id.
pub fn value_to_id(value: Value) -> CoreResult<Id> {
    match value {
        Value::Number(crate::value::Number::Int(n)) => Ok(Id::Number(n)),
        Value::Strand(s) => Ok(Id::String(s)),
        Value::Array(a) => Ok(Id::Array(a)),
        Value::Object(o) => Ok(Id::Object(o)),
        other => Err(CoreError::type_mismatch(format!(
            "a record id must be an int, string, array or object, found {}",
            other.kind()
        ))),
    }
}

/// Field data attached to CREATE and UPDATE.
#[derive(Debug, Clone, PartialEq)]
pub enum Data {
    /// `SET field = expr, ...`
    Set(Vec<(String, Expr)>),
    /// `CONTENT expr`
    Content(Expr),
}

/// SELECT projection.
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    /// `*`
    All,
    /// `VALUE field`
    Value(String),
    /// `f1, f2, ...`
    Fields(Vec<String>),
}

/// A single `field op expr` filter.
#[derive(Debug, Clone, PartialEq)]
pub struct Cond {
    /// Field name.
    pub field: String,
    /// Comparison operator.
    pub op: CmpOp,
    /// Right-hand side.
    pub value: Expr,
}

impl Cond {
    /// Tests a record against the filter.
    pub fn matches(&self, record: &Object, vars: &Vars) -> CoreResult<bool> {
        let rhs = self.value.eval(vars)?;
        let lhs = field_of(record, &self.field);
        let ord = lhs.compare(&rhs);
        Ok(match self.op {
            CmpOp::Eq => ord == Some(Ordering::Equal),
            CmpOp::Ne => ord != Some(Ordering::Equal),
            CmpOp::Lt => ord == Some(Ordering::Less),
            CmpOp::Le => matches!(ord, Some(Ordering::Less | Ordering::Equal)),
            CmpOp::Gt => ord == Some(Ordering::Greater),
            CmpOp::Ge => matches!(ord, Some(Ordering::Greater | Ordering::Equal)),
        })
    }
}

/// Reads a field from a record, NONE when absent.
pub fn field_of(record: &Object, field: &str) -> Value {
    record.get(field).cloned().unwrap_or_default()
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    /// `=`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

/// An unevaluated expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Constant value.
    Literal(Value),
    /// `$name`
    Param(String),
    /// `[a, b, ...]`
    Array(Vec<Expr>),
    /// `{ k: v, ... }`
    Object(Vec<(String, Expr)>),
    /// `table:id`
    Thing(String, Box<Expr>),
}

impl Expr {
    /// Evaluates the expression against bound parameters.
    ///
    /// Unbound parameters evaluate to NONE.
    pub fn eval(&self, vars: &Vars) -> CoreResult<Value> {
        Ok(match self {
            Expr::Literal(v) => v.clone(),
            Expr::Param(name) => vars.get(name).cloned().unwrap_or_default(),
            Expr::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|e| e.eval(vars))
                    .collect::<CoreResult<_>>()?,
            ),
            Expr::Object(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(k, e)| Ok((k.clone(), e.eval(vars)?)))
                    .collect::<CoreResult<Object>>()?,
            ),
            Expr::Thing(tb, id) => Value::Thing(Thing::new(tb.clone(), value_to_id(id.eval(vars)?)?)),
        })
    }
}

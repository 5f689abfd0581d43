//! Bound expressions
//!
//! Every component that looks at a value position of a statement (a
//! predicate operand, an INSERT value, an assignment) sees it through
//! `BoundExpression`: either something the router can use directly, or a
//! shape it has to treat as opaque.

use shardbind_common::Value;
use std::fmt;

/// A value position of a statement after binding
#[derive(Debug, Clone, PartialEq)]
pub enum BoundExpression {
    /// Literal written in the statement text
    Literal(Value),
    /// Bind parameter, by zero-based index
    Parameter(usize),
    /// Column reference
    Column(ColumnRef),
    /// Subquery, identified by the byte offset it starts at
    Subquery { start: usize },
    /// Anything else, kept as normalized SQL text
    Complex(String),
}

impl BoundExpression {
    /// Whether the value is known once parameters are bound
    pub fn is_literal_or_parameter(&self) -> bool {
        matches!(self, BoundExpression::Literal(_) | BoundExpression::Parameter(_))
    }

    /// The concrete value, if it is a literal or a bound parameter
    pub fn resolve(&self, parameters: &[Value]) -> Option<Value> {
        match self {
            BoundExpression::Literal(value) => Some(value.clone()),
            BoundExpression::Parameter(index) => parameters.get(*index).cloned(),
            _ => None,
        }
    }

    pub fn parameter_index(&self) -> Option<usize> {
        match self {
            BoundExpression::Parameter(index) => Some(*index),
            _ => None,
        }
    }
}

impl fmt::Display for BoundExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoundExpression::Literal(value) => write!(f, "{}", value),
            BoundExpression::Parameter(index) => write!(f, "${}", index + 1),
            BoundExpression::Column(column) => write!(f, "{}", column),
            BoundExpression::Subquery { start } => write!(f, "<subquery@{}>", start),
            BoundExpression::Complex(text) => write!(f, "{}", text),
        }
    }
}

/// A column reference with its owning table resolved, when possible
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnRef {
    pub name: String,
    /// Owner as written (`o` in `o.user_id`)
    pub owner: Option<String>,
    /// Actual table the column belongs to; `None` when attribution failed
    pub table: Option<String>,
}

impl ColumnRef {
    pub fn new(name: impl Into<String>, owner: Option<String>, table: Option<String>) -> Self {
        ColumnRef {
            name: name.into(),
            owner,
            table,
        }
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.table {
            Some(table) => write!(f, "{}@{}", self.name, table),
            None => write!(f, "{}", self.name),
        }
    }
}

/// `column = value` in a SET list or ON DUPLICATE KEY UPDATE
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnAssignment {
    pub column: ColumnRef,
    pub value: BoundExpression,
}

impl fmt::Display for ColumnAssignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.column, self.value)
    }
}

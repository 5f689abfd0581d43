//! Expression binding

use crate::column_scope::ColumnScope;
use crate::{BoundExpression, ColumnRef};
use rust_decimal::Decimal;
use shardbind_common::{Error, LogicalType, Result, Value};
use shardbind_parser::{parameter_index, SourceText};
use sqlparser::ast as sql;
use sqlparser::ast::{Spanned, Visit, Visitor};
use std::ops::ControlFlow;

/// Bind a value position of a statement
pub(crate) fn bind_expression(
    expr: &sql::Expr,
    scope: &ColumnScope,
    source: &SourceText<'_>,
) -> BoundExpression {
    if let Some(simple) = bind_simple(expr) {
        return simple;
    }
    match expr {
        sql::Expr::Identifier(_) | sql::Expr::CompoundIdentifier(_) => {
            match column_parts(expr) {
                Some((owner, name)) => BoundExpression::Column(bind_column_ref(owner, name, scope)),
                None => BoundExpression::Complex(expr.to_string()),
            }
        }
        sql::Expr::Nested(inner) => bind_expression(inner, scope, source),
        sql::Expr::Subquery(query) => match source.offset(query.span().start) {
            Some(start) => BoundExpression::Subquery { start },
            None => BoundExpression::Complex(expr.to_string()),
        },
        _ => BoundExpression::Complex(expr.to_string()),
    }
}

/// Bind an expression only if it is a literal or a parameter marker
///
/// Signed numbers (`-1`) count as literals.
pub(crate) fn bind_simple(expr: &sql::Expr) -> Option<BoundExpression> {
    match expr {
        sql::Expr::Value(value) => match bind_value(value) {
            BoundExpression::Complex(_) => None,
            bound => Some(bound),
        },
        sql::Expr::Nested(inner) => bind_simple(inner),
        sql::Expr::UnaryOp {
            op: sql::UnaryOperator::Minus,
            expr,
        } => match expr.as_ref() {
            sql::Expr::Value(sql::Value::Number(n, _)) => {
                number_value(&format!("-{}", n)).map(BoundExpression::Literal)
            }
            _ => None,
        },
        sql::Expr::UnaryOp {
            op: sql::UnaryOperator::Plus,
            expr,
        } => bind_simple(expr),
        _ => None,
    }
}

/// Bind a literal value
pub(crate) fn bind_value(value: &sql::Value) -> BoundExpression {
    match value {
        sql::Value::Number(n, _) => match number_value(n) {
            Some(v) => BoundExpression::Literal(v),
            None => BoundExpression::Complex(n.clone()),
        },
        sql::Value::SingleQuotedString(s)
        | sql::Value::DoubleQuotedString(s)
        | sql::Value::NationalStringLiteral(s)
        | sql::Value::EscapedStringLiteral(s) => BoundExpression::Literal(Value::Varchar(s.clone())),
        sql::Value::Boolean(b) => BoundExpression::Literal(Value::Boolean(*b)),
        sql::Value::Null => BoundExpression::Literal(Value::Null),
        sql::Value::Placeholder(marker) => match parameter_index(marker) {
            Some(index) => BoundExpression::Parameter(index),
            None => BoundExpression::Complex(marker.clone()),
        },
        _ => BoundExpression::Complex(value.to_string()),
    }
}

fn number_value(n: &str) -> Option<Value> {
    if let Ok(i) = n.parse::<i64>() {
        return Some(match i32::try_from(i) {
            Ok(small) => Value::Integer(small),
            Err(_) => Value::BigInt(i),
        });
    }
    if let Ok(d) = n.parse::<Decimal>() {
        return Some(Value::Decimal(d));
    }
    n.parse::<f64>().ok().map(Value::Double)
}

/// Resolve a column reference against the tables visible in `scope`
pub(crate) fn bind_column_ref(owner: Option<String>, name: String, scope: &ColumnScope) -> ColumnRef {
    let table = scope
        .resolve(owner.as_deref(), &name)
        .and_then(|t| t.physical_name())
        .map(str::to_string);
    ColumnRef::new(name, owner, table)
}

/// Indexes of the parameter markers under `node`, in text order
pub(crate) fn parameter_indexes<V: Visit>(node: &V) -> Vec<usize> {
    struct MarkerCollector(Vec<usize>);

    impl Visitor for MarkerCollector {
        type Break = ();

        fn pre_visit_expr(&mut self, expr: &sql::Expr) -> ControlFlow<Self::Break> {
            if let sql::Expr::Value(sql::Value::Placeholder(marker)) = expr {
                if let Some(index) = parameter_index(marker) {
                    self.0.push(index);
                }
            }
            ControlFlow::Continue(())
        }
    }

    let mut collector = MarkerCollector(Vec::new());
    let _ = node.visit(&mut collector);
    collector.0
}

/// Split a plain column reference into (owner, name)
///
/// `db.t.c` keeps `t` as the owner.
pub(crate) fn column_parts(expr: &sql::Expr) -> Option<(Option<String>, String)> {
    match expr {
        sql::Expr::Identifier(ident) => Some((None, ident.value.clone())),
        sql::Expr::CompoundIdentifier(idents) => match idents.as_slice() {
            [] => None,
            [name] => Some((None, name.value.clone())),
            [.., owner, name] => Some((Some(owner.value.clone()), name.value.clone())),
        },
        sql::Expr::Nested(inner) => column_parts(inner),
        _ => None,
    }
}

/// Expression text used to match select items against ORDER BY / GROUP BY
/// items: case-folded, with quotes and whitespace removed
pub(crate) fn normalize_expression(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '`' | '"' | '[' | ']'))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Map a column type of a CREATE TABLE statement to the catalog's type
pub fn bind_data_type(data_type: &sql::DataType) -> Result<LogicalType> {
    let logical = match data_type {
        sql::DataType::Boolean | sql::DataType::Bool => LogicalType::Boolean,
        sql::DataType::TinyInt(_) | sql::DataType::SmallInt(_) => LogicalType::SmallInt,
        sql::DataType::Int(_) | sql::DataType::Integer(_) | sql::DataType::MediumInt(_) => {
            LogicalType::Integer
        }
        sql::DataType::BigInt(_) => LogicalType::BigInt,
        sql::DataType::Float(_)
        | sql::DataType::Real
        | sql::DataType::Double
        | sql::DataType::DoublePrecision => LogicalType::Double,
        sql::DataType::Decimal(info) | sql::DataType::Numeric(info) => {
            let (width, scale) = match info {
                sql::ExactNumberInfo::PrecisionAndScale(p, s) => {
                    (decimal_digits(*p, data_type)?, decimal_digits(*s, data_type)?)
                }
                sql::ExactNumberInfo::Precision(p) => (decimal_digits(*p, data_type)?, 0),
                sql::ExactNumberInfo::None => (18, 3),
            };
            LogicalType::Decimal { width, scale }
        }
        sql::DataType::Char(_)
        | sql::DataType::Varchar(_)
        | sql::DataType::Text
        | sql::DataType::String(_) => LogicalType::Varchar,
        sql::DataType::Blob(_) | sql::DataType::Bytea => LogicalType::Blob,
        sql::DataType::Date => LogicalType::Date,
        sql::DataType::Time(_, _) => LogicalType::Time,
        sql::DataType::Timestamp(_, _) | sql::DataType::Datetime(_) => LogicalType::Timestamp,
        sql::DataType::Uuid => LogicalType::Uuid,
        sql::DataType::JSON => LogicalType::Json,
        _ => LogicalType::Unknown,
    };
    Ok(logical)
}

fn decimal_digits(digits: u64, data_type: &sql::DataType) -> Result<u8> {
    u8::try_from(digits)
        .map_err(|_| Error::UnsupportedExpression(format!("{} exceeds 255 digits", data_type)))
}

//! LIMIT / OFFSET / FETCH
//!
//! Bounds are recorded as written, literal or parameter. The actual numbers
//! are only known once parameters are bound.

use shardbind_common::{Error, Result, Value};
use shardbind_parser::parameter_index;
use sqlparser::ast as sql;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaginationValue {
    Literal(i64),
    /// Zero-based parameter index
    Parameter(usize),
}

impl PaginationValue {
    fn from_expr(expr: &sql::Expr) -> Result<Self> {
        match expr {
            sql::Expr::Value(sql::Value::Number(n, _)) => n
                .parse::<i64>()
                .map(PaginationValue::Literal)
                .map_err(|_| Error::UnsupportedExpression(format!("pagination value {}", n))),
            sql::Expr::Value(sql::Value::Placeholder(marker)) => parameter_index(marker)
                .map(PaginationValue::Parameter)
                .ok_or_else(|| Error::UnsupportedExpression(format!("pagination value {}", marker))),
            sql::Expr::Nested(inner) => PaginationValue::from_expr(inner),
            other => Err(Error::UnsupportedExpression(format!(
                "pagination value {}",
                other
            ))),
        }
    }

    /// The number this bound stands for; an unbound parameter reads as `None`
    fn resolve(&self, parameters: &[Value]) -> Result<Option<u64>> {
        let value = match self {
            PaginationValue::Literal(n) => *n,
            PaginationValue::Parameter(_) if parameters.is_empty() => return Ok(None),
            PaginationValue::Parameter(index) => {
                let parameter = parameters.get(*index).ok_or(Error::ParameterOutOfRange {
                    index: *index,
                    count: parameters.len(),
                })?;
                parameter.as_i64().ok_or_else(|| {
                    Error::UnsupportedExpression(format!("pagination parameter {}", parameter))
                })?
            }
        };
        Ok(Some(value.max(0) as u64))
    }
}

/// Pagination bounds as written in the statement
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PaginationSegments {
    pub offset: Option<PaginationValue>,
    pub row_count: Option<PaginationValue>,
}

impl PaginationSegments {
    pub(crate) fn from_query(query: &sql::Query) -> Result<Self> {
        let offset = query
            .offset
            .as_ref()
            .map(|o| PaginationValue::from_expr(&o.value))
            .transpose()?;
        let row_count = match (&query.limit, &query.fetch) {
            (Some(limit), _) => Some(PaginationValue::from_expr(limit)?),
            (None, Some(sql::Fetch { quantity: Some(q), .. })) => Some(PaginationValue::from_expr(q)?),
            _ => None,
        };
        Ok(PaginationSegments { offset, row_count })
    }

    pub fn is_empty(&self) -> bool {
        self.offset.is_none() && self.row_count.is_none()
    }
}

/// Row count the rewritten statement asks each shard for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowLimit {
    Bounded(u64),
    Unbounded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginationContext {
    segments: PaginationSegments,
    actual_offset: u64,
    actual_row_count: Option<u64>,
    /// Grouped rows are merged before the limit applies
    unbounded_revision: bool,
}

impl PaginationContext {
    pub(crate) fn new(
        segments: PaginationSegments,
        parameters: &[Value],
        unbounded_revision: bool,
    ) -> Result<Self> {
        let actual_offset = match &segments.offset {
            Some(offset) => offset.resolve(parameters)?.unwrap_or(0),
            None => 0,
        };
        let actual_row_count = match &segments.row_count {
            Some(row_count) => row_count.resolve(parameters)?,
            None => None,
        };
        Ok(PaginationContext {
            segments,
            actual_offset,
            actual_row_count,
            unbounded_revision,
        })
    }

    pub fn has_pagination(&self) -> bool {
        !self.segments.is_empty()
    }

    pub fn offset_segment(&self) -> Option<PaginationValue> {
        self.segments.offset
    }

    pub fn row_count_segment(&self) -> Option<PaginationValue> {
        self.segments.row_count
    }

    pub fn actual_offset(&self) -> u64 {
        self.actual_offset
    }

    pub fn actual_row_count(&self) -> Option<u64> {
        self.actual_row_count
    }

    /// Every shard starts from its first row
    pub fn revised_offset(&self) -> u64 {
        0
    }

    /// Every shard returns enough rows to cover the original window
    pub fn revised_row_count(&self) -> Option<RowLimit> {
        self.segments.row_count?;
        if self.unbounded_revision {
            return Some(RowLimit::Unbounded);
        }
        let row_count = self.actual_row_count?;
        Some(RowLimit::Bounded(self.actual_offset.saturating_add(row_count)))
    }
}

//! Bound statements

use crate::condition::OrCondition;
use crate::delete_context::DeleteStatementContext;
use crate::insert_context::InsertStatementContext;
use crate::select_context::SelectStatementContext;
use crate::tables_context::TablesContext;
use crate::token::SqlToken;
use crate::update_context::UpdateStatementContext;
use shardbind_common::{Error, Result, Value};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StatementKind::Select => "SELECT",
            StatementKind::Insert => "INSERT",
            StatementKind::Update => "UPDATE",
            StatementKind::Delete => "DELETE",
        };
        write!(f, "{}", name)
    }
}

/// A statement bound against metadata and the sharding rule
#[derive(Debug, Clone)]
pub enum StatementContext {
    Select(SelectStatementContext),
    Insert(InsertStatementContext),
    Update(UpdateStatementContext),
    Delete(DeleteStatementContext),
}

impl StatementContext {
    pub fn kind(&self) -> StatementKind {
        match self {
            StatementContext::Select(_) => StatementKind::Select,
            StatementContext::Insert(_) => StatementKind::Insert,
            StatementContext::Update(_) => StatementKind::Update,
            StatementContext::Delete(_) => StatementKind::Delete,
        }
    }

    pub fn tables(&self) -> &TablesContext {
        match self {
            StatementContext::Select(context) => context.tables(),
            StatementContext::Insert(context) => context.tables(),
            StatementContext::Update(context) => context.tables(),
            StatementContext::Delete(context) => context.tables(),
        }
    }

    pub fn sharding_conditions(&self) -> &OrCondition {
        match self {
            StatementContext::Select(context) => context.sharding_conditions(),
            StatementContext::Insert(context) => context.sharding_conditions(),
            StatementContext::Update(context) => context.sharding_conditions(),
            StatementContext::Delete(context) => context.sharding_conditions(),
        }
    }

    pub fn tokens(&self) -> &[SqlToken] {
        match self {
            StatementContext::Select(context) => context.tokens(),
            StatementContext::Insert(context) => context.tokens(),
            StatementContext::Update(context) => context.tokens(),
            StatementContext::Delete(context) => context.tokens(),
        }
    }

    pub fn parameters(&self) -> &[Value] {
        match self {
            StatementContext::Select(context) => context.parameters(),
            StatementContext::Insert(context) => context.parameters(),
            StatementContext::Update(context) => context.parameters(),
            StatementContext::Delete(context) => context.parameters(),
        }
    }

    /// Rebind against new parameters; an empty list keeps the current binding
    pub fn bind(&self, parameters: &[Value]) -> Result<StatementContext> {
        Ok(match self {
            StatementContext::Select(context) => StatementContext::Select(context.bind(parameters)?),
            StatementContext::Insert(context) => StatementContext::Insert(context.bind(parameters)?),
            StatementContext::Update(context) => StatementContext::Update(context.bind(parameters)?),
            StatementContext::Delete(context) => StatementContext::Delete(context.bind(parameters)?),
        })
    }

    pub fn as_select(&self) -> Option<&SelectStatementContext> {
        match self {
            StatementContext::Select(context) => Some(context),
            _ => None,
        }
    }

    pub fn as_insert(&self) -> Option<&InsertStatementContext> {
        match self {
            StatementContext::Insert(context) => Some(context),
            _ => None,
        }
    }

    pub fn as_update(&self) -> Option<&UpdateStatementContext> {
        match self {
            StatementContext::Update(context) => Some(context),
            _ => None,
        }
    }

    pub fn as_delete(&self) -> Option<&DeleteStatementContext> {
        match self {
            StatementContext::Delete(context) => Some(context),
            _ => None,
        }
    }
}

impl fmt::Display for StatementContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.kind())?;
        writeln!(f, "  tables: {}", self.tables().table_names().join(", "))?;
        let conditions = self.sharding_conditions();
        if conditions.is_empty() {
            writeln!(f, "  sharding conditions: none")?;
        }
        for (i, group) in conditions.and_conditions.iter().enumerate() {
            let parts: Vec<String> = group.conditions.iter().map(|c| c.to_string()).collect();
            writeln!(f, "  sharding condition {}: {}", i + 1, parts.join(" AND "))?;
        }
        match self {
            StatementContext::Select(context) => {
                if let Some(combine) = context.combine() {
                    writeln!(
                        f,
                        "  combine: {}{}",
                        combine.operator,
                        if combine.all { " ALL" } else { "" }
                    )?;
                }
                for (start, nested) in context.subquery_contexts() {
                    if let Some(subquery_type) = nested.subquery_type() {
                        writeln!(f, "  subquery@{}: {}", start, subquery_type)?;
                    }
                }
                let pagination = context.pagination();
                if pagination.has_pagination() {
                    let row_count = pagination
                        .actual_row_count()
                        .map_or_else(|| "all".to_string(), |n| n.to_string());
                    writeln!(
                        f,
                        "  pagination: offset {}, row count {}",
                        pagination.actual_offset(),
                        row_count
                    )?;
                }
            }
            StatementContext::Insert(context) => {
                writeln!(f, "  columns: {}", context.column_names().join(", "))?;
                writeln!(f, "  rows: {}", context.value_list_count())?;
                if let Some(key) = context.generated_key_context() {
                    let values: Vec<String> = key.values.iter().map(|v| v.to_string()).collect();
                    writeln!(f, "  generated {}: {}", key.column, values.join(", "))?;
                }
            }
            StatementContext::Update(context) => {
                for assignment in context.sharding_column_assignments() {
                    writeln!(f, "  sharding column assignment: {}", assignment)?;
                }
            }
            StatementContext::Delete(_) => {}
        }
        for token in self.tokens() {
            writeln!(f, "  token: {}", token)?;
        }
        Ok(())
    }
}

/// A statement binding `expected` parameters needs at least that many values
pub(crate) fn check_parameter_count(expected: usize, parameters: &[Value]) -> Result<()> {
    if parameters.len() < expected {
        return Err(Error::ParameterOutOfRange {
            index: expected - 1,
            count: parameters.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_parameter_count() {
        assert!(check_parameter_count(0, &[]).is_ok());
        assert!(check_parameter_count(1, &[Value::Integer(1), Value::Integer(2)]).is_ok());
        match check_parameter_count(3, &[Value::Integer(1)]) {
            Err(Error::ParameterOutOfRange { index, count }) => {
                assert_eq!(index, 2);
                assert_eq!(count, 1);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_statement_kind_display() {
        assert_eq!(StatementKind::Select.to_string(), "SELECT");
        assert_eq!(StatementKind::Delete.to_string(), "DELETE");
    }
}

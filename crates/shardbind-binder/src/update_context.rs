//! UPDATE statement context

use crate::bound_statement::check_parameter_count;
use crate::column_scope::ColumnScope;
use crate::condition::{ConditionExtractor, JoinCondition, OrCondition};
use crate::expression_binder::{bind_column_ref, bind_expression};
use crate::select_context::{FromClause, QueryLevel};
use crate::statement_binder::StatementBinder;
use crate::tables_context::{extract_tables, object_name_parts, TablesContext};
use crate::token::SqlToken;
use crate::ColumnAssignment;
use shardbind_common::{Error, Result, Value};
use sqlparser::ast as sql;

#[derive(Debug, Clone)]
pub struct UpdateStatementContext {
    pub(crate) tables: TablesContext,
    pub(crate) sharding_conditions: OrCondition,
    pub(crate) join_conditions: Vec<JoinCondition>,
    pub(crate) where_segments: Vec<sql::Expr>,
    pub(crate) assignments: Vec<ColumnAssignment>,
    pub(crate) sharding_column_assignments: Vec<ColumnAssignment>,
    pub(crate) tokens: Vec<SqlToken>,
    pub(crate) parameter_count: usize,
    pub(crate) parameters: Vec<Value>,
}

impl UpdateStatementContext {
    pub fn tables(&self) -> &TablesContext {
        &self.tables
    }

    pub fn sharding_conditions(&self) -> &OrCondition {
        &self.sharding_conditions
    }

    pub fn join_conditions(&self) -> &[JoinCondition] {
        &self.join_conditions
    }

    pub fn where_segments(&self) -> &[sql::Expr] {
        &self.where_segments
    }

    pub fn assignments(&self) -> &[ColumnAssignment] {
        &self.assignments
    }

    /// Assignments that would move a row to another shard
    pub fn sharding_column_assignments(&self) -> &[ColumnAssignment] {
        &self.sharding_column_assignments
    }

    pub fn tokens(&self) -> &[SqlToken] {
        &self.tokens
    }

    pub fn parameters(&self) -> &[Value] {
        &self.parameters
    }

    pub fn bind(&self, parameters: &[Value]) -> Result<Self> {
        if parameters.is_empty() {
            return Ok(self.clone());
        }
        check_parameter_count(self.parameter_count, parameters)?;
        Ok(UpdateStatementContext {
            parameters: parameters.to_vec(),
            ..self.clone()
        })
    }
}

impl StatementBinder<'_> {
    pub(crate) fn build_update(&self, statement: &sql::Statement) -> Result<UpdateStatementContext> {
        let sql::Statement::Update {
            table,
            assignments,
            selection,
            ..
        } = statement
        else {
            return Err(Error::Internal(format!("not an UPDATE: {}", statement)));
        };

        let outer = ColumnScope::default();
        let mut from = FromClause::default();
        self.collect_table_with_joins(table, QueryLevel::root(&outer), &mut from)?;
        let scope = ColumnScope::new(std::mem::take(&mut from.tables));

        let mut predicates: Vec<&sql::Expr> = selection.iter().collect();
        predicates.extend(from.predicates.iter().copied());
        let extracted = ConditionExtractor::new(&scope, self.binder.rule()).extract(&predicates);

        let mut bound = Vec::with_capacity(assignments.len());
        for assignment in assignments {
            let (owner, column) = match &assignment.target {
                sql::AssignmentTarget::ColumnName(name) => object_name_parts(name),
                sql::AssignmentTarget::Tuple(_) => {
                    return Err(Error::NotImplemented(format!("tuple assignment: {}", assignment)))
                }
            };
            bound.push(ColumnAssignment {
                column: bind_column_ref(owner, column, &scope),
                value: bind_expression(&assignment.value, &scope, &self.source),
            });
        }
        let rule = self.binder.rule();
        let sharding_column_assignments = bound
            .iter()
            .filter(|a| {
                a.column
                    .table
                    .as_deref()
                    .is_some_and(|t| rule.is_sharding_column(&a.column.name, t))
            })
            .cloned()
            .collect();

        Ok(UpdateStatementContext {
            tables: TablesContext::new(extract_tables(statement, &self.source, &[])),
            sharding_conditions: extracted.sharding_conditions,
            join_conditions: extracted.join_conditions,
            where_segments: predicates.into_iter().cloned().collect(),
            assignments: bound,
            sharding_column_assignments,
            tokens: Vec::new(),
            parameter_count: 0,
            parameters: Vec::new(),
        })
    }
}

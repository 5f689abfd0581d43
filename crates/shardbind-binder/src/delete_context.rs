//! DELETE statement context
//!
//! Multi-table deletes name their targets by table or by alias
//! (`DELETE o FROM t_order o`). A target that is an alias of another
//! reference is not a table of its own.

use crate::bound_statement::check_parameter_count;
use crate::column_scope::ColumnScope;
use crate::condition::{ConditionExtractor, JoinCondition, OrCondition};
use crate::select_context::{FromClause, QueryLevel};
use crate::statement_binder::StatementBinder;
use crate::tables_context::{extract_tables, filter_delete_aliases, simple_table, TablesContext};
use crate::token::SqlToken;
use shardbind_common::{Error, Result, Value};
use sqlparser::ast as sql;

#[derive(Debug, Clone)]
pub struct DeleteStatementContext {
    pub(crate) tables: TablesContext,
    pub(crate) sharding_conditions: OrCondition,
    pub(crate) join_conditions: Vec<JoinCondition>,
    pub(crate) where_segments: Vec<sql::Expr>,
    pub(crate) tokens: Vec<SqlToken>,
    pub(crate) parameter_count: usize,
    pub(crate) parameters: Vec<Value>,
}

impl DeleteStatementContext {
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
        Ok(DeleteStatementContext {
            parameters: parameters.to_vec(),
            ..self.clone()
        })
    }
}

impl StatementBinder<'_> {
    pub(crate) fn build_delete(&self, statement: &sql::Statement) -> Result<DeleteStatementContext> {
        let sql::Statement::Delete(delete) = statement else {
            return Err(Error::Internal(format!("not a DELETE: {}", statement)));
        };

        let from_tables = match &delete.from {
            sql::FromTable::WithFromKeyword(tables) | sql::FromTable::WithoutKeyword(tables) => tables,
        };
        let outer = ColumnScope::default();
        let mut from = FromClause::default();
        for table in from_tables.iter().chain(delete.using.iter().flatten()) {
            self.collect_table_with_joins(table, QueryLevel::root(&outer), &mut from)?;
        }
        let scope = ColumnScope::new(std::mem::take(&mut from.tables));

        let mut predicates: Vec<&sql::Expr> = delete.selection.iter().collect();
        predicates.extend(from.predicates.iter().copied());
        let extracted = ConditionExtractor::new(&scope, self.binder.rule()).extract(&predicates);

        let targets: Vec<_> = delete
            .tables
            .iter()
            .map(|name| simple_table(name, None, &self.source))
            .collect();
        let references = extract_tables(statement, &self.source, &[]);

        Ok(DeleteStatementContext {
            tables: TablesContext::new(filter_delete_aliases(targets, references)),
            sharding_conditions: extracted.sharding_conditions,
            join_conditions: extracted.join_conditions,
            where_segments: predicates.into_iter().cloned().collect(),
            tokens: Vec::new(),
            parameter_count: 0,
            parameters: Vec::new(),
        })
    }
}

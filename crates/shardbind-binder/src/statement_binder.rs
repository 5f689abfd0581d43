//! Statement binding

use crate::bound_statement::StatementContext;
use crate::column_scope::ColumnScope;
use crate::expression_binder::bind_data_type;
use crate::insert_context::InsertStatementContext;
use crate::select_context::{QueryLevel, SelectStatementContext};
use crate::subquery::SubqueryKeys;
use crate::tables_context::{extract_tables, object_name_parts, simple_table, SimpleTable, TablesContext};
use crate::token::{finish_tokens, owner_tokens, table_tokens, SqlToken};
use crate::Binder;
use shardbind_catalog::{Column, ColumnId};
use shardbind_common::{Error, Result};
use shardbind_parser::{ParsedStatement, SourceText};
use sqlparser::ast as sql;
use sqlparser::ast::{Spanned, Visit};
use tracing::debug;

/// State shared by the context builders while one statement is bound
pub(crate) struct StatementBinder<'a> {
    pub binder: &'a Binder,
    pub source: SourceText<'a>,
    pub keys: SubqueryKeys,
}

impl<'a> StatementBinder<'a> {
    pub fn new(binder: &'a Binder, sql: &'a str) -> Self {
        let source = SourceText::new(sql);
        let keys = SubqueryKeys::new(&source);
        StatementBinder {
            binder,
            source,
            keys,
        }
    }

    /// Key a nested query's context is stored under
    pub fn subquery_key(&self, query: &sql::Query) -> usize {
        self.keys.key(query.span(), &self.source)
    }

    fn bind(&self, statement: &sql::Statement, parameter_count: usize) -> Result<StatementContext> {
        match statement {
            sql::Statement::Query(query) => {
                let outer = ColumnScope::default();
                let mut base = self.build_query(query, QueryLevel::root(&outer))?;
                let references = extract_tables(statement, &self.source, &[]);
                base.tokens = self.tokens(statement, references);
                base.parameter_count = parameter_count;
                Ok(StatementContext::Select(SelectStatementContext::new(base)?))
            }
            sql::Statement::Insert(insert) => {
                let mut base = self.build_insert(insert)?;
                let mut references = vec![base.table.clone()];
                references.extend(extract_tables(statement, &self.source, &[]));
                base.tokens = self.tokens(statement, references);
                base.parameter_count = parameter_count;
                Ok(StatementContext::Insert(InsertStatementContext::new(
                    base,
                    self.binder.rule_handle(),
                )?))
            }
            sql::Statement::Update { .. } => {
                let mut context = self.build_update(statement)?;
                context.tokens = self.tokens(statement, extract_tables(statement, &self.source, &[]));
                context.parameter_count = parameter_count;
                Ok(StatementContext::Update(context))
            }
            sql::Statement::Delete(delete) => {
                let mut context = self.build_delete(statement)?;
                let mut references: Vec<SimpleTable> = delete
                    .tables
                    .iter()
                    .map(|name| simple_table(name, None, &self.source))
                    .collect();
                references.extend(extract_tables(statement, &self.source, &[]));
                context.tokens = self.tokens(statement, references);
                context.parameter_count = parameter_count;
                Ok(StatementContext::Delete(context))
            }
            other => Err(Error::NotImplemented(format!("binding {}", statement_name(other)))),
        }
    }

    /// Rewrite markers for every table reference, repeated ones included
    fn tokens<V: Visit>(&self, node: &V, references: Vec<SimpleTable>) -> Vec<SqlToken> {
        let rule = self.binder.rule();
        let mut tokens = table_tokens(&references, rule, &self.source);
        let tables = TablesContext::new(references);
        tokens.extend(owner_tokens(node, &tables, rule, &self.source));
        finish_tokens(tokens)
    }
}

fn statement_name(statement: &sql::Statement) -> String {
    let text = statement.to_string();
    text.split_whitespace().take(2).collect::<Vec<_>>().join(" ")
}

/// Bind a statement
pub(crate) fn bind_statement(binder: &Binder, parsed: &ParsedStatement) -> Result<StatementContext> {
    let statement_binder = StatementBinder::new(binder, &parsed.sql);
    let context = statement_binder.bind(&parsed.statement, parsed.parameter_count)?;
    debug!(
        kind = %context.kind(),
        tables = context.tables().len(),
        conditions = context.sharding_conditions().len(),
        parameters = parsed.parameter_count,
        "statement bound"
    );
    Ok(context)
}

/// Add the table a CREATE TABLE statement defines to the catalog.
/// Returns the qualified name of the table.
pub(crate) fn register_table(binder: &Binder, statement: &sql::Statement) -> Result<String> {
    let sql::Statement::CreateTable(create) = statement else {
        return Err(Error::NotImplemented(format!(
            "metadata from {}",
            statement_name(statement)
        )));
    };
    if create.query.is_some() {
        return Err(Error::NotImplemented("CREATE TABLE ... AS SELECT".to_string()));
    }

    let (schema, name) = object_name_parts(&create.name);
    let schema = match schema {
        Some(schema) => schema,
        None => binder
            .current_database()
            .map(str::to_string)
            .ok_or(Error::NoDatabaseSelected)?,
    };
    let qualified = format!("{}.{}", schema, name);
    let catalog = binder.catalog();
    catalog.get_or_create_schema(&schema);
    if create.if_not_exists && catalog.get_table(&schema, &name).is_some() {
        return Ok(qualified);
    }

    let primary_keys: Vec<String> = create
        .constraints
        .iter()
        .filter_map(|constraint| match constraint {
            sql::TableConstraint::PrimaryKey { columns, .. } => Some(columns),
            _ => None,
        })
        .flatten()
        .map(|c| c.value.to_lowercase())
        .collect();

    let mut columns = Vec::with_capacity(create.columns.len());
    for (i, def) in create.columns.iter().enumerate() {
        let mut nullable = true;
        let mut primary_key = primary_keys.contains(&def.name.value.to_lowercase());
        let mut generated = false;
        for option in &def.options {
            match &option.option {
                sql::ColumnOption::NotNull => nullable = false,
                sql::ColumnOption::Unique { is_primary, .. } => primary_key |= *is_primary,
                sql::ColumnOption::Generated { .. } => generated = true,
                // MySQL AUTO_INCREMENT
                sql::ColumnOption::DialectSpecific(tokens) => {
                    generated |= tokens
                        .iter()
                        .any(|t| t.to_string().eq_ignore_ascii_case("AUTO_INCREMENT"));
                }
                _ => {}
            }
        }
        columns.push(
            Column::new(i as ColumnId, def.name.value.clone(), bind_data_type(&def.data_type)?)
                .with_nullable(nullable && !primary_key)
                .with_primary_key(primary_key)
                .with_generated(generated),
        );
    }

    let column_count = columns.len();
    catalog.create_table(&schema, &name, columns)?;
    debug!(table = %qualified, columns = column_count, "table registered");
    Ok(qualified)
}

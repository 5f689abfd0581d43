//! shardbind binder - statement contexts for sharded SQL
//!
//! The binder takes a parsed statement and resolves:
//! - the tables it references, with their aliases and offsets
//! - which columns belong to which table
//! - the sharding conditions a router can use
//! - projection, ordering, pagination and generated key details needed
//!   to rewrite the statement and merge its results

mod bound_expression;
mod bound_statement;
mod column_scope;
mod condition;
mod delete_context;
mod expression_binder;
mod insert_context;
mod order_by;
mod pagination;
mod predicate;
mod projection;
mod select_context;
mod statement_binder;
mod subquery;
mod tables_context;
mod token;
mod update_context;

pub use bound_expression::*;
pub use bound_statement::*;
pub use condition::{AndCondition, Condition, JoinCondition, OrCondition};
pub use delete_context::DeleteStatementContext;
pub use expression_binder::bind_data_type;
pub use insert_context::{
    GeneratedKeyColumn, GeneratedKeyContext, InsertBase, InsertBinding, InsertRow,
    InsertStatementContext, InsertValueContext, OnDuplicateUpdateContext,
};
pub use order_by::{GroupByContext, NullsOrder, OrderByContext, OrderByItem, OrderByItemKind, OrderDirection};
pub use pagination::{PaginationContext, PaginationSegments, PaginationValue, RowLimit};
pub use projection::{
    AggregationProjection, AggregationType, Projection, ProjectionKind, ProjectionsContext,
};
pub use select_context::{CombineContext, SelectBase, SelectBinding, SelectStatementContext};
pub use subquery::SubqueryType;
pub use tables_context::{SimpleTable, TablesContext};
pub use token::{SqlToken, SqlTokenKind};
pub use update_context::UpdateStatementContext;

use shardbind_catalog::{Catalog, Table};
use shardbind_common::{Error, Result};
use shardbind_parser::ParsedStatement;
use shardbind_rule::ShardingRule;
use std::sync::Arc;

/// Nesting allowed below the outermost query
pub const DEFAULT_MAX_SUBQUERY_DEPTH: usize = 32;

/// The binder holds what binding a statement reads: metadata, the sharding
/// rule and the database unqualified table names belong to
pub struct Binder {
    catalog: Arc<Catalog>,
    rule: Arc<dyn ShardingRule>,
    current_database: Option<String>,
    max_subquery_depth: usize,
}

impl Binder {
    pub fn new(catalog: Arc<Catalog>, rule: Arc<dyn ShardingRule>) -> Self {
        Binder {
            catalog,
            rule,
            current_database: None,
            max_subquery_depth: DEFAULT_MAX_SUBQUERY_DEPTH,
        }
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.current_database = Some(database.into());
        self
    }

    pub fn with_max_subquery_depth(mut self, depth: usize) -> Self {
        self.max_subquery_depth = depth;
        self
    }

    /// Bind a parsed statement
    pub fn bind(&self, parsed: &ParsedStatement) -> Result<StatementContext> {
        statement_binder::bind_statement(self, parsed)
    }

    /// Register the table of a CREATE TABLE statement in the catalog
    pub fn register_table(&self, parsed: &ParsedStatement) -> Result<String> {
        statement_binder::register_table(self, &parsed.statement)
    }

    /// Get the catalog
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn rule(&self) -> &dyn ShardingRule {
        self.rule.as_ref()
    }

    pub(crate) fn rule_handle(&self) -> Arc<dyn ShardingRule> {
        self.rule.clone()
    }

    /// Database unqualified table names resolve against
    pub fn current_database(&self) -> Option<&str> {
        self.current_database.as_deref()
    }

    pub fn max_subquery_depth(&self) -> usize {
        self.max_subquery_depth
    }

    /// Column names of a referenced table. `None` when the table can't be
    /// looked up, which leaves its columns unknown rather than failing.
    pub(crate) fn table_columns(&self, table: &SimpleTable) -> Result<Option<Vec<String>>> {
        let schema = match (&table.schema, &self.current_database) {
            (Some(schema), _) => {
                if self.catalog.get_schema(schema).is_none() {
                    return Err(Error::UnknownDatabase(schema.clone()));
                }
                schema
            }
            (None, Some(database)) => database,
            (None, None) => return Ok(None),
        };
        Ok(self.catalog.get_table(schema, &table.name).map(|metadata| {
            metadata
                .column_names()
                .into_iter()
                .map(str::to_string)
                .collect()
        }))
    }

    /// Metadata of a table a statement can't be bound without
    pub(crate) fn required_table_metadata(&self, table: &SimpleTable) -> Result<Option<Arc<Table>>> {
        let schema = match (&table.schema, &self.current_database) {
            (Some(schema), _) => {
                if self.catalog.get_schema(schema).is_none() {
                    return Err(Error::UnknownDatabase(schema.clone()));
                }
                schema
            }
            (None, Some(database)) => database,
            (None, None) => return Err(Error::NoDatabaseSelected),
        };
        Ok(self.catalog.get_table(schema, &table.name))
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use shardbind_catalog::{Column, ColumnId};
    use shardbind_common::LogicalType;
    use shardbind_parser::{parse_statement, DatabaseType};
    use shardbind_rule::{KeyGenerateStrategy, KeyGeneratorConfig, ShardingRuleConfig, ShardingRuleSet};

    pub const DATABASE: &str = "sharding_db";

    fn table(name: &str, columns: &[&str]) -> Table {
        let columns = columns
            .iter()
            .enumerate()
            .map(|(i, c)| Column::new(i as ColumnId, *c, LogicalType::BigInt))
            .collect();
        Table::new(0, name.to_string(), columns)
    }

    pub fn catalog() -> Arc<Catalog> {
        let catalog = Catalog::new();
        catalog.load_tables(
            DATABASE,
            vec![
                table("t_order", &["order_id", "user_id", "status"]),
                table("t_order_item", &["item_id", "order_id", "user_id", "price"]),
                table("t_user", &["id", "name"]),
            ],
        );
        Arc::new(catalog)
    }

    /// `t_order` and `t_order_item` shard on `user_id`; `t_order.order_id`
    /// comes from a sequence starting at 1
    pub fn rule() -> Arc<dyn ShardingRule> {
        let config = ShardingRuleConfig::default()
            .with_table(
                "t_order",
                &["user_id"],
                Some(KeyGeneratorConfig::new("order_id", KeyGenerateStrategy::Sequence)),
            )
            .with_table("t_order_item", &["user_id"], None);
        Arc::new(ShardingRuleSet::new(&config).unwrap())
    }

    pub fn binder() -> Binder {
        Binder::new(catalog(), rule()).with_database(DATABASE)
    }

    pub fn bind(sql: &str) -> Result<StatementContext> {
        let parsed = parse_statement(sql, DatabaseType::MySql)?;
        binder().bind(&parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_support::{binder, catalog, rule, DATABASE};

    #[test]
    fn test_table_columns_degrade_without_database() {
        let binder = Binder::new(catalog(), rule());
        assert_eq!(binder.table_columns(&SimpleTable::new("t_order")).unwrap(), None);
    }

    #[test]
    fn test_table_columns() {
        let columns = binder().table_columns(&SimpleTable::new("t_user")).unwrap();
        assert_eq!(columns, Some(vec!["id".to_string(), "name".to_string()]));
        assert_eq!(binder().table_columns(&SimpleTable::new("t_missing")).unwrap(), None);
    }

    #[test]
    fn test_qualified_unknown_database() {
        let mut table = SimpleTable::new("t_order");
        table.schema = Some("other_db".to_string());
        assert!(matches!(
            binder().table_columns(&table),
            Err(Error::UnknownDatabase(name)) if name == "other_db"
        ));

        table.schema = Some(DATABASE.to_string());
        assert!(binder().required_table_metadata(&table).unwrap().is_some());
    }
}

//! shardbind - statement binding for sharded SQL databases
//!
//! shardbind turns SQL text into a statement context a sharding proxy can
//! act on:
//! - the logical tables the statement touches
//! - the sharding conditions a router can use to pick shards
//! - rewrite markers for table names
//! - projection, ordering, pagination and generated key details for
//!   rewriting and result merging
//!
//! # Example
//!
//! ```rust
//! use shardbind::{EngineConfig, ShardingBinder};
//! use shardbind::rule::ShardingRuleConfig;
//!
//! let rule = ShardingRuleConfig::default().with_table("t_order", &["user_id"], None);
//! let binder = ShardingBinder::new(EngineConfig::default().with_rule(rule)).unwrap();
//!
//! let context = binder.bind("SELECT * FROM t_order WHERE user_id = 10").unwrap();
//! assert_eq!(context.sharding_conditions().len(), 1);
//! ```

mod config;

pub use config::EngineConfig;

pub use shardbind_binder as binder;
pub use shardbind_catalog as catalog;
pub use shardbind_common as common;
pub use shardbind_parser as parser;
pub use shardbind_rule as rule;

pub use shardbind_binder::{StatementContext, StatementKind};
pub use shardbind_common::{Error, Result, Value};
pub use shardbind_parser::DatabaseType;

use shardbind_binder::Binder;
use shardbind_catalog::Catalog;
use shardbind_parser::{parse_statement, ParsedStatement};
use shardbind_rule::{ShardingRule, ShardingRuleSet};
use sqlparser::ast as sql;
use std::sync::Arc;
use tracing::info;

/// Binds statements against one logical database and its sharding rule
pub struct ShardingBinder {
    database_type: DatabaseType,
    catalog: Arc<Catalog>,
    rules: Arc<ShardingRuleSet>,
    binder: Binder,
}

impl ShardingBinder {
    pub fn new(config: EngineConfig) -> Result<Self> {
        let rules = Arc::new(ShardingRuleSet::new(&config.rule)?);
        let catalog = Arc::new(Catalog::new());
        match &config.default_database {
            Some(database) => {
                let table_count = config.tables.len();
                catalog.load_tables(database, config.tables);
                info!(database = %database, tables = table_count, "metadata loaded");
            }
            None if !config.tables.is_empty() => {
                return Err(Error::Config(
                    "table metadata needs a default_database".to_string(),
                ))
            }
            None => {}
        }

        let rule: Arc<dyn ShardingRule> = rules.clone();
        let mut binder =
            Binder::new(catalog.clone(), rule).with_max_subquery_depth(config.max_subquery_depth);
        if let Some(database) = config.default_database {
            binder = binder.with_database(database);
        }

        Ok(ShardingBinder {
            database_type: config.database_type,
            catalog,
            rules,
            binder,
        })
    }

    /// Get the catalog
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn rules(&self) -> &ShardingRuleSet {
        &self.rules
    }

    pub fn database_type(&self) -> DatabaseType {
        self.database_type
    }

    pub fn current_database(&self) -> Option<&str> {
        self.binder.current_database()
    }

    pub fn parse(&self, sql: &str) -> Result<ParsedStatement> {
        parse_statement(sql, self.database_type)
    }

    /// Bind a statement without parameters
    pub fn bind(&self, sql: &str) -> Result<StatementContext> {
        self.binder.bind(&self.parse(sql)?)
    }

    /// Bind a statement once; parameters are supplied per execution
    pub fn prepare(&self, sql: &str) -> Result<PreparedStatement> {
        let parsed = self.parse(sql)?;
        let context = self.binder.bind(&parsed)?;
        Ok(PreparedStatement { parsed, context })
    }

    /// Register the table a CREATE TABLE statement defines
    pub fn execute_ddl(&self, sql: &str) -> Result<String> {
        self.binder.register_table(&self.parse(sql)?)
    }

    /// Register CREATE TABLE statements, prepare everything else
    pub fn execute(&self, sql: &str) -> Result<Outcome> {
        let parsed = self.parse(sql)?;
        if matches!(parsed.statement, sql::Statement::CreateTable(_)) {
            return Ok(Outcome::Registered(self.binder.register_table(&parsed)?));
        }
        let context = self.binder.bind(&parsed)?;
        Ok(Outcome::Prepared(PreparedStatement { parsed, context }))
    }
}

/// What `ShardingBinder::execute` did with a statement
#[derive(Debug)]
pub enum Outcome {
    /// A table was registered, by qualified name
    Registered(String),
    Prepared(PreparedStatement),
}

/// A statement bound once and rebound for each set of parameters
#[derive(Debug, Clone)]
pub struct PreparedStatement {
    parsed: ParsedStatement,
    context: StatementContext,
}

impl PreparedStatement {
    pub fn sql(&self) -> &str {
        &self.parsed.sql
    }

    pub fn parameter_count(&self) -> usize {
        self.parsed.parameter_count
    }

    /// The context bound without parameters
    pub fn context(&self) -> &StatementContext {
        &self.context
    }

    pub fn bind(&self, parameters: &[Value]) -> Result<StatementContext> {
        self.context.bind(parameters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shardbind_rule::ShardingRuleConfig;

    fn engine() -> ShardingBinder {
        let rule = ShardingRuleConfig::default().with_table("t_order", &["user_id"], None);
        ShardingBinder::new(EngineConfig::default().with_rule(rule).with_database("sharding_db")).unwrap()
    }

    #[test]
    fn test_bind_without_metadata() {
        let context = engine()
            .bind("SELECT * FROM t_order WHERE user_id = 10")
            .unwrap();
        assert_eq!(context.kind(), StatementKind::Select);
        assert_eq!(context.tables().table_names(), vec!["t_order"]);
    }

    #[test]
    fn test_execute_registers_table() {
        let engine = engine();
        let outcome = engine
            .execute("CREATE TABLE t_order (order_id BIGINT, user_id INT, status VARCHAR(10))")
            .unwrap();
        assert!(matches!(outcome, Outcome::Registered(ref name) if name == "sharding_db.t_order"));
        assert!(engine.catalog().get_table("sharding_db", "t_order").is_some());

        match engine.execute("INSERT INTO t_order VALUES (1, 2, 'a')").unwrap() {
            Outcome::Prepared(prepared) => {
                let insert = prepared.context().as_insert().unwrap();
                assert_eq!(insert.column_names(), vec!["order_id", "user_id", "status"]);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_prepared_statement() {
        let prepared = engine()
            .prepare("SELECT * FROM t_order WHERE user_id = ? LIMIT ?")
            .unwrap();
        assert_eq!(prepared.parameter_count(), 2);
        let context = prepared
            .bind(&[Value::Integer(3), Value::Integer(10)])
            .unwrap();
        let select = context.as_select().unwrap();
        assert_eq!(select.pagination().actual_row_count(), Some(10));
        assert!(prepared.bind(&[Value::Integer(3)]).is_err());
    }

    #[test]
    fn test_tables_need_database() {
        let config = EngineConfig::from_json_str(r#"{"tables": [{"name": "t", "columns": []}]}"#).unwrap();
        assert!(matches!(ShardingBinder::new(config), Err(Error::Config(_))));
    }
}

//! shardbind rule - what the binder needs to know about sharding
//!
//! The binder only asks a handful of questions of the sharding rule:
//! - Is this table sharded, broadcast, or part of a binding group?
//! - Is this column of this table a sharding column?
//! - Which column of a table is filled by a key generator, and what is its next value?
//!
//! `ShardingRule` is that interface; `ShardingRuleSet` answers it from a
//! deserialized `ShardingRuleConfig`.

mod config;
mod keygen;

pub use config::{KeyGenerateStrategy, KeyGeneratorConfig, ShardingRuleConfig, TableRuleConfig};
pub use keygen::{
    create_key_generator, KeyGenerator, SequenceKeyGenerator, SnowflakeKeyGenerator,
    UuidKeyGenerator,
};

use hashbrown::HashMap;
use shardbind_common::{Error, Result, Value};
use std::sync::Arc;
use tracing::debug;

/// Sharding rule lookups consumed while binding a statement
pub trait ShardingRule: Send + Sync {
    /// Whether the table has a sharding rule
    fn is_sharding_table(&self, table: &str) -> bool;

    /// Whether `column` decides the shard of rows in `table`
    fn is_sharding_column(&self, column: &str, table: &str) -> bool;

    /// Name of the column filled by a key generator, if the table has one
    fn generated_key_column(&self, table: &str) -> Option<String>;

    /// Next value for the generated key column of a table
    fn generate_id(&self, table: &str, column: &str) -> Result<Value>;

    fn is_broadcast_table(&self, _table: &str) -> bool {
        false
    }

    /// The binding group containing `table`, if any
    fn binding_group(&self, _table: &str) -> Option<Vec<String>> {
        None
    }
}

struct TableRule {
    sharding_columns: Vec<String>,
    key_column: Option<String>,
    key_generator: Option<Arc<dyn KeyGenerator>>,
}

/// Rule set built from configuration; names are matched case-insensitively
pub struct ShardingRuleSet {
    tables: HashMap<String, TableRule>,
    broadcast_tables: Vec<String>,
    binding_groups: Vec<Vec<String>>,
}

impl ShardingRuleSet {
    pub fn new(config: &ShardingRuleConfig) -> Result<Self> {
        let mut tables = HashMap::new();
        for (name, table_config) in &config.tables {
            let sharding_columns = if table_config.sharding_columns.is_empty() {
                &config.default_sharding_columns
            } else {
                &table_config.sharding_columns
            };
            let (key_column, key_generator) = match &table_config.key_generator {
                Some(key) => (
                    Some(key.column.to_lowercase()),
                    Some(create_key_generator(key)?),
                ),
                None => (None, None),
            };
            tables.insert(
                name.to_lowercase(),
                TableRule {
                    sharding_columns: sharding_columns.iter().map(|c| c.to_lowercase()).collect(),
                    key_column,
                    key_generator,
                },
            );
        }

        let binding_groups: Vec<Vec<String>> = config
            .binding_tables
            .iter()
            .map(|group| group.iter().map(|t| t.to_lowercase()).collect())
            .collect();
        for table in binding_groups.iter().flatten() {
            if !tables.contains_key(table) {
                return Err(Error::Config(format!(
                    "binding table {} has no sharding rule",
                    table
                )));
            }
        }

        debug!(
            tables = tables.len(),
            binding_groups = binding_groups.len(),
            "sharding rule loaded"
        );

        Ok(ShardingRuleSet {
            tables,
            broadcast_tables: config
                .broadcast_tables
                .iter()
                .map(|t| t.to_lowercase())
                .collect(),
            binding_groups,
        })
    }

    /// Logical table names with a rule, sorted
    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn sharding_columns(&self, table: &str) -> Vec<String> {
        self.tables
            .get(&table.to_lowercase())
            .map(|rule| rule.sharding_columns.clone())
            .unwrap_or_default()
    }
}

impl ShardingRule for ShardingRuleSet {
    fn is_sharding_table(&self, table: &str) -> bool {
        self.tables.contains_key(&table.to_lowercase())
    }

    fn is_sharding_column(&self, column: &str, table: &str) -> bool {
        self.tables
            .get(&table.to_lowercase())
            .map(|rule| {
                rule.sharding_columns
                    .iter()
                    .any(|c| c.eq_ignore_ascii_case(column))
            })
            .unwrap_or(false)
    }

    fn generated_key_column(&self, table: &str) -> Option<String> {
        self.tables
            .get(&table.to_lowercase())
            .and_then(|rule| rule.key_column.clone())
    }

    fn generate_id(&self, table: &str, column: &str) -> Result<Value> {
        let rule = self
            .tables
            .get(&table.to_lowercase())
            .ok_or_else(|| Error::KeyGeneration(format!("no sharding rule for table {}", table)))?;
        match (&rule.key_column, &rule.key_generator) {
            (Some(key_column), Some(generator)) if key_column.eq_ignore_ascii_case(column) => {
                generator.next_key()
            }
            _ => Err(Error::KeyGeneration(format!(
                "column {} of table {} is not a generated key",
                column, table
            ))),
        }
    }

    fn is_broadcast_table(&self, table: &str) -> bool {
        self.broadcast_tables
            .iter()
            .any(|t| t.eq_ignore_ascii_case(table))
    }

    fn binding_group(&self, table: &str) -> Option<Vec<String>> {
        let table = table.to_lowercase();
        self.binding_groups
            .iter()
            .find(|group| group.contains(&table))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order_rule() -> ShardingRuleSet {
        let config = ShardingRuleConfig {
            default_sharding_columns: vec!["user_id".to_string()],
            broadcast_tables: vec!["t_config".to_string()],
            binding_tables: vec![vec!["t_order".to_string(), "t_order_item".to_string()]],
            ..Default::default()
        }
        .with_table(
            "t_order",
            &[],
            Some(KeyGeneratorConfig::new("order_id", KeyGenerateStrategy::Sequence)),
        )
        .with_table("T_ORDER_ITEM", &["user_id", "order_id"], None);
        ShardingRuleSet::new(&config).unwrap()
    }

    #[test]
    fn test_default_sharding_columns() {
        let rule = order_rule();
        assert!(rule.is_sharding_column("user_id", "t_order"));
        assert!(rule.is_sharding_column("USER_ID", "T_Order"));
        assert!(!rule.is_sharding_column("order_id", "t_order"));
        assert!(rule.is_sharding_column("order_id", "t_order_item"));
        assert!(!rule.is_sharding_column("user_id", "t_user"));
    }

    #[test]
    fn test_generate_id() {
        let rule = order_rule();
        assert_eq!(rule.generated_key_column("t_order").as_deref(), Some("order_id"));
        assert_eq!(rule.generate_id("t_order", "order_id").unwrap(), Value::BigInt(1));
        assert_eq!(rule.generate_id("t_order", "ORDER_ID").unwrap(), Value::BigInt(2));
        assert!(rule.generate_id("t_order", "user_id").is_err());
        assert!(rule.generate_id("t_user", "id").is_err());
    }

    #[test]
    fn test_broadcast_and_binding() {
        let rule = order_rule();
        assert!(rule.is_broadcast_table("T_CONFIG"));
        assert!(!rule.is_sharding_table("t_config"));
        assert_eq!(
            rule.binding_group("t_order_item"),
            Some(vec!["t_order".to_string(), "t_order_item".to_string()])
        );
        assert_eq!(rule.table_names(), vec!["t_order", "t_order_item"]);
    }

    #[test]
    fn test_binding_table_without_rule() {
        let config = ShardingRuleConfig {
            binding_tables: vec![vec!["t_missing".to_string()]],
            ..Default::default()
        };
        assert!(matches!(ShardingRuleSet::new(&config), Err(Error::Config(_))));
    }
}

//! Rule configuration
//!
//! Every struct deserializes from JSON with missing fields falling back to
//! their defaults, so a configuration only has to name what it changes.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

/// Sharding rule configuration for one logical database
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShardingRuleConfig {
    /// Sharding columns applied to every rule table that names none of its own
    pub default_sharding_columns: Vec<String>,
    /// Sharded tables, keyed by logical table name
    pub tables: HashMap<String, TableRuleConfig>,
    /// Tables replicated in full to every data source
    pub broadcast_tables: Vec<String>,
    /// Groups of tables sharded identically, joinable without cross-shard routing
    pub binding_tables: Vec<Vec<String>>,
}

/// Rule for one sharded logical table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableRuleConfig {
    pub sharding_columns: Vec<String>,
    pub key_generator: Option<KeyGeneratorConfig>,
}

/// Generated key column of a table and how its values are produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyGeneratorConfig {
    pub column: String,
    #[serde(default)]
    pub strategy: KeyGenerateStrategy,
    /// Worker id mixed into snowflake keys, must be below 1024
    #[serde(default)]
    pub worker_id: u16,
    /// First value handed out by the sequence strategy
    #[serde(default = "default_sequence_start")]
    pub start: i64,
}

fn default_sequence_start() -> i64 {
    1
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyGenerateStrategy {
    #[default]
    Snowflake,
    Uuid,
    Sequence,
}

impl ShardingRuleConfig {
    /// Convenience builder used by tests and embedders
    pub fn with_table(
        mut self,
        table: &str,
        sharding_columns: &[&str],
        key_generator: Option<KeyGeneratorConfig>,
    ) -> Self {
        self.tables.insert(
            table.to_string(),
            TableRuleConfig {
                sharding_columns: sharding_columns.iter().map(|c| c.to_string()).collect(),
                key_generator,
            },
        );
        self
    }
}

impl KeyGeneratorConfig {
    pub fn new(column: &str, strategy: KeyGenerateStrategy) -> Self {
        KeyGeneratorConfig {
            column: column.to_string(),
            strategy,
            worker_id: 0,
            start: default_sequence_start(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_with_defaults() {
        let config: ShardingRuleConfig = serde_json::from_str(
            r#"{
                "tables": {
                    "t_order": {
                        "sharding_columns": ["user_id"],
                        "key_generator": {"column": "order_id"}
                    },
                    "t_order_item": {}
                },
                "binding_tables": [["t_order", "t_order_item"]]
            }"#,
        )
        .unwrap();

        let order = &config.tables["t_order"];
        assert_eq!(order.sharding_columns, vec!["user_id"]);
        let key = order.key_generator.as_ref().unwrap();
        assert_eq!(key.strategy, KeyGenerateStrategy::Snowflake);
        assert_eq!(key.start, 1);
        assert!(config.tables["t_order_item"].sharding_columns.is_empty());
        assert!(config.broadcast_tables.is_empty());
    }

    #[test]
    fn test_strategy_names() {
        let key: KeyGeneratorConfig =
            serde_json::from_str(r#"{"column": "id", "strategy": "sequence", "start": 100}"#)
                .unwrap();
        assert_eq!(key.strategy, KeyGenerateStrategy::Sequence);
        assert_eq!(key.start, 100);
    }
}

//! Engine configuration

use serde::{Deserialize, Serialize};
use shardbind_binder::DEFAULT_MAX_SUBQUERY_DEPTH;
use shardbind_catalog::Table;
use shardbind_common::{Error, Result};
use shardbind_parser::DatabaseType;
use shardbind_rule::ShardingRuleConfig;
use std::path::Path;

/// Everything a `ShardingBinder` is built from. Missing fields fall back
/// to their defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub database_type: DatabaseType,
    /// Database unqualified table names belong to
    pub default_database: Option<String>,
    pub rule: ShardingRuleConfig,
    pub max_subquery_depth: usize,
    /// Table metadata loaded into the default database
    pub tables: Vec<Table>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            database_type: DatabaseType::default(),
            default_database: None,
            rule: ShardingRuleConfig::default(),
            max_subquery_depth: DEFAULT_MAX_SUBQUERY_DEPTH,
            tables: Vec::new(),
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))
    }

    /// Read a JSON configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&json)
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.default_database = Some(database.into());
        self
    }

    pub fn with_database_type(mut self, database_type: DatabaseType) -> Self {
        self.database_type = database_type;
        self
    }

    pub fn with_rule(mut self, rule: ShardingRuleConfig) -> Self {
        self.rule = rule;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::from_json_str("{}").unwrap();
        assert_eq!(config.database_type, DatabaseType::MySql);
        assert_eq!(config.max_subquery_depth, 32);
        assert!(config.default_database.is_none());
        assert!(config.rule.tables.is_empty());
    }

    #[test]
    fn test_full_config() {
        let config = EngineConfig::from_json_str(
            r#"{
                "database_type": "postgresql",
                "default_database": "sharding_db",
                "max_subquery_depth": 4,
                "rule": {
                    "tables": {
                        "t_order": {
                            "sharding_columns": ["user_id"],
                            "key_generator": {"column": "order_id", "strategy": "snowflake", "worker_id": 7}
                        }
                    },
                    "broadcast_tables": ["t_config"]
                },
                "tables": [
                    {"name": "t_order", "columns": [{"name": "order_id"}, {"name": "user_id"}]}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(config.database_type, DatabaseType::PostgreSql);
        assert_eq!(config.default_database.as_deref(), Some("sharding_db"));
        assert_eq!(config.max_subquery_depth, 4);
        let key = config.rule.tables["t_order"].key_generator.as_ref().unwrap();
        assert_eq!(key.worker_id, 7);
        assert_eq!(config.tables[0].columns.len(), 2);
        assert!(config.tables[0].columns[0].visible);
    }

    #[test]
    fn test_bad_config() {
        assert!(matches!(
            EngineConfig::from_json_str(r#"{"database_type": "oracle"}"#),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            EngineConfig::load("/nonexistent/shardbind.json"),
            Err(Error::Config(_))
        ));
    }
}

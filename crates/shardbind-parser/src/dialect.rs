//! Database types and the parser dialect each one uses

use serde::{Deserialize, Serialize};
use shardbind_common::{Error, Result};
use sqlparser::dialect::{Dialect, GenericDialect, MySqlDialect, PostgreSqlDialect};
use std::fmt;
use std::str::FromStr;

/// The database a logical schema fronts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    #[default]
    MySql,
    PostgreSql,
    Generic,
}

impl DatabaseType {
    pub fn dialect(&self) -> Box<dyn Dialect> {
        match self {
            DatabaseType::MySql => Box::new(MySqlDialect {}),
            DatabaseType::PostgreSql => Box::new(PostgreSqlDialect {}),
            DatabaseType::Generic => Box::new(GenericDialect {}),
        }
    }
}

impl fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseType::MySql => write!(f, "mysql"),
            DatabaseType::PostgreSql => write!(f, "postgresql"),
            DatabaseType::Generic => write!(f, "generic"),
        }
    }
}

impl FromStr for DatabaseType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mysql" => Ok(DatabaseType::MySql),
            "postgresql" | "postgres" | "pg" => Ok(DatabaseType::PostgreSql),
            "generic" => Ok(DatabaseType::Generic),
            other => Err(Error::Config(format!("unknown database type: {}", other))),
        }
    }
}

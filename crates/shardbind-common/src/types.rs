//! Column types tracked by the catalog
//!
//! The binder never evaluates expressions, so a column type is only
//! recorded and printed.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The logical type of a column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogicalType {
    Boolean,
    /// 16-bit signed integer
    SmallInt,
    /// 32-bit signed integer
    Integer,
    /// 64-bit signed integer
    BigInt,
    Double,
    /// Fixed-point decimal with specified width and scale
    Decimal { width: u8, scale: u8 },
    Varchar,
    Blob,
    Date,
    Time,
    Timestamp,
    Uuid,
    Json,
    /// Anything the catalog does not model explicitly
    Unknown,
}

impl fmt::Display for LogicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicalType::Boolean => write!(f, "BOOLEAN"),
            LogicalType::SmallInt => write!(f, "SMALLINT"),
            LogicalType::Integer => write!(f, "INTEGER"),
            LogicalType::BigInt => write!(f, "BIGINT"),
            LogicalType::Double => write!(f, "DOUBLE"),
            LogicalType::Decimal { width, scale } => write!(f, "DECIMAL({},{})", width, scale),
            LogicalType::Varchar => write!(f, "VARCHAR"),
            LogicalType::Blob => write!(f, "BLOB"),
            LogicalType::Date => write!(f, "DATE"),
            LogicalType::Time => write!(f, "TIME"),
            LogicalType::Timestamp => write!(f, "TIMESTAMP"),
            LogicalType::Uuid => write!(f, "UUID"),
            LogicalType::Json => write!(f, "JSON"),
            LogicalType::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

impl Default for LogicalType {
    fn default() -> Self {
        LogicalType::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serde_names() {
        let ty: LogicalType = serde_json::from_str("\"bigint\"").unwrap();
        assert_eq!(ty, LogicalType::BigInt);
        assert_eq!(LogicalType::default(), LogicalType::Unknown);
    }

    #[test]
    fn test_display() {
        assert_eq!(LogicalType::BigInt.to_string(), "BIGINT");
        assert_eq!(
            LogicalType::Decimal { width: 18, scale: 3 }.to_string(),
            "DECIMAL(18,3)"
        );
    }
}

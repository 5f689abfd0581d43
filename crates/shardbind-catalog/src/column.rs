//! Column definition

use serde::{Deserialize, Serialize};
use shardbind_common::LogicalType;

pub type ColumnId = u32;

/// A column in a table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Column position within the table
    #[serde(default)]
    pub id: ColumnId,
    /// Column name
    pub name: String,
    /// Column type
    #[serde(default)]
    pub logical_type: LogicalType,
    /// Whether the column allows NULL values
    #[serde(default = "default_true")]
    pub nullable: bool,
    /// Part of the primary key
    #[serde(default)]
    pub primary_key: bool,
    /// Filled by the database (AUTO_INCREMENT, SERIAL, IDENTITY)
    #[serde(default)]
    pub generated: bool,
    /// Invisible columns are skipped when an INSERT omits its column list
    #[serde(default = "default_true")]
    pub visible: bool,
}

fn default_true() -> bool {
    true
}

impl Column {
    pub fn new(id: ColumnId, name: impl Into<String>, logical_type: LogicalType) -> Self {
        Column {
            id,
            name: name.into(),
            logical_type,
            nullable: true,
            primary_key: false,
            generated: false,
            visible: true,
        }
    }

    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    pub fn with_primary_key(mut self, primary_key: bool) -> Self {
        self.primary_key = primary_key;
        self
    }

    pub fn with_generated(mut self, generated: bool) -> Self {
        self.generated = generated;
        self
    }

    pub fn with_visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }
}

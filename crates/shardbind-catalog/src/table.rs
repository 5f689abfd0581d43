//! Table metadata

use super::{CatalogId, Column};
use serde::{Deserialize, Serialize};

pub type TableId = CatalogId;

/// A table in the catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    /// Unique identifier
    #[serde(default)]
    pub id: TableId,
    /// Table name
    pub name: String,
    /// Columns in declaration order
    pub columns: Vec<Column>,
}

impl Table {
    pub fn new(id: TableId, name: String, columns: Vec<Column>) -> Self {
        Table { id, name, columns }
    }

    /// Get a column by name (case-insensitive)
    pub fn get_column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn contains_column(&self, name: &str) -> bool {
        self.get_column(name).is_some()
    }

    /// Get the number of columns
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Get column names in declaration order
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Names of the columns an INSERT without a column list fills, in declaration order
    pub fn visible_column_names(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| c.visible)
            .map(|c| c.name.clone())
            .collect()
    }
}

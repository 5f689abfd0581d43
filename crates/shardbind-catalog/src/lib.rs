//! shardbind catalog - table metadata consulted while binding
//!
//! The catalog is a pre-loaded, in-memory snapshot of the logical databases
//! a statement may reference. The binder reads it to:
//! - expand the column list of an INSERT that omits one
//! - attribute unqualified columns to a table in multi-table statements
//! - check whether a schema exists

use hashbrown::HashMap;
use parking_lot::RwLock;
use shardbind_common::{Error, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

mod column;
mod schema;
mod table;

pub use column::{Column, ColumnId};
pub use schema::{Schema, SchemaId};
pub use table::{Table, TableId};

/// Unique identifier for catalog entries
pub type CatalogId = u64;

/// The catalog holds every schema known to the binder
pub struct Catalog {
    /// All schemas in the catalog
    schemas: RwLock<HashMap<String, Arc<Schema>>>,
    /// Next available ID for new objects
    next_id: AtomicU64,
}

impl Catalog {
    /// Create a new empty catalog
    pub fn new() -> Self {
        Catalog {
            schemas: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Get the next unique ID
    fn next_id(&self) -> CatalogId {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Get a schema by name (case-insensitive)
    pub fn get_schema(&self, name: &str) -> Option<Arc<Schema>> {
        let name_lower = name.to_lowercase();
        self.schemas.read().get(&name_lower).cloned()
    }

    /// Create a new schema (name is normalized to lowercase)
    pub fn create_schema(&self, name: &str) -> Result<Arc<Schema>> {
        let mut schemas = self.schemas.write();
        let name_lower = name.to_lowercase();
        if schemas.contains_key(&name_lower) {
            return Err(Error::Internal(format!("Schema already exists: {}", name)));
        }

        let schema = Arc::new(Schema::new(self.next_id(), name_lower.clone()));
        schemas.insert(name_lower, schema.clone());
        Ok(schema)
    }

    /// Get a schema, creating it if it does not exist yet
    pub fn get_or_create_schema(&self, name: &str) -> Arc<Schema> {
        let name_lower = name.to_lowercase();
        let mut schemas = self.schemas.write();
        if let Some(schema) = schemas.get(&name_lower) {
            return schema.clone();
        }
        let schema = Arc::new(Schema::new(self.next_id(), name_lower.clone()));
        schemas.insert(name_lower, schema.clone());
        schema
    }

    /// Create a table in the given schema, assigning table and column ids
    pub fn create_table(
        &self,
        schema_name: &str,
        table_name: &str,
        columns: Vec<Column>,
    ) -> Result<TableId> {
        let schema = self
            .get_schema(schema_name)
            .ok_or_else(|| Error::UnknownDatabase(schema_name.to_string()))?;

        let table_id = self.next_id();
        let columns: Vec<Column> = columns
            .into_iter()
            .enumerate()
            .map(|(idx, column)| Column {
                id: idx as ColumnId,
                ..column
            })
            .collect();

        let table = Table::new(table_id, table_name.to_string(), columns);
        schema.add_table(table)?;

        Ok(table_id)
    }

    /// Load a batch of table definitions into a schema, replacing existing ones
    pub fn load_tables(&self, schema_name: &str, tables: Vec<Table>) {
        let schema = self.get_or_create_schema(schema_name);
        for table in tables {
            let id = self.next_id();
            schema.put_table(Table { id, ..table });
        }
    }

    /// Get a table by schema and table name
    pub fn get_table(&self, schema_name: &str, table_name: &str) -> Option<Arc<Table>> {
        let schema = self.get_schema(schema_name)?;
        schema.get_table(table_name)
    }

    /// List all schema names, sorted
    pub fn list_schemas(&self) -> Vec<String> {
        let mut names: Vec<String> = self.schemas.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shardbind_common::LogicalType;

    #[test]
    fn test_create_schema() {
        let catalog = Catalog::new();
        assert!(catalog.create_schema("Sharding_DB").is_ok());
        assert!(catalog.get_schema("sharding_db").is_some());
        assert!(catalog.create_schema("sharding_db").is_err());
    }

    #[test]
    fn test_create_table() {
        let catalog = Catalog::new();
        catalog.create_schema("db").unwrap();
        let columns = vec![
            Column::new(7, "id", LogicalType::Integer),
            Column::new(7, "name", LogicalType::Varchar),
        ];
        catalog.create_table("db", "Users", columns).unwrap();
        let table = catalog.get_table("db", "users").unwrap();
        assert_eq!(table.column_names(), vec!["id", "name"]);
        assert_eq!(table.columns[1].id, 1);
    }

    #[test]
    fn test_create_table_in_unknown_schema() {
        let catalog = Catalog::new();
        let result = catalog.create_table("missing", "t", vec![]);
        assert!(matches!(result, Err(Error::UnknownDatabase(_))));
    }

    #[test]
    fn test_load_tables_replaces() {
        let catalog = Catalog::new();
        let v1 = Table::new(0, "t".to_string(), vec![Column::new(0, "a", LogicalType::Integer)]);
        let v2 = Table::new(
            0,
            "t".to_string(),
            vec![
                Column::new(0, "a", LogicalType::Integer),
                Column::new(1, "b", LogicalType::Integer),
            ],
        );
        catalog.load_tables("db", vec![v1]);
        catalog.load_tables("db", vec![v2]);
        assert_eq!(catalog.get_table("db", "t").unwrap().column_count(), 2);
        assert_eq!(catalog.list_schemas(), vec!["db"]);
    }
}

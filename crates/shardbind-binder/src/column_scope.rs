//! Column attribution
//!
//! A `ColumnScope` is the set of tables one query level can see: the tables
//! of its own FROM clause, plus the tables of every enclosing query for
//! correlated references.

use crate::tables_context::SimpleTable;

/// A table visible at one query level
#[derive(Debug, Clone)]
pub(crate) struct ScopeTable {
    pub table: SimpleTable,
    /// Derived tables and CTE references have no physical name
    pub derived: bool,
    /// Column names from metadata or from the derived query's labels;
    /// `None` when they are unknown
    pub columns: Option<Vec<String>>,
}

impl ScopeTable {
    pub fn physical(table: SimpleTable, columns: Option<Vec<String>>) -> Self {
        ScopeTable {
            table,
            derived: false,
            columns,
        }
    }

    pub fn derived(alias: impl Into<String>, columns: Option<Vec<String>>) -> Self {
        let alias = alias.into();
        ScopeTable {
            table: SimpleTable::new(alias.clone()).with_alias(alias),
            derived: true,
            columns,
        }
    }

    /// Physical table name, `None` for derived tables
    pub fn physical_name(&self) -> Option<&str> {
        (!self.derived).then_some(self.table.name.as_str())
    }

    fn has_column(&self, column: &str) -> Option<bool> {
        self.columns
            .as_ref()
            .map(|columns| columns.iter().any(|c| c.eq_ignore_ascii_case(column)))
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct ColumnScope {
    tables: Vec<ScopeTable>,
    inherited: Vec<ScopeTable>,
}

impl ColumnScope {
    pub fn new(tables: Vec<ScopeTable>) -> Self {
        ColumnScope {
            tables,
            inherited: Vec::new(),
        }
    }

    /// Scope of a nested query; everything visible here becomes inherited
    pub fn child(&self, tables: Vec<ScopeTable>) -> Self {
        let mut inherited = self.tables.clone();
        inherited.extend(self.inherited.iter().cloned());
        ColumnScope { tables, inherited }
    }

    pub fn tables(&self) -> &[ScopeTable] {
        &self.tables
    }

    pub fn find_owner(&self, owner: &str) -> Option<&ScopeTable> {
        find_owner_in(&self.tables, owner).or_else(|| find_owner_in(&self.inherited, owner))
    }

    /// The table a column reference belongs to.
    ///
    /// A qualified column follows its owner. An unqualified column belongs
    /// to the sole table of a single-table level; otherwise it needs metadata
    /// for every table of the level and must appear in exactly one of them.
    /// A column found in no table of the level is looked up in the
    /// enclosing levels the same way.
    pub fn resolve(&self, owner: Option<&str>, column: &str) -> Option<&ScopeTable> {
        match owner {
            Some(owner) => self.find_owner(owner),
            None => match unique_owner(&self.tables, column) {
                Attribution::Found(table) => Some(table),
                Attribution::Ambiguous => None,
                Attribution::Absent => match unique_owner(&self.inherited, column) {
                    Attribution::Found(table) => Some(table),
                    _ => None,
                },
            },
        }
    }
}

fn find_owner_in<'a>(tables: &'a [ScopeTable], owner: &str) -> Option<&'a ScopeTable> {
    tables
        .iter()
        .find(|t| {
            t.table
                .alias
                .as_deref()
                .is_some_and(|a| a.eq_ignore_ascii_case(owner))
        })
        .or_else(|| {
            tables
                .iter()
                .find(|t| t.table.name.eq_ignore_ascii_case(owner))
        })
}

enum Attribution<'a> {
    Found(&'a ScopeTable),
    Ambiguous,
    Absent,
}

fn unique_owner<'a>(tables: &'a [ScopeTable], column: &str) -> Attribution<'a> {
    match tables {
        [] => Attribution::Absent,
        [only] => Attribution::Found(only),
        _ => {
            let mut found = None;
            for table in tables {
                match table.has_column(column) {
                    None => return Attribution::Ambiguous,
                    Some(true) if found.is_some() => return Attribution::Ambiguous,
                    Some(true) => found = Some(table),
                    Some(false) => {}
                }
            }
            found.map_or(Attribution::Absent, Attribution::Found)
        }
    }
}

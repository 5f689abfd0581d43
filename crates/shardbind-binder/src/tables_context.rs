//! Table resolution
//!
//! Collects every simple table a statement touches, wherever it appears:
//! FROM and JOIN clauses, derived tables, subqueries in predicates and
//! projections, CTE bodies. CTE names are not tables and are skipped.

use shardbind_parser::SourceText;
use sqlparser::ast as sql;
use sqlparser::ast::{Visit, Visitor};
use std::ops::ControlFlow;

/// A table referenced by name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleTable {
    pub name: String,
    /// Schema qualifier as written (`db` in `db.t_order`)
    pub schema: Option<String>,
    pub alias: Option<String>,
    /// Byte offset where the (possibly qualified) name starts
    pub start: Option<usize>,
    /// Byte offset just past the name
    pub stop: Option<usize>,
}

impl SimpleTable {
    pub fn new(name: impl Into<String>) -> Self {
        SimpleTable {
            name: name.into(),
            schema: None,
            alias: None,
            start: None,
            stop: None,
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// The name columns of this table are qualified with
    pub fn alias_or_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    /// Whether a column owner refers to this table, by alias or by name
    pub fn matches_owner(&self, owner: &str) -> bool {
        match &self.alias {
            Some(alias) if alias.eq_ignore_ascii_case(owner) => true,
            _ => self.name.eq_ignore_ascii_case(owner),
        }
    }

    fn same_reference(&self, other: &SimpleTable) -> bool {
        self.name.eq_ignore_ascii_case(&other.name)
            && eq_ignore_case_opt(&self.schema, &other.schema)
            && eq_ignore_case_opt(&self.alias, &other.alias)
    }
}

fn eq_ignore_case_opt(a: &Option<String>, b: &Option<String>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
        (None, None) => true,
        _ => false,
    }
}

/// Deduplicated tables of a statement, in first-seen order
///
/// Two references are the same when name, schema and alias all match, so a
/// self-join (`t AS a JOIN t AS b`) keeps both occurrences.
#[derive(Debug, Clone, Default)]
pub struct TablesContext {
    tables: Vec<SimpleTable>,
}

impl TablesContext {
    pub fn new(tables: impl IntoIterator<Item = SimpleTable>) -> Self {
        let mut result: Vec<SimpleTable> = Vec::new();
        for table in tables {
            if !result.iter().any(|t| t.same_reference(&table)) {
                result.push(table);
            }
        }
        TablesContext { tables: result }
    }

    pub fn tables(&self) -> &[SimpleTable] {
        &self.tables
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Distinct table names, in first-seen order
    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for table in &self.tables {
            if !names.iter().any(|n| n.eq_ignore_ascii_case(&table.name)) {
                names.push(table.name.clone());
            }
        }
        names
    }

    /// Distinct schema qualifiers written in the statement
    pub fn schema_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for schema in self.tables.iter().filter_map(|t| t.schema.as_ref()) {
            if !names.iter().any(|n| n.eq_ignore_ascii_case(schema)) {
                names.push(schema.clone());
            }
        }
        names
    }

    /// The table a column owner refers to; aliases win over table names
    pub fn find_by_owner(&self, owner: &str) -> Option<&SimpleTable> {
        self.tables
            .iter()
            .find(|t| t.alias.as_deref().is_some_and(|a| a.eq_ignore_ascii_case(owner)))
            .or_else(|| {
                self.tables
                    .iter()
                    .find(|t| t.name.eq_ignore_ascii_case(owner))
            })
    }

    /// Whether any table carries this alias
    pub fn is_alias(&self, name: &str) -> bool {
        self.tables
            .iter()
            .any(|t| t.alias.as_deref().is_some_and(|a| a.eq_ignore_ascii_case(name)))
    }

    pub(crate) fn merge(&self, other: &TablesContext) -> TablesContext {
        TablesContext::new(self.tables.iter().chain(other.tables.iter()).cloned())
    }
}

/// Split an object name into (schema, name)
pub(crate) fn object_name_parts(name: &sql::ObjectName) -> (Option<String>, String) {
    let parts: Vec<&str> = name.0.iter().map(|i| i.value.as_str()).collect();
    match parts.as_slice() {
        [] => (None, String::new()),
        [table] => (None, table.to_string()),
        [.., schema, table] => (Some(schema.to_string()), table.to_string()),
    }
}

pub(crate) fn simple_table(
    name: &sql::ObjectName,
    alias: Option<&sql::TableAlias>,
    source: &SourceText<'_>,
) -> SimpleTable {
    let (schema, table_name) = object_name_parts(name);
    let start = name.0.first().and_then(|i| source.offset(i.span.start));
    let stop = name.0.last().and_then(|i| source.offset(i.span.end));
    SimpleTable {
        name: table_name,
        schema,
        alias: alias.map(|a| a.name.value.clone()),
        start,
        stop,
    }
}

/// Walks any AST node and records every simple table it references
struct TableExtractor<'a> {
    source: &'a SourceText<'a>,
    cte_names: Vec<String>,
    tables: Vec<SimpleTable>,
}

impl Visitor for TableExtractor<'_> {
    type Break = ();

    fn pre_visit_query(&mut self, query: &sql::Query) -> ControlFlow<Self::Break> {
        if let Some(with) = &query.with {
            for cte in &with.cte_tables {
                self.cte_names.push(cte.alias.name.value.to_lowercase());
            }
        }
        ControlFlow::Continue(())
    }

    fn pre_visit_table_factor(&mut self, factor: &sql::TableFactor) -> ControlFlow<Self::Break> {
        if let sql::TableFactor::Table {
            name,
            alias,
            args: None,
            ..
        } = factor
        {
            let table = simple_table(name, alias.as_ref(), self.source);
            let is_cte = table.schema.is_none() && self.cte_names.contains(&table.name.to_lowercase());
            if !is_cte {
                self.tables.push(table);
            }
        }
        ControlFlow::Continue(())
    }
}

/// Every simple table referenced anywhere under `node`, in text order.
/// `ctes` names common table expressions already in scope.
pub(crate) fn extract_tables<V: Visit>(
    node: &V,
    source: &SourceText<'_>,
    ctes: &[String],
) -> Vec<SimpleTable> {
    let mut extractor = TableExtractor {
        source,
        cte_names: ctes.iter().map(|c| c.to_lowercase()).collect(),
        tables: Vec::new(),
    };
    let _ = node.visit(&mut extractor);
    extractor.tables
}

/// Merge the named targets of a DELETE with its table references, dropping
/// targets that are really aliases.
///
/// `DELETE o FROM t_order o` names `o` as a target; it is the aliased
/// `t_order`, not a table called `o`. References from FROM and USING are
/// always kept.
pub(crate) fn filter_delete_aliases(
    targets: Vec<SimpleTable>,
    references: Vec<SimpleTable>,
) -> Vec<SimpleTable> {
    let is_alias = |target: &SimpleTable| {
        references.iter().any(|reference| {
            reference
                .alias
                .as_deref()
                .is_some_and(|alias| alias.eq_ignore_ascii_case(&target.name))
        })
    };
    let mut tables: Vec<SimpleTable> = targets.into_iter().filter(|t| !is_alias(t)).collect();
    tables.extend(references);
    tables
}

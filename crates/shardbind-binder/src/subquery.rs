//! Subquery discovery

use shardbind_parser::SourceText;
use sqlparser::ast as sql;
use sqlparser::ast::{Visit, Visitor};
use sqlparser::tokenizer::Span;
use std::cell::Cell;
use std::fmt;
use std::ops::ControlFlow;

/// Where a nested query sits in its parent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubqueryType {
    /// `SELECT (SELECT ...) FROM ...`
    Projection,
    /// `FROM (SELECT ...) AS d`
    Table,
    /// WHERE, HAVING or a join condition
    Predicate,
    /// Source rows of `INSERT ... SELECT`
    InsertSelect,
    /// A branch of UNION / INTERSECT / EXCEPT
    Combine,
    /// A common table expression
    With,
}

impl fmt::Display for SubqueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SubqueryType::Projection => "projection",
            SubqueryType::Table => "table",
            SubqueryType::Predicate => "predicate",
            SubqueryType::InsertSelect => "insert-select",
            SubqueryType::Combine => "combine",
            SubqueryType::With => "with",
        };
        write!(f, "{}", name)
    }
}

/// Queries directly nested in `node`; queries nested inside those are left
/// to their own level
pub(crate) fn collect_subqueries<V: Visit>(node: &V) -> Vec<sql::Query> {
    let mut collector = SubqueryCollector {
        depth: 0,
        queries: Vec::new(),
    };
    let _ = node.visit(&mut collector);
    collector.queries
}

struct SubqueryCollector {
    depth: usize,
    queries: Vec<sql::Query>,
}

impl Visitor for SubqueryCollector {
    type Break = ();

    fn pre_visit_query(&mut self, query: &sql::Query) -> ControlFlow<Self::Break> {
        if self.depth == 0 {
            self.queries.push(query.clone());
        }
        self.depth += 1;
        ControlFlow::Continue(())
    }

    fn post_visit_query(&mut self, _query: &sql::Query) -> ControlFlow<Self::Break> {
        self.depth -= 1;
        ControlFlow::Continue(())
    }
}

/// Hands out the keys nested contexts are stored under: the byte offset
/// the nested query starts at. Queries without a usable location get keys
/// past the end of the text, in discovery order.
pub(crate) struct SubqueryKeys {
    text_len: usize,
    next_fallback: Cell<usize>,
}

impl SubqueryKeys {
    pub fn new(source: &SourceText<'_>) -> Self {
        SubqueryKeys {
            text_len: source.sql().len(),
            next_fallback: Cell::new(0),
        }
    }

    pub fn key(&self, span: Span, source: &SourceText<'_>) -> usize {
        match source.offset(span.start) {
            Some(offset) => offset,
            None => {
                let n = self.next_fallback.get();
                self.next_fallback.set(n + 1);
                self.text_len + n
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shardbind_parser::{parse_statement, DatabaseType};
    use sqlparser::ast::Spanned;

    #[test]
    fn test_only_direct_subqueries() {
        let sql = "SELECT * FROM t WHERE a IN (SELECT a FROM u WHERE b = (SELECT 1)) AND EXISTS (SELECT 1 FROM v)";
        let parsed = parse_statement(sql, DatabaseType::MySql).unwrap();
        let selection = match parsed.statement {
            sql::Statement::Query(query) => match *query.body {
                sql::SetExpr::Select(select) => select.selection.unwrap(),
                _ => panic!("not a select"),
            },
            _ => panic!("not a query"),
        };
        let queries = collect_subqueries(&selection);
        assert_eq!(queries.len(), 2);
        assert_eq!(queries[1].to_string(), "SELECT 1 FROM v");

        let source = SourceText::new(sql);
        let keys = SubqueryKeys::new(&source);
        assert_eq!(keys.key(queries[0].span(), &source), 28);
        assert_eq!(keys.key(Span::empty(), &source), sql.len());
        assert_eq!(keys.key(Span::empty(), &source), sql.len() + 1);
    }
}

//! Rewrite markers
//!
//! Positions in the statement text a rewriter has to touch: logical table
//! names that become physical ones, and table names used as column owners.

use crate::tables_context::{SimpleTable, TablesContext};
use shardbind_parser::SourceText;
use shardbind_rule::ShardingRule;
use sqlparser::ast as sql;
use sqlparser::ast::{Visit, Visitor};
use std::fmt;
use std::ops::ControlFlow;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlTokenKind {
    /// A sharded table reference
    Table {
        name: String,
        schema: Option<String>,
    },
    /// A sharded table name qualifying a column (`t_order.user_id`)
    Owner { owner: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlToken {
    pub kind: SqlTokenKind,
    /// Byte offset into the statement text
    pub start: usize,
    pub length: usize,
    /// Original text covered by the token
    pub text: String,
}

impl SqlToken {
    pub fn stop(&self) -> usize {
        self.start + self.length
    }
}

impl fmt::Display for SqlToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            SqlTokenKind::Table { .. } => "table",
            SqlTokenKind::Owner { .. } => "owner",
        };
        write!(f, "{}[{}..{}] {}", kind, self.start, self.stop(), self.text)
    }
}

/// Table tokens for every sharded table reference
pub(crate) fn table_tokens(
    tables: &[SimpleTable],
    rule: &dyn ShardingRule,
    source: &SourceText<'_>,
) -> Vec<SqlToken> {
    tables
        .iter()
        .filter(|t| rule.is_sharding_table(&t.name))
        .filter_map(|t| {
            let (start, stop) = (t.start?, t.stop?);
            let text = source.sql().get(start..stop)?;
            Some(SqlToken {
                kind: SqlTokenKind::Table {
                    name: t.name.clone(),
                    schema: t.schema.clone(),
                },
                start,
                length: stop - start,
                text: text.to_string(),
            })
        })
        .collect()
}

/// Owner tokens for sharded table names qualifying columns under `node`.
///
/// An owner that is also an alias names the alias, not the table, and is
/// left alone.
pub(crate) fn owner_tokens<V: Visit>(
    node: &V,
    tables: &TablesContext,
    rule: &dyn ShardingRule,
    source: &SourceText<'_>,
) -> Vec<SqlToken> {
    let mut collector = OwnerCollector {
        tables,
        rule,
        source,
        tokens: Vec::new(),
    };
    let _ = node.visit(&mut collector);
    collector.tokens
}

struct OwnerCollector<'a> {
    tables: &'a TablesContext,
    rule: &'a dyn ShardingRule,
    source: &'a SourceText<'a>,
    tokens: Vec<SqlToken>,
}

impl Visitor for OwnerCollector<'_> {
    type Break = ();

    fn pre_visit_expr(&mut self, expr: &sql::Expr) -> ControlFlow<Self::Break> {
        if let sql::Expr::CompoundIdentifier(idents) = expr {
            if idents.len() >= 2 {
                let owner = &idents[idents.len() - 2];
                if self.rule.is_sharding_table(&owner.value) && !self.tables.is_alias(&owner.value) {
                    if let Some(range) = self.source.range(owner.span) {
                        self.tokens.push(SqlToken {
                            kind: SqlTokenKind::Owner {
                                owner: owner.value.clone(),
                            },
                            start: range.start,
                            length: range.len(),
                            text: self.source.sql()[range].to_string(),
                        });
                    }
                }
            }
        }
        ControlFlow::Continue(())
    }
}

/// Sort by position, dropping tokens that start where another one does
pub(crate) fn finish_tokens(mut tokens: Vec<SqlToken>) -> Vec<SqlToken> {
    tokens.sort_by_key(|t| t.start);
    tokens.dedup_by_key(|t| t.start);
    tokens
}

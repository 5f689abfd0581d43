//! Sharding condition extraction
//!
//! Predicates are reduced to an OR of AND groups over sharding columns.
//! Each leaf is classified on its own:
//! - a sharding column compared to a literal or parameter with `=`, `IN` or
//!   `BETWEEN` becomes a `Condition`
//! - any other comparison of a sharding column marks its group as needing
//!   sharding without producing a condition
//! - `column = column` is a join condition
//! - a sharding column buried inside some other expression makes the whole
//!   predicate unroutable
//!
//! A group that needs sharding but yields no condition, or any unroutable
//! leaf, clears the result: an empty `OrCondition` means every shard.

use crate::column_scope::ColumnScope;
use crate::expression_binder::{bind_column_ref, bind_simple, column_parts};
use crate::predicate::{conjunction_dnf, leaves, MAX_AND_GROUPS};
use crate::{BoundExpression, ColumnRef};
use shardbind_rule::ShardingRule;
use sqlparser::ast as sql;
use sqlparser::ast::{Visit, Visitor};
use std::fmt;
use std::ops::ControlFlow;
use tracing::{debug, trace};

/// A routing constraint on one sharding column
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Equal {
        column: ColumnRef,
        value: BoundExpression,
    },
    In {
        column: ColumnRef,
        values: Vec<BoundExpression>,
    },
    Between {
        column: ColumnRef,
        low: BoundExpression,
        high: BoundExpression,
    },
}

impl Condition {
    pub fn column(&self) -> &ColumnRef {
        match self {
            Condition::Equal { column, .. }
            | Condition::In { column, .. }
            | Condition::Between { column, .. } => column,
        }
    }

    /// Every value the condition compares against
    pub fn values(&self) -> Vec<&BoundExpression> {
        match self {
            Condition::Equal { value, .. } => vec![value],
            Condition::In { values, .. } => values.iter().collect(),
            Condition::Between { low, high, .. } => vec![low, high],
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Equal { column, value } => write!(f, "Equal({}, {})", column, value),
            Condition::In { column, values } => {
                let values: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                write!(f, "In({}, [{}])", column, values.join(", "))
            }
            Condition::Between { column, low, high } => {
                write!(f, "Between({}, {}, {})", column, low, high)
            }
        }
    }
}

/// Conditions that must hold together
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AndCondition {
    pub conditions: Vec<Condition>,
}

impl AndCondition {
    pub fn new(conditions: Vec<Condition>) -> Self {
        AndCondition { conditions }
    }
}

impl fmt::Display for AndCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let conditions: Vec<String> = self.conditions.iter().map(|c| c.to_string()).collect();
        write!(f, "[{}]", conditions.join(", "))
    }
}

/// Alternative AND groups; empty means no usable sharding condition
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrCondition {
    pub and_conditions: Vec<AndCondition>,
}

impl OrCondition {
    pub fn new(and_conditions: Vec<AndCondition>) -> Self {
        OrCondition { and_conditions }
    }

    pub fn is_empty(&self) -> bool {
        self.and_conditions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.and_conditions.len()
    }

    /// Conditions of two statements whose rows are combined.
    ///
    /// Either side being unconstrained leaves the union unconstrained.
    pub fn union(&self, other: &OrCondition) -> OrCondition {
        if self.is_empty() || other.is_empty() {
            return OrCondition::default();
        }
        let mut and_conditions = self.and_conditions.clone();
        and_conditions.extend(other.and_conditions.iter().cloned());
        OrCondition { and_conditions }
    }
}

impl fmt::Display for OrCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let groups: Vec<String> = self.and_conditions.iter().map(|g| g.to_string()).collect();
        write!(f, "[{}]", groups.join(", "))
    }
}

/// An equality between two columns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinCondition {
    pub left: ColumnRef,
    pub right: ColumnRef,
}

impl fmt::Display for JoinCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.left, self.right)
    }
}

/// Result of extracting the predicates of one query level
#[derive(Debug, Clone, Default)]
pub(crate) struct ExtractedConditions {
    pub sharding_conditions: OrCondition,
    pub join_conditions: Vec<JoinCondition>,
}

enum Leaf {
    Ignored,
    Condition(Condition),
    NeedsSharding,
    Join {
        condition: JoinCondition,
        sharding: bool,
    },
    Unroutable,
}

pub(crate) struct ConditionExtractor<'a> {
    scope: &'a ColumnScope,
    rule: &'a dyn ShardingRule,
}

impl<'a> ConditionExtractor<'a> {
    pub fn new(scope: &'a ColumnScope, rule: &'a dyn ShardingRule) -> Self {
        ConditionExtractor { scope, rule }
    }

    /// Extract from the conjunction of `predicates`
    pub fn extract(&self, predicates: &[&sql::Expr]) -> ExtractedConditions {
        let mut join_conditions: Vec<JoinCondition> = Vec::new();
        let mut groups = Vec::new();
        let mut cleared = false;

        let Some(dnf) = conjunction_dnf(predicates) else {
            debug!(
                limit = MAX_AND_GROUPS,
                "predicate too wide to normalize, routing to every shard"
            );
            return self.extract_joins_only(predicates);
        };
        for group in dnf {
            let mut conditions = Vec::new();
            let mut needs_sharding = false;
            let mut unroutable = false;
            for leaf in group {
                match self.classify(leaf) {
                    Leaf::Ignored => {}
                    Leaf::Condition(condition) => {
                        needs_sharding = true;
                        conditions.push(condition);
                    }
                    Leaf::NeedsSharding => needs_sharding = true,
                    Leaf::Join {
                        condition,
                        sharding,
                    } => {
                        needs_sharding |= sharding;
                        if !join_conditions.contains(&condition) {
                            join_conditions.push(condition);
                        }
                    }
                    Leaf::Unroutable => {
                        trace!(predicate = %leaf, "sharding column inside unroutable predicate");
                        unroutable = true;
                    }
                }
            }
            if unroutable || (needs_sharding && conditions.is_empty()) {
                cleared = true;
            } else if needs_sharding {
                groups.push(AndCondition::new(conditions));
            }
        }

        if cleared && !groups.is_empty() {
            trace!(groups = groups.len(), "sharding conditions cleared");
        }
        ExtractedConditions {
            sharding_conditions: if cleared {
                OrCondition::default()
            } else {
                OrCondition::new(groups)
            },
            join_conditions,
        }
    }

    /// Join conditions of predicates whose DNF is too large to build
    fn extract_joins_only(&self, predicates: &[&sql::Expr]) -> ExtractedConditions {
        let mut join_conditions: Vec<JoinCondition> = Vec::new();
        for leaf in predicates.iter().copied().flat_map(leaves) {
            if let Leaf::Join { condition, .. } = self.classify(leaf) {
                if !join_conditions.contains(&condition) {
                    join_conditions.push(condition);
                }
            }
        }
        ExtractedConditions {
            sharding_conditions: OrCondition::default(),
            join_conditions,
        }
    }

    fn classify(&self, leaf: &sql::Expr) -> Leaf {
        match leaf {
            sql::Expr::BinaryOp {
                left,
                op: sql::BinaryOperator::Eq,
                right,
            } => match (column_parts(left), column_parts(right)) {
                (Some(l), Some(r)) => {
                    let (left, left_sharding) = self.column(l);
                    let (right, right_sharding) = self.column(r);
                    Leaf::Join {
                        condition: JoinCondition { left, right },
                        sharding: left_sharding || right_sharding,
                    }
                }
                (Some(column), None) => self.compare(column, right),
                (None, Some(column)) => self.compare(column, left),
                (None, None) => self.classify_other(leaf),
            },
            sql::Expr::InList {
                expr,
                list,
                negated,
            } => match column_parts(expr) {
                Some(parts) => {
                    let (column, sharding) = self.column(parts);
                    if !sharding {
                        return Leaf::Ignored;
                    }
                    let values: Option<Vec<BoundExpression>> =
                        list.iter().map(bind_simple).collect();
                    match values {
                        Some(values) if !negated => Leaf::Condition(Condition::In { column, values }),
                        _ => Leaf::NeedsSharding,
                    }
                }
                None => self.classify_other(leaf),
            },
            sql::Expr::Between {
                expr,
                negated,
                low,
                high,
            } => match column_parts(expr) {
                Some(parts) => {
                    let (column, sharding) = self.column(parts);
                    if !sharding {
                        return Leaf::Ignored;
                    }
                    match (bind_simple(low), bind_simple(high)) {
                        (Some(low), Some(high)) if !negated => {
                            Leaf::Condition(Condition::Between { column, low, high })
                        }
                        _ => Leaf::NeedsSharding,
                    }
                }
                None => self.classify_other(leaf),
            },
            _ => self.classify_other(leaf),
        }
    }

    /// `column = value`, in either order
    fn compare(&self, parts: (Option<String>, String), value: &sql::Expr) -> Leaf {
        let (column, sharding) = self.column(parts);
        if !sharding {
            return Leaf::Ignored;
        }
        match bind_simple(value) {
            Some(value) => Leaf::Condition(Condition::Equal { column, value }),
            None => Leaf::NeedsSharding,
        }
    }

    fn classify_other(&self, leaf: &sql::Expr) -> Leaf {
        if !self.references_sharding_column(leaf) {
            return Leaf::Ignored;
        }
        let plain_operand = operands(leaf)
            .into_iter()
            .filter_map(column_parts)
            .any(|parts| self.column(parts).1);
        if plain_operand {
            Leaf::NeedsSharding
        } else {
            Leaf::Unroutable
        }
    }

    fn column(&self, (owner, name): (Option<String>, String)) -> (ColumnRef, bool) {
        let column = bind_column_ref(owner, name, self.scope);
        let sharding = self.is_sharding(&column);
        (column, sharding)
    }

    fn is_sharding(&self, column: &ColumnRef) -> bool {
        column
            .table
            .as_deref()
            .is_some_and(|table| self.rule.is_sharding_column(&column.name, table))
    }

    /// Whether a sharding column appears in `expr` outside of subqueries
    fn references_sharding_column(&self, expr: &sql::Expr) -> bool {
        let mut finder = ShardingColumnFinder {
            extractor: self,
            depth: 0,
        };
        expr.visit(&mut finder).is_break()
    }
}

struct ShardingColumnFinder<'e, 'a> {
    extractor: &'e ConditionExtractor<'a>,
    depth: usize,
}

impl Visitor for ShardingColumnFinder<'_, '_> {
    type Break = ();

    fn pre_visit_query(&mut self, _query: &sql::Query) -> ControlFlow<Self::Break> {
        self.depth += 1;
        ControlFlow::Continue(())
    }

    fn post_visit_query(&mut self, _query: &sql::Query) -> ControlFlow<Self::Break> {
        self.depth -= 1;
        ControlFlow::Continue(())
    }

    fn pre_visit_expr(&mut self, expr: &sql::Expr) -> ControlFlow<Self::Break> {
        if self.depth > 0 {
            return ControlFlow::Continue(());
        }
        if let sql::Expr::Identifier(_) | sql::Expr::CompoundIdentifier(_) = expr {
            if let Some(parts) = column_parts(expr) {
                if self.extractor.column(parts).1 {
                    return ControlFlow::Break(());
                }
            }
        }
        ControlFlow::Continue(())
    }
}

/// Direct operands of a predicate leaf
fn operands(leaf: &sql::Expr) -> Vec<&sql::Expr> {
    match leaf {
        sql::Expr::BinaryOp { left, right, .. } => vec![left.as_ref(), right.as_ref()],
        sql::Expr::IsNull(e)
        | sql::Expr::IsNotNull(e)
        | sql::Expr::IsTrue(e)
        | sql::Expr::IsNotTrue(e)
        | sql::Expr::IsFalse(e)
        | sql::Expr::IsNotFalse(e)
        | sql::Expr::IsUnknown(e)
        | sql::Expr::IsNotUnknown(e) => vec![e.as_ref()],
        sql::Expr::IsDistinctFrom(a, b) | sql::Expr::IsNotDistinctFrom(a, b) => {
            vec![a.as_ref(), b.as_ref()]
        }
        sql::Expr::Like { expr, pattern, .. }
        | sql::Expr::ILike { expr, pattern, .. }
        | sql::Expr::SimilarTo { expr, pattern, .. }
        | sql::Expr::RLike { expr, pattern, .. } => vec![expr.as_ref(), pattern.as_ref()],
        sql::Expr::InList { expr, .. }
        | sql::Expr::InSubquery { expr, .. }
        | sql::Expr::Between { expr, .. } => vec![expr.as_ref()],
        sql::Expr::AnyOp { left, .. } | sql::Expr::AllOp { left, .. } => vec![left.as_ref()],
        sql::Expr::Nested(inner) => operands(inner),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column_scope::ScopeTable;
    use crate::tables_context::SimpleTable;
    use shardbind_common::Value;
    use shardbind_rule::{ShardingRuleConfig, ShardingRuleSet};
    use sqlparser::dialect::MySqlDialect;
    use sqlparser::parser::Parser;

    fn rule() -> ShardingRuleSet {
        let config = ShardingRuleConfig::default()
            .with_table("t_order", &["user_id"], None)
            .with_table("t_order_item", &["user_id"], None)
            .with_table("t", &["id"], None);
        ShardingRuleSet::new(&config).unwrap()
    }

    fn scope(tables: &[(&str, Option<&str>)]) -> ColumnScope {
        ColumnScope::new(
            tables
                .iter()
                .map(|(name, alias)| {
                    let mut table = SimpleTable::new(*name);
                    if let Some(alias) = alias {
                        table = table.with_alias(*alias);
                    }
                    ScopeTable::physical(table, None)
                })
                .collect(),
        )
    }

    fn parse_expr(text: &str) -> sql::Expr {
        Parser::new(&MySqlDialect {})
            .try_with_sql(text)
            .unwrap()
            .parse_expr()
            .unwrap()
    }

    fn extract(tables: &[(&str, Option<&str>)], predicate: &str) -> ExtractedConditions {
        let rule = rule();
        let scope = scope(tables);
        let expr = parse_expr(predicate);
        ConditionExtractor::new(&scope, &rule).extract(&[&expr])
    }

    fn user_id() -> ColumnRef {
        ColumnRef::new("user_id", None, Some("t_order".to_string()))
    }

    #[test]
    fn test_only_sharding_columns_are_kept() {
        let result = extract(&[("t_order", None)], "user_id = 10 AND status = 'init'");
        assert_eq!(
            result.sharding_conditions,
            OrCondition::new(vec![AndCondition::new(vec![Condition::Equal {
                column: user_id(),
                value: BoundExpression::Literal(Value::Integer(10)),
            }])])
        );
    }

    #[test]
    fn test_in_and_between() {
        let result = extract(&[("t_order", None)], "user_id IN (1, 2, 3) AND user_id BETWEEN -1 AND 9");
        let group = &result.sharding_conditions.and_conditions[0];
        assert_eq!(
            group.conditions[0],
            Condition::In {
                column: user_id(),
                values: vec![
                    BoundExpression::Literal(Value::Integer(1)),
                    BoundExpression::Literal(Value::Integer(2)),
                    BoundExpression::Literal(Value::Integer(3)),
                ],
            }
        );
        assert_eq!(
            group.conditions[1],
            Condition::Between {
                column: user_id(),
                low: BoundExpression::Literal(Value::Integer(-1)),
                high: BoundExpression::Literal(Value::Integer(9)),
            }
        );
    }

    #[test]
    fn test_negated_in_needs_sharding() {
        let result = extract(&[("t_order", None)], "user_id NOT IN (1, 2)");
        assert!(result.sharding_conditions.is_empty());
    }

    #[test]
    fn test_reversed_operands() {
        let result = extract(&[("t_order", None)], "10 = user_id");
        assert_eq!(result.sharding_conditions.and_conditions[0].conditions.len(), 1);
    }

    #[test]
    fn test_in_with_complex_member_is_discarded() {
        let result = extract(&[("t_order", None)], "user_id IN (1, status + 1)");
        assert!(result.sharding_conditions.is_empty());
        let result = extract(&[("t_order", None)], "user_id IN (1, status + 1) AND user_id = 3");
        assert_eq!(result.sharding_conditions.and_conditions[0].conditions.len(), 1);
    }

    #[test]
    fn test_or_concatenates_groups() {
        let result = extract(&[("t_order", None)], "user_id = 1 OR user_id = 2");
        assert_eq!(result.sharding_conditions.len(), 2);
    }

    #[test]
    fn test_too_wide_predicate_routes_everywhere() {
        let wide: Vec<String> = (0..22)
            .map(|i| format!("(o.user_id = {i} OR o.status = {i})"))
            .collect();
        let predicate = format!("o.order_id = i.order_id AND {}", wide.join(" AND "));
        let result = extract(&[("t_order", Some("o")), ("t_order_item", Some("i"))], &predicate);
        assert!(result.sharding_conditions.is_empty());
        assert_eq!(result.join_conditions.len(), 1);
    }

    #[test]
    fn test_unroutable_predicate_clears_everything() {
        let result = extract(&[("t", None)], "(id = ? AND complex_expr(id) = 1) OR id = 2");
        assert!(result.sharding_conditions.is_empty());
    }

    #[test]
    fn test_range_only_group_clears_everything() {
        let result = extract(&[("t_order", None)], "user_id = 1 OR user_id > 5");
        assert!(result.sharding_conditions.is_empty());
    }

    #[test]
    fn test_group_without_sharding_reference_is_dropped() {
        let result = extract(&[("t_order", None)], "user_id = 1 OR status = 'x'");
        assert_eq!(result.sharding_conditions.len(), 1);
    }

    #[test]
    fn test_join_predicate() {
        let rule = rule();
        let scope = scope(&[("t_order", Some("a")), ("t_order_item", Some("b"))]);
        let on = parse_expr("a.user_id = b.user_id");
        let selection = parse_expr("a.user_id = 5");
        let result = ConditionExtractor::new(&scope, &rule).extract(&[&selection, &on]);
        assert_eq!(result.join_conditions.len(), 1);
        assert_eq!(result.join_conditions[0].to_string(), "user_id@t_order = user_id@t_order_item");
        assert_eq!(
            result.sharding_conditions.to_string(),
            "[[Equal(user_id@t_order, 5)]]"
        );
    }

    #[test]
    fn test_ambiguous_column_is_unassigned() {
        let result = extract(&[("t_order", None), ("t_order_item", None)], "user_id = 1");
        assert!(result.sharding_conditions.is_empty());
    }

    #[test]
    fn test_subquery_columns_do_not_poison() {
        let result = extract(
            &[("t_order", None)],
            "user_id = 1 AND EXISTS (SELECT 1 FROM t_order_item WHERE user_id = 2)",
        );
        assert_eq!(result.sharding_conditions.len(), 1);
    }

    #[test]
    fn test_union_of_or_conditions() {
        let a = extract(&[("t_order", None)], "user_id = 1").sharding_conditions;
        let b = extract(&[("t_order", None)], "user_id = 2").sharding_conditions;
        assert_eq!(a.union(&b).len(), 2);
        assert!(a.union(&OrCondition::default()).is_empty());
    }
}

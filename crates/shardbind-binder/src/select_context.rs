//! SELECT statement context
//!
//! A select is built in two parts. `SelectBase` holds everything the
//! statement text determines: tables, projections, ordering, conditions and
//! nested queries. `SelectBinding` holds what depends on bound parameters.
//! Rebinding swaps the binding and shares the base.

use crate::column_scope::{ColumnScope, ScopeTable};
use crate::condition::{ConditionExtractor, JoinCondition, OrCondition};
use crate::order_by::{
    is_same_group_by_and_order_by_items, GroupByContext, OrderByContext, OrderByItem,
    OrderByItemKind, OrderDirection,
};
use crate::pagination::{PaginationContext, PaginationSegments};
use crate::projection::{required_index, ProjectionKind, ProjectionsBuilder, ProjectionsContext};
use crate::statement_binder::StatementBinder;
use crate::subquery::{collect_subqueries, SubqueryType};
use crate::tables_context::{extract_tables, simple_table, TablesContext};
use crate::token::SqlToken;
use hashbrown::HashMap;
use shardbind_common::{Error, Result, Value};
use sqlparser::ast as sql;
use sqlparser::ast::Spanned;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A common table expression visible to the query being built
#[derive(Debug, Clone)]
pub(crate) struct CteDefinition {
    pub name: String,
    pub labels: Option<Vec<String>>,
}

/// Where in the statement a query is being built
#[derive(Clone, Copy)]
pub(crate) struct QueryLevel<'s> {
    /// Tables of enclosing queries
    pub outer: &'s ColumnScope,
    pub ctes: &'s [CteDefinition],
    pub depth: usize,
    pub subquery_type: Option<SubqueryType>,
}

impl<'s> QueryLevel<'s> {
    pub fn root(outer: &'s ColumnScope) -> Self {
        QueryLevel {
            outer,
            ctes: &[],
            depth: 0,
            subquery_type: None,
        }
    }

    fn nested<'t>(&self, outer: &'t ColumnScope, subquery_type: SubqueryType) -> QueryLevel<'t>
    where
        's: 't,
    {
        QueryLevel {
            outer,
            ctes: self.ctes,
            depth: self.depth + 1,
            subquery_type: Some(subquery_type),
        }
    }
}

/// Two queries combined by UNION, INTERSECT or EXCEPT
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombineContext {
    /// `UNION`, `INTERSECT` or `EXCEPT`
    pub operator: String,
    pub all: bool,
    /// Subquery keys of the two branches
    pub left: usize,
    pub right: usize,
}

/// Parameter-independent part of a select
#[derive(Debug, Clone, Default)]
pub struct SelectBase {
    pub tables: TablesContext,
    pub projections: ProjectionsContext,
    pub group_by: GroupByContext,
    pub order_by: OrderByContext,
    pub sharding_conditions: OrCondition,
    pub join_conditions: Vec<JoinCondition>,
    /// WHERE and join ON predicates of this level
    pub where_segments: Vec<sql::Expr>,
    /// Nested queries keyed by the byte offset they start at
    pub subqueries: BTreeMap<usize, Arc<SelectBase>>,
    /// `None` for the outermost query
    pub subquery_type: Option<SubqueryType>,
    pub combine: Option<CombineContext>,
    pub pagination: PaginationSegments,
    pub tokens: Vec<SqlToken>,
    pub contains_join_query: bool,
    pub contains_subquery: bool,
    pub contains_having: bool,
    pub contains_combine: bool,
    pub contains_partial_distinct_aggregation: bool,
    pub contains_table_subquery: bool,
    pub parameter_count: usize,
}

impl SelectBase {
    /// GROUP BY rows arrive in a different order than the one asked for, so
    /// every shard has to return all of its groups
    fn needs_unbounded_revision(&self) -> bool {
        !self.group_by.is_empty() && !is_same_group_by_and_order_by_items(&self.group_by, &self.order_by)
    }
}

/// Parameter-dependent part of a select
#[derive(Debug, Clone)]
pub struct SelectBinding {
    pub pagination: PaginationContext,
    pub parameters: Vec<Value>,
    pub subqueries: BTreeMap<usize, Arc<SelectBinding>>,
}

impl SelectBinding {
    pub(crate) fn new(base: &SelectBase, parameters: &[Value]) -> Result<Self> {
        let pagination =
            PaginationContext::new(base.pagination, parameters, base.needs_unbounded_revision())?;
        let mut subqueries = BTreeMap::new();
        for (key, nested) in &base.subqueries {
            subqueries.insert(*key, Arc::new(SelectBinding::new(nested, parameters)?));
        }
        Ok(SelectBinding {
            pagination,
            parameters: parameters.to_vec(),
            subqueries,
        })
    }
}

#[derive(Debug, Clone)]
pub struct SelectStatementContext {
    base: Arc<SelectBase>,
    binding: Arc<SelectBinding>,
}

impl SelectStatementContext {
    pub(crate) fn new(base: SelectBase) -> Result<Self> {
        let binding = SelectBinding::new(&base, &[])?;
        Ok(SelectStatementContext {
            base: Arc::new(base),
            binding: Arc::new(binding),
        })
    }

    pub(crate) fn from_parts(base: Arc<SelectBase>, binding: Arc<SelectBinding>) -> Self {
        SelectStatementContext { base, binding }
    }

    pub fn base(&self) -> &SelectBase {
        &self.base
    }

    pub fn binding(&self) -> &SelectBinding {
        &self.binding
    }

    pub fn tables(&self) -> &TablesContext {
        &self.base.tables
    }

    pub fn projections(&self) -> &ProjectionsContext {
        &self.base.projections
    }

    pub fn group_by(&self) -> &GroupByContext {
        &self.base.group_by
    }

    pub fn order_by(&self) -> &OrderByContext {
        &self.base.order_by
    }

    pub fn sharding_conditions(&self) -> &OrCondition {
        &self.base.sharding_conditions
    }

    pub fn join_conditions(&self) -> &[JoinCondition] {
        &self.base.join_conditions
    }

    pub fn where_segments(&self) -> &[sql::Expr] {
        &self.base.where_segments
    }

    pub fn pagination(&self) -> &PaginationContext {
        &self.binding.pagination
    }

    pub fn parameters(&self) -> &[Value] {
        &self.binding.parameters
    }

    pub fn tokens(&self) -> &[SqlToken] {
        &self.base.tokens
    }

    pub fn subquery_type(&self) -> Option<SubqueryType> {
        self.base.subquery_type
    }

    pub fn combine(&self) -> Option<&CombineContext> {
        self.base.combine.as_ref()
    }

    /// The nested query starting at byte offset `start`
    pub fn subquery_context(&self, start: usize) -> Option<SelectStatementContext> {
        let base = self.base.subqueries.get(&start)?;
        let binding = self.binding.subqueries.get(&start)?;
        Some(SelectStatementContext {
            base: base.clone(),
            binding: binding.clone(),
        })
    }

    /// Every directly nested query, in text order
    pub fn subquery_contexts(&self) -> Vec<(usize, SelectStatementContext)> {
        self.base
            .subqueries
            .keys()
            .filter_map(|key| self.subquery_context(*key).map(|context| (*key, context)))
            .collect()
    }

    pub fn is_same_group_by_and_order_by_items(&self) -> bool {
        is_same_group_by_and_order_by_items(&self.base.group_by, &self.base.order_by)
    }

    pub fn contains_join_query(&self) -> bool {
        self.base.contains_join_query
    }

    pub fn contains_subquery(&self) -> bool {
        self.base.contains_subquery
    }

    pub fn contains_having(&self) -> bool {
        self.base.contains_having
    }

    pub fn contains_combine(&self) -> bool {
        self.base.contains_combine
    }

    pub fn contains_partial_distinct_aggregation(&self) -> bool {
        self.base.contains_partial_distinct_aggregation
    }

    pub fn contains_table_subquery(&self) -> bool {
        self.base.contains_table_subquery
    }

    /// Rebind against new parameters; an empty list keeps the current binding
    pub fn bind(&self, parameters: &[Value]) -> Result<Self> {
        if parameters.is_empty() {
            return Ok(self.clone());
        }
        if parameters.len() < self.base.parameter_count {
            return Err(Error::ParameterOutOfRange {
                index: self.base.parameter_count - 1,
                count: parameters.len(),
            });
        }
        Ok(SelectStatementContext {
            base: self.base.clone(),
            binding: Arc::new(SelectBinding::new(&self.base, parameters)?),
        })
    }

    /// Fill projection, ORDER BY and GROUP BY indexes from the labels of the
    /// result set, given in column order
    pub fn with_column_labels<S: AsRef<str>>(&self, labels: &[S]) -> Result<Self> {
        let mut label_map: HashMap<String, usize> = HashMap::new();
        for (i, label) in labels.iter().enumerate() {
            label_map.entry(label.as_ref().to_lowercase()).or_insert(i + 1);
        }
        self.set_indexes(&label_map)
    }

    /// Fill indexes from a label to 1-based index map
    pub fn set_indexes(&self, label_map: &HashMap<String, usize>) -> Result<Self> {
        let labels: HashMap<String, usize> = label_map
            .iter()
            .map(|(label, index)| (label.to_lowercase(), *index))
            .collect();
        let mut base = (*self.base).clone();
        base.projections.set_indexes(&labels)?;
        for item in base.order_by.items.iter_mut() {
            item.index = Some(item_index(item, &base.projections, &base.tables, &labels)?);
        }
        for item in base.group_by.items.iter_mut() {
            item.index = Some(item_index(item, &base.projections, &base.tables, &labels)?);
        }
        Ok(SelectStatementContext {
            base: Arc::new(base),
            binding: self.binding.clone(),
        })
    }
}

fn item_index(
    item: &OrderByItem,
    projections: &ProjectionsContext,
    tables: &TablesContext,
    labels: &HashMap<String, usize>,
) -> Result<usize> {
    if let OrderByItemKind::Index(ordinal) = item.kind {
        return Ok(ordinal);
    }
    if let Some(owner) = item.owner() {
        if tables.find_by_owner(owner).is_some() {
            if let Some(index) = projections.find_projection_index(&item.text) {
                return Ok(index);
            }
        }
    }
    let label = projections
        .find_alias(&item.text)
        .unwrap_or_else(|| item.name().to_string());
    required_index(labels, &label)
}

/// Tables and nested queries of one FROM clause
#[derive(Default)]
pub(crate) struct FromClause<'q> {
    pub tables: Vec<ScopeTable>,
    /// Join ON predicates
    pub predicates: Vec<&'q sql::Expr>,
    pub subqueries: BTreeMap<usize, Arc<SelectBase>>,
    pub contains_join: bool,
    pub contains_table_subquery: bool,
}

fn join_condition(operator: &sql::JoinOperator) -> Option<&sql::Expr> {
    let constraint = match operator {
        sql::JoinOperator::Inner(c)
        | sql::JoinOperator::LeftOuter(c)
        | sql::JoinOperator::RightOuter(c)
        | sql::JoinOperator::FullOuter(c)
        | sql::JoinOperator::LeftSemi(c)
        | sql::JoinOperator::RightSemi(c)
        | sql::JoinOperator::LeftAnti(c)
        | sql::JoinOperator::RightAnti(c) => c,
        _ => return None,
    };
    match constraint {
        sql::JoinConstraint::On(expr) => Some(expr),
        _ => None,
    }
}

impl StatementBinder<'_> {
    pub(crate) fn build_query(&self, query: &sql::Query, level: QueryLevel<'_>) -> Result<SelectBase> {
        let max_depth = self.binder.max_subquery_depth();
        if level.depth > max_depth {
            return Err(Error::UnsupportedExpression(format!(
                "subqueries nested deeper than {} levels",
                max_depth
            )));
        }

        let mut ctes: Vec<CteDefinition> = level.ctes.to_vec();
        let mut with_subqueries = BTreeMap::new();
        if let Some(with) = &query.with {
            for cte in &with.cte_tables {
                let name = cte.alias.name.value.clone();
                if with.recursive {
                    ctes.push(CteDefinition {
                        name: name.clone(),
                        labels: None,
                    });
                }
                let nested = QueryLevel {
                    outer: level.outer,
                    ctes: &ctes,
                    depth: level.depth + 1,
                    subquery_type: Some(SubqueryType::With),
                };
                let base = self.build_query(&cte.query, nested)?;
                let labels = base.projections.known_column_labels();
                if with.recursive {
                    ctes.pop();
                }
                ctes.push(CteDefinition { name, labels });
                with_subqueries.insert(self.subquery_key(&cte.query), Arc::new(base));
            }
        }

        let segments = PaginationSegments::from_query(query)?;
        let order_by: &[sql::OrderByExpr] = query.order_by.as_ref().map_or(&[], |o| o.exprs.as_slice());
        let body_level = QueryLevel {
            outer: level.outer,
            ctes: &ctes,
            depth: level.depth,
            subquery_type: level.subquery_type,
        };
        let mut base = self.build_body(&query.body, order_by, body_level)?;
        if !segments.is_empty() {
            base.pagination = segments;
        }
        if !with_subqueries.is_empty() {
            for cte in with_subqueries.values() {
                base.tables = base.tables.merge(&cte.tables);
            }
            base.contains_subquery = true;
            base.subqueries.extend(with_subqueries);
        }
        Ok(base)
    }

    fn build_body(
        &self,
        body: &sql::SetExpr,
        order_by: &[sql::OrderByExpr],
        level: QueryLevel<'_>,
    ) -> Result<SelectBase> {
        match body {
            sql::SetExpr::Select(select) => self.build_select(select, order_by, level),
            sql::SetExpr::Query(query) => {
                let mut base = self.build_query(query, level)?;
                if !order_by.is_empty() {
                    base.order_by = OrderByContext {
                        items: self.order_items(order_by),
                        generated: false,
                    };
                }
                Ok(base)
            }
            sql::SetExpr::SetOperation {
                op,
                set_quantifier,
                left,
                right,
            } => self.build_combine(op, set_quantifier, left, right, order_by, level),
            other => Err(Error::NotImplemented(format!("query body: {}", other))),
        }
    }

    fn build_select(
        &self,
        select: &sql::Select,
        order_by: &[sql::OrderByExpr],
        level: QueryLevel<'_>,
    ) -> Result<SelectBase> {
        let mut from = FromClause::default();
        for table in &select.from {
            self.collect_table_with_joins(table, level, &mut from)?;
        }
        if select.from.len() > 1 {
            from.contains_join = true;
        }

        let cte_names: Vec<String> = level.ctes.iter().map(|c| c.name.clone()).collect();
        let tables = TablesContext::new(extract_tables(select, &self.source, &cte_names));
        let scope = level.outer.child(std::mem::take(&mut from.tables));

        let projections = ProjectionsBuilder::new(&scope, &self.source).build(select);
        let group_by = GroupByContext::new(&select.group_by, &self.source);
        let order_by = self.order_by_context(order_by, &group_by, &projections);
        let projections = projections.with_derived(&order_by.items, order_by.generated, &group_by.items);

        let mut predicates: Vec<&sql::Expr> = select.selection.iter().collect();
        predicates.extend(from.predicates.iter().copied());
        let extracted = ConditionExtractor::new(&scope, self.binder.rule()).extract(&predicates);

        let mut subqueries = std::mem::take(&mut from.subqueries);
        for item in &select.projection {
            for query in collect_subqueries(item) {
                let nested = level.nested(&scope, SubqueryType::Projection);
                subqueries.insert(self.subquery_key(&query), Arc::new(self.build_query(&query, nested)?));
            }
        }
        for expr in predicates.iter().copied().chain(select.having.as_ref()) {
            for query in collect_subqueries(expr) {
                let nested = level.nested(&scope, SubqueryType::Predicate);
                subqueries.insert(self.subquery_key(&query), Arc::new(self.build_query(&query, nested)?));
            }
        }

        let aggregations = projections.aggregation_projections().len();
        let distinct_aggregations = projections.aggregation_distinct_projections().len();
        Ok(SelectBase {
            tables,
            projections,
            group_by,
            order_by,
            sharding_conditions: extracted.sharding_conditions,
            join_conditions: extracted.join_conditions,
            where_segments: predicates.into_iter().cloned().collect(),
            contains_subquery: !subqueries.is_empty(),
            subqueries,
            subquery_type: level.subquery_type,
            combine: None,
            pagination: PaginationSegments::default(),
            tokens: Vec::new(),
            contains_join_query: from.contains_join,
            contains_having: select.having.is_some(),
            contains_combine: false,
            contains_partial_distinct_aggregation: aggregations > 1
                && distinct_aggregations > 0
                && aggregations != distinct_aggregations,
            contains_table_subquery: from.contains_table_subquery,
            parameter_count: 0,
        })
    }

    pub(crate) fn collect_table_with_joins<'q>(
        &self,
        table: &'q sql::TableWithJoins,
        level: QueryLevel<'_>,
        from: &mut FromClause<'q>,
    ) -> Result<()> {
        self.collect_from(&table.relation, level, from)?;
        for join in &table.joins {
            from.contains_join = true;
            self.collect_from(&join.relation, level, from)?;
            if let Some(on) = join_condition(&join.join_operator) {
                from.predicates.push(on);
            }
        }
        Ok(())
    }

    /// Record one FROM item: its table in scope, or its derived query
    fn collect_from<'q>(
        &self,
        factor: &'q sql::TableFactor,
        level: QueryLevel<'_>,
        from: &mut FromClause<'q>,
    ) -> Result<()> {
        match factor {
            sql::TableFactor::Table {
                name,
                alias,
                args: None,
                ..
            } => {
                let table = simple_table(name, alias.as_ref(), &self.source);
                let cte = level
                    .ctes
                    .iter()
                    .rev()
                    .find(|c| table.schema.is_none() && c.name.eq_ignore_ascii_case(&table.name));
                match cte {
                    Some(cte) => from
                        .tables
                        .push(ScopeTable::derived(table.alias_or_name(), cte.labels.clone())),
                    None => {
                        let columns = self.binder.table_columns(&table)?;
                        from.tables.push(ScopeTable::physical(table, columns));
                    }
                }
            }
            sql::TableFactor::Table {
                alias: Some(alias), ..
            } => from
                .tables
                .push(ScopeTable::derived(alias.name.value.clone(), None)),
            sql::TableFactor::Derived {
                subquery, alias, ..
            } => {
                from.contains_table_subquery = true;
                let base = self.build_query(subquery, level.nested(level.outer, SubqueryType::Table))?;
                if let Some(alias) = alias {
                    from.tables.push(ScopeTable::derived(
                        alias.name.value.clone(),
                        base.projections.known_column_labels(),
                    ));
                }
                from.subqueries.insert(self.subquery_key(subquery), Arc::new(base));
            }
            sql::TableFactor::NestedJoin {
                table_with_joins, ..
            } => self.collect_table_with_joins(table_with_joins, level, from)?,
            _ => {}
        }
        Ok(())
    }

    fn build_combine(
        &self,
        op: &sql::SetOperator,
        quantifier: &sql::SetQuantifier,
        left: &sql::SetExpr,
        right: &sql::SetExpr,
        order_by: &[sql::OrderByExpr],
        level: QueryLevel<'_>,
    ) -> Result<SelectBase> {
        let branch = QueryLevel {
            subquery_type: Some(SubqueryType::Combine),
            ..level
        };
        let left_base = self.build_body(left, &[], branch)?;
        let right_base = self.build_body(right, &[], branch)?;
        let left_key = self.keys.key(left.span(), &self.source);
        let right_key = self.keys.key(right.span(), &self.source);

        let mut join_conditions = left_base.join_conditions.clone();
        for condition in &right_base.join_conditions {
            if !join_conditions.contains(condition) {
                join_conditions.push(condition.clone());
            }
        }
        let mut where_segments = left_base.where_segments.clone();
        where_segments.extend(right_base.where_segments.iter().cloned());

        let base = SelectBase {
            tables: left_base.tables.merge(&right_base.tables),
            projections: left_base.projections.clone(),
            group_by: GroupByContext::default(),
            order_by: OrderByContext {
                items: self.order_items(order_by),
                generated: false,
            },
            sharding_conditions: left_base
                .sharding_conditions
                .union(&right_base.sharding_conditions),
            join_conditions,
            where_segments,
            subquery_type: level.subquery_type,
            combine: Some(CombineContext {
                operator: op.to_string(),
                all: matches!(quantifier, sql::SetQuantifier::All),
                left: left_key,
                right: right_key,
            }),
            pagination: PaginationSegments::default(),
            tokens: Vec::new(),
            contains_join_query: left_base.contains_join_query || right_base.contains_join_query,
            contains_subquery: true,
            contains_having: false,
            contains_combine: true,
            contains_partial_distinct_aggregation: false,
            contains_table_subquery: left_base.contains_table_subquery
                || right_base.contains_table_subquery,
            parameter_count: 0,
            subqueries: BTreeMap::from([(left_key, Arc::new(left_base)), (right_key, Arc::new(right_base))]),
        };
        Ok(base)
    }

    fn order_items(&self, order_by: &[sql::OrderByExpr]) -> Vec<OrderByItem> {
        order_by
            .iter()
            .map(|e| OrderByItem::from_order_by_expr(e, &self.source))
            .collect()
    }

    /// ORDER BY as written; otherwise the GROUP BY items, or the columns of a
    /// DISTINCT select list
    fn order_by_context(
        &self,
        order_by: &[sql::OrderByExpr],
        group_by: &GroupByContext,
        projections: &ProjectionsContext,
    ) -> OrderByContext {
        if !order_by.is_empty() {
            return OrderByContext {
                items: self.order_items(order_by),
                generated: false,
            };
        }
        if !group_by.is_empty() {
            return OrderByContext {
                items: group_by.items.clone(),
                generated: true,
            };
        }
        if projections.is_distinct_row() {
            let items = projections
                .expand_projections()
                .into_iter()
                .enumerate()
                .filter_map(|(i, projection)| match &projection.kind {
                    ProjectionKind::Column { owner, name } => Some(OrderByItem {
                        kind: OrderByItemKind::Column {
                            owner: owner.clone(),
                            name: name.clone(),
                        },
                        text: projection.expression.clone(),
                        direction: OrderDirection::Asc,
                        nulls_order: None,
                        index: Some(i + 1),
                        start: None,
                    }),
                    _ => None,
                })
                .collect();
            return OrderByContext {
                items,
                generated: true,
            };
        }
        OrderByContext::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pagination::RowLimit;
    use crate::test_support::bind;

    fn select(sql: &str) -> SelectStatementContext {
        bind(sql).unwrap().as_select().unwrap().clone()
    }

    #[test]
    fn test_join_conditions_and_where_segments() {
        let context = select(
            "SELECT a.order_id FROM t_order a JOIN t_order_item b ON a.user_id = b.user_id \
             WHERE a.user_id = 5",
        );
        assert!(context.contains_join_query());
        assert_eq!(context.tables().table_names(), vec!["t_order", "t_order_item"]);
        assert_eq!(context.sharding_conditions().to_string(), "[[Equal(user_id@t_order, 5)]]");
        assert_eq!(context.join_conditions().len(), 1);
        assert_eq!(context.where_segments().len(), 2);
    }

    #[test]
    fn test_group_by_generates_order_by() {
        let context = select("SELECT user_id, COUNT(*) AS cnt FROM t_order GROUP BY user_id LIMIT 5, 10");
        assert!(context.order_by().generated);
        assert!(context.is_same_group_by_and_order_by_items());
        let pagination = context.pagination();
        assert_eq!(pagination.actual_offset(), 5);
        assert_eq!(pagination.actual_row_count(), Some(10));
        assert_eq!(pagination.revised_offset(), 0);
        assert_eq!(pagination.revised_row_count(), Some(RowLimit::Bounded(15)));
    }

    #[test]
    fn test_group_by_different_order_is_unbounded() {
        let context = select(
            "SELECT user_id, COUNT(*) AS cnt FROM t_order GROUP BY user_id ORDER BY cnt DESC LIMIT 10",
        );
        assert!(!context.order_by().generated);
        assert!(!context.is_same_group_by_and_order_by_items());
        assert_eq!(context.pagination().revised_row_count(), Some(RowLimit::Unbounded));
    }

    #[test]
    fn test_predicate_subquery_context() {
        let sql = "SELECT * FROM t_order WHERE order_id IN \
                   (SELECT order_id FROM t_order_item WHERE user_id = 3)";
        let context = select(sql);
        assert!(context.contains_subquery());
        assert!(!context.contains_table_subquery());

        let start = sql.find("SELECT order_id").unwrap();
        let nested = context.subquery_context(start).unwrap();
        assert_eq!(nested.subquery_type(), Some(SubqueryType::Predicate));
        assert_eq!(
            nested.sharding_conditions().to_string(),
            "[[Equal(user_id@t_order_item, 3)]]"
        );
        assert_eq!(context.subquery_contexts().len(), 1);
    }

    #[test]
    fn test_case_subquery_markers_follow_text() {
        let sql = "SELECT CASE WHEN status = ? THEN \
                   (SELECT COUNT(*) FROM t_order_item WHERE user_id = ?) \
                   WHEN status = ? THEN 0 END FROM t_order WHERE user_id = ?";
        let context = select(sql);
        let nested = context.subquery_context(sql.find("SELECT COUNT(*)").unwrap()).unwrap();
        assert_eq!(nested.subquery_type(), Some(SubqueryType::Projection));
        assert_eq!(
            nested.sharding_conditions().to_string(),
            "[[Equal(user_id@t_order_item, $2)]]"
        );
        assert_eq!(context.sharding_conditions().to_string(), "[[Equal(user_id@t_order, $4)]]");
    }

    #[test]
    fn test_wide_predicate_keeps_join_conditions() {
        let clauses: Vec<String> = (0..22)
            .map(|i| format!("(a.user_id = {i} OR a.status = {i})"))
            .collect();
        let context = select(&format!(
            "SELECT a.order_id FROM t_order a JOIN t_order_item b ON a.order_id = b.order_id WHERE {}",
            clauses.join(" AND ")
        ));
        assert!(context.sharding_conditions().is_empty());
        assert_eq!(context.join_conditions().len(), 1);
    }

    #[test]
    fn test_table_subquery() {
        let context = select("SELECT d.user_id FROM (SELECT user_id FROM t_order WHERE user_id = 1) AS d");
        assert!(context.contains_table_subquery());
        let nested = context.subquery_contexts();
        assert_eq!(nested.len(), 1);
        assert_eq!(nested[0].1.subquery_type(), Some(SubqueryType::Table));
        assert_eq!(nested[0].1.sharding_conditions().len(), 1);
    }

    #[test]
    fn test_union_collects_both_branches() {
        let context = select(
            "SELECT order_id FROM t_order WHERE user_id = 1 \
             UNION ALL SELECT order_id FROM t_order WHERE user_id = 2",
        );
        assert!(context.contains_combine());
        let combine = context.combine().unwrap();
        assert_eq!(combine.operator, "UNION");
        assert!(combine.all);
        assert_eq!(context.sharding_conditions().len(), 2);

        let branches = context.subquery_contexts();
        assert_eq!(branches.len(), 2);
        assert_eq!(branches[0].0, combine.left);
        assert!(branches
            .iter()
            .all(|(_, branch)| branch.subquery_type() == Some(SubqueryType::Combine)));
    }

    #[test]
    fn test_union_with_unconstrained_branch() {
        let context = select(
            "SELECT order_id FROM t_order WHERE user_id = 1 UNION SELECT order_id FROM t_order_item",
        );
        assert!(context.sharding_conditions().is_empty());
        assert!(!context.combine().unwrap().all);
    }

    #[test]
    fn test_cte_tables() {
        let context = select("WITH o AS (SELECT user_id FROM t_order WHERE user_id = 7) SELECT o.user_id FROM o");
        assert_eq!(context.tables().table_names(), vec!["t_order"]);
        let nested = context.subquery_contexts();
        assert_eq!(nested.len(), 1);
        assert_eq!(nested[0].1.subquery_type(), Some(SubqueryType::With));
    }

    #[test]
    fn test_partial_distinct_aggregation() {
        let partial = select("SELECT COUNT(DISTINCT user_id), SUM(order_id) FROM t_order");
        assert!(partial.contains_partial_distinct_aggregation());
        let full = select("SELECT COUNT(DISTINCT user_id) FROM t_order");
        assert!(!full.contains_partial_distinct_aggregation());
    }

    #[test]
    fn test_having() {
        let context = select("SELECT user_id FROM t_order GROUP BY user_id HAVING COUNT(*) > 1");
        assert!(context.contains_having());
    }

    #[test]
    fn test_rebind_keeps_base() {
        let context = select("SELECT * FROM t_order WHERE user_id = ? LIMIT ?");
        assert_eq!(context.pagination().actual_row_count(), None);

        let bound = context
            .bind(&[Value::Integer(1), Value::Integer(20)])
            .unwrap();
        assert_eq!(bound.pagination().actual_row_count(), Some(20));
        assert_eq!(bound.parameters().len(), 2);
        assert!(std::ptr::eq(bound.base(), context.base()));
        assert_eq!(context.pagination().actual_row_count(), None);

        assert!(context.bind(&[]).unwrap().parameters().is_empty());
        match context.bind(&[Value::Integer(1)]) {
            Err(Error::ParameterOutOfRange { index, count }) => {
                assert_eq!(index, 1);
                assert_eq!(count, 1);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_column_labels_fill_indexes() {
        let context = select(
            "SELECT o.user_id, COUNT(*) AS cnt FROM t_order o GROUP BY o.user_id ORDER BY cnt",
        );
        let indexed = context.with_column_labels(&["user_id", "cnt"]).unwrap();
        assert_eq!(indexed.order_by().items[0].index, Some(2));
        assert_eq!(indexed.group_by().items[0].index, Some(1));
        assert_eq!(indexed.projections().projections()[1].index, Some(2));
        assert_eq!(context.order_by().items[0].index, None);
    }

    #[test]
    fn test_missing_aggregation_label() {
        let context = select("SELECT COUNT(*) FROM t_order");
        assert!(matches!(
            context.with_column_labels(&["x"]),
            Err(Error::CannotFindIndex(_))
        ));
    }

    #[test]
    fn test_first_label_wins() {
        let context = select("SELECT user_id, status AS user_id FROM t_order ORDER BY user_id");
        let indexed = context.with_column_labels(&["user_id", "user_id"]).unwrap();
        assert_eq!(indexed.order_by().items[0].index, Some(1));
    }
}

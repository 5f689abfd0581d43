//! Select list resolution
//!
//! Each select item becomes a `Projection`. Items the merge layer needs but
//! the statement does not select are added as derived projections:
//! - `AVG(x)` also needs `COUNT(x)` and `SUM(x)` from every shard
//! - ORDER BY and GROUP BY items missing from the select list
//!
//! Indexes are filled in a second pass once the result column labels are known.

use crate::column_scope::ColumnScope;
use crate::expression_binder::{column_parts, normalize_expression};
use crate::order_by::{OrderByItem, OrderByItemKind};
use hashbrown::HashMap;
use shardbind_common::{Error, Result};
use shardbind_parser::{parameter_index, SourceText};
use sqlparser::ast as sql;
use sqlparser::ast::Spanned;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregationType {
    Max,
    Min,
    Sum,
    Count,
    Avg,
    BitXor,
}

static AGGREGATION_TYPES: &[(&str, AggregationType)] = &[
    ("MAX", AggregationType::Max),
    ("MIN", AggregationType::Min),
    ("SUM", AggregationType::Sum),
    ("COUNT", AggregationType::Count),
    ("AVG", AggregationType::Avg),
    ("BIT_XOR", AggregationType::BitXor),
];

impl AggregationType {
    pub fn from_name(name: &str) -> Option<Self> {
        AGGREGATION_TYPES
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, t)| *t)
    }

    pub fn name(&self) -> &'static str {
        AGGREGATION_TYPES
            .iter()
            .find(|(_, t)| t == self)
            .map(|(n, _)| *n)
            .unwrap_or("UNKNOWN")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregationProjection {
    pub aggregation: AggregationType,
    pub distinct: bool,
    /// Argument text, `*` for `COUNT(*)`
    pub inner_expression: String,
    /// Projections the merge layer needs to compute this one
    pub derived: Vec<Projection>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProjectionKind {
    Column {
        owner: Option<String>,
        name: String,
    },
    Aggregation(AggregationProjection),
    Subquery {
        start: usize,
    },
    ParameterMarker {
        parameter: usize,
    },
    /// `*` or `owner.*`, with the columns it stands for when known
    Shorthand {
        owner: Option<String>,
        columns: Vec<Projection>,
    },
    Expression,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    pub kind: ProjectionKind,
    pub expression: String,
    pub alias: Option<String>,
    /// 1-based position in the result set, once known
    pub index: Option<usize>,
}

impl Projection {
    fn new(kind: ProjectionKind, expression: String, alias: Option<String>) -> Self {
        Projection {
            kind,
            expression,
            alias,
            index: None,
        }
    }

    fn column(owner: Option<String>, name: String) -> Self {
        let expression = match &owner {
            Some(owner) => format!("{}.{}", owner, name),
            None => name.clone(),
        };
        Projection::new(ProjectionKind::Column { owner, name }, expression, None)
    }

    /// The label the column carries in a result set
    pub fn column_label(&self) -> String {
        if let Some(alias) = &self.alias {
            return alias.clone();
        }
        match &self.kind {
            ProjectionKind::Column { name, .. } => name.clone(),
            _ => self.expression.clone(),
        }
    }

    pub fn as_aggregation(&self) -> Option<&AggregationProjection> {
        match &self.kind {
            ProjectionKind::Aggregation(aggregation) => Some(aggregation),
            _ => None,
        }
    }

    fn matches_text(&self, text: &str) -> bool {
        let text = normalize_expression(text);
        normalize_expression(&self.expression) == text
            || self
                .alias
                .as_deref()
                .is_some_and(|a| normalize_expression(a) == text)
    }
}

impl fmt::Display for Projection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expression)?;
        if let Some(alias) = &self.alias {
            write!(f, " AS {}", alias)?;
        }
        if let Some(index) = self.index {
            write!(f, " #{}", index)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectionsContext {
    projections: Vec<Projection>,
    /// Derived from ORDER BY / GROUP BY items missing from the select list
    derived: Vec<Projection>,
    distinct_row: bool,
    distinct_columns: Vec<String>,
}

impl ProjectionsContext {
    pub fn projections(&self) -> &[Projection] {
        &self.projections
    }

    pub fn derived_projections(&self) -> &[Projection] {
        &self.derived
    }

    pub fn is_distinct_row(&self) -> bool {
        self.distinct_row
    }

    /// Columns that make a row distinct: the first item's, then every
    /// later plain column
    pub fn distinct_columns(&self) -> &[String] {
        &self.distinct_columns
    }

    pub fn is_unqualified_shorthand(&self) -> bool {
        self.projections
            .iter()
            .any(|p| matches!(p.kind, ProjectionKind::Shorthand { owner: None, .. }))
    }

    pub fn aggregation_projections(&self) -> Vec<&Projection> {
        self.projections
            .iter()
            .filter(|p| p.as_aggregation().is_some())
            .collect()
    }

    pub fn aggregation_distinct_projections(&self) -> Vec<&Projection> {
        self.projections
            .iter()
            .filter(|p| p.as_aggregation().is_some_and(|a| a.distinct))
            .collect()
    }

    /// Every result column in order: the select list with shorthands
    /// expanded, then columns derived for AVG, then columns derived for
    /// ORDER BY and GROUP BY
    pub fn expand_projections(&self) -> Vec<&Projection> {
        let mut result: Vec<&Projection> = Vec::new();
        for projection in &self.projections {
            match &projection.kind {
                ProjectionKind::Shorthand { columns, .. } => result.extend(columns.iter()),
                _ => result.push(projection),
            }
        }
        for projection in &self.projections {
            if let Some(aggregation) = projection.as_aggregation() {
                result.extend(aggregation.derived.iter());
            }
        }
        result.extend(self.derived.iter());
        result
    }

    pub fn column_labels(&self) -> Vec<String> {
        self.expand_projections()
            .into_iter()
            .map(Projection::column_label)
            .collect()
    }

    /// Labels of the select list, `None` when a shorthand could not be expanded
    pub(crate) fn known_column_labels(&self) -> Option<Vec<String>> {
        let unexpanded = self.projections.iter().any(|p| {
            matches!(&p.kind, ProjectionKind::Shorthand { columns, .. } if columns.is_empty())
        });
        if unexpanded {
            return None;
        }
        let mut labels = Vec::new();
        for projection in &self.projections {
            match &projection.kind {
                ProjectionKind::Shorthand { columns, .. } => {
                    labels.extend(columns.iter().map(Projection::column_label))
                }
                _ => labels.push(projection.column_label()),
            }
        }
        Some(labels)
    }

    /// 1-based position of the result column whose expression or alias is `text`
    pub fn find_projection_index(&self, text: &str) -> Option<usize> {
        self.expand_projections()
            .iter()
            .position(|p| p.matches_text(text))
            .map(|i| i + 1)
    }

    /// The label ORDER BY / GROUP BY text refers to.
    ///
    /// Projections are checked in declared order and the first match wins:
    /// an expression match gives that projection's alias, an alias match
    /// gives the text itself. `SELECT *` has no aliases to match.
    pub fn find_alias(&self, text: &str) -> Option<String> {
        if self.is_unqualified_shorthand() {
            return None;
        }
        let normalized = normalize_expression(text);
        for projection in self.projections.iter().chain(self.derived.iter()) {
            if normalize_expression(&projection.expression) == normalized {
                return projection.alias.clone();
            }
            if projection
                .alias
                .as_deref()
                .is_some_and(|a| normalize_expression(a) == normalized)
            {
                return Some(text.to_string());
            }
            if let ProjectionKind::Column { name, .. } = &projection.kind {
                if projection.alias.is_some() && normalize_expression(name) == normalized {
                    return projection.alias.clone();
                }
            }
        }
        None
    }

    /// Whether an ORDER BY / GROUP BY item is already among the result columns
    pub(crate) fn contains_item(&self, item: &OrderByItem, extra: &[Projection]) -> bool {
        if matches!(item.kind, OrderByItemKind::Index(_)) {
            return true;
        }
        let text = normalize_expression(&item.text);
        self.projections.iter().any(|p| projection_contains(p, item))
            || extra
                .iter()
                .any(|p| normalize_expression(&p.expression) == text || projection_contains(p, item))
    }

    /// Add derived projections for ORDER BY and GROUP BY items missing from
    /// the select list. Generated ORDER BY items repeat GROUP BY items and
    /// derive nothing on their own.
    pub(crate) fn with_derived(
        mut self,
        order_by: &[OrderByItem],
        order_generated: bool,
        group_by: &[OrderByItem],
    ) -> Self {
        let mut derived: Vec<Projection> = Vec::new();
        if !order_generated {
            let mut n = 0;
            for item in order_by {
                if !self.contains_item(item, &derived) {
                    derived.push(derived_projection(item, format!("ORDER_BY_DERIVED_{}", n)));
                    n += 1;
                }
            }
        }
        let mut n = 0;
        for item in group_by {
            if !self.contains_item(item, &derived) {
                derived.push(derived_projection(item, format!("GROUP_BY_DERIVED_{}", n)));
                n += 1;
            }
        }
        self.derived = derived;
        self
    }

    /// Fill result set positions from a label to index map (keys lowercase).
    ///
    /// Aggregations, derived ones included, must be found: the merge layer
    /// cannot combine a column it cannot locate.
    pub(crate) fn set_indexes(&mut self, labels: &HashMap<String, usize>) -> Result<()> {
        for projection in self.projections.iter_mut() {
            let label = projection.column_label();
            match &mut projection.kind {
                ProjectionKind::Aggregation(aggregation) => {
                    for derived in aggregation.derived.iter_mut() {
                        derived.index = Some(required_index(labels, &derived.column_label())?);
                    }
                    projection.index = Some(required_index(labels, &label)?);
                }
                ProjectionKind::Shorthand { columns, .. } => {
                    for column in columns.iter_mut() {
                        column.index = labels.get(&column.column_label().to_lowercase()).copied();
                    }
                }
                _ => projection.index = labels.get(&label.to_lowercase()).copied(),
            }
        }
        for projection in self.derived.iter_mut() {
            projection.index = labels.get(&projection.column_label().to_lowercase()).copied();
        }
        Ok(())
    }
}

pub(crate) fn required_index(labels: &HashMap<String, usize>, label: &str) -> Result<usize> {
    labels
        .get(&label.to_lowercase())
        .copied()
        .ok_or_else(|| Error::CannotFindIndex(label.to_string()))
}

fn derived_projection(item: &OrderByItem, alias: String) -> Projection {
    let kind = match &item.kind {
        OrderByItemKind::Column { owner, name } => ProjectionKind::Column {
            owner: owner.clone(),
            name: name.clone(),
        },
        _ => ProjectionKind::Expression,
    };
    Projection::new(kind, item.text.clone(), Some(alias))
}

fn projection_contains(projection: &Projection, item: &OrderByItem) -> bool {
    let text = normalize_expression(&item.text);
    if let ProjectionKind::Shorthand { owner, columns } = &projection.kind {
        return match owner {
            None => true,
            Some(owner) => {
                item.owner().is_some_and(|o| o.eq_ignore_ascii_case(owner))
                    || (item.owner().is_none()
                        && columns.iter().any(|c| projection_contains(c, item)))
            }
        };
    }
    if projection
        .alias
        .as_deref()
        .is_some_and(|a| normalize_expression(a) == text)
    {
        return true;
    }
    if projection.alias.is_some() {
        return false;
    }
    if normalize_expression(&projection.expression) == text {
        return true;
    }
    match (&projection.kind, &item.kind) {
        (
            ProjectionKind::Column { owner, name },
            OrderByItemKind::Column {
                owner: item_owner,
                name: item_name,
            },
        ) => {
            name.eq_ignore_ascii_case(item_name)
                && match (owner, item_owner) {
                    (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
                    _ => true,
                }
        }
        _ => false,
    }
}

/// Builds the projections of one select
pub(crate) struct ProjectionsBuilder<'a> {
    scope: &'a ColumnScope,
    source: &'a SourceText<'a>,
    avg_derived: usize,
    distinct_derived: usize,
}

impl<'a> ProjectionsBuilder<'a> {
    pub fn new(scope: &'a ColumnScope, source: &'a SourceText<'a>) -> Self {
        ProjectionsBuilder {
            scope,
            source,
            avg_derived: 0,
            distinct_derived: 0,
        }
    }

    pub fn build(mut self, select: &sql::Select) -> ProjectionsContext {
        let projections: Vec<Projection> = select
            .projection
            .iter()
            .map(|item| self.build_item(item))
            .collect();

        let (distinct_row, distinct_columns) = match &select.distinct {
            Some(sql::Distinct::Distinct) => (true, distinct_columns(&projections)),
            Some(sql::Distinct::On(exprs)) => (true, exprs.iter().map(|e| e.to_string()).collect()),
            None => (false, Vec::new()),
        };

        ProjectionsContext {
            projections,
            derived: Vec::new(),
            distinct_row,
            distinct_columns,
        }
    }

    fn build_item(&mut self, item: &sql::SelectItem) -> Projection {
        match item {
            sql::SelectItem::UnnamedExpr(expr) => self.build_expr(expr, None),
            sql::SelectItem::ExprWithAlias { expr, alias } => {
                self.build_expr(expr, Some(alias.value.clone()))
            }
            sql::SelectItem::Wildcard(_) => Projection::new(
                ProjectionKind::Shorthand {
                    owner: None,
                    columns: self.expand_all(),
                },
                "*".to_string(),
                None,
            ),
            sql::SelectItem::QualifiedWildcard(name, _) => {
                let owner = name.0.last().map(|i| i.value.clone()).unwrap_or_default();
                let columns = self
                    .scope
                    .find_owner(&owner)
                    .and_then(|t| t.columns.clone())
                    .unwrap_or_default()
                    .into_iter()
                    .map(|c| Projection::column(Some(owner.clone()), c))
                    .collect();
                Projection::new(
                    ProjectionKind::Shorthand {
                        owner: Some(owner),
                        columns,
                    },
                    format!("{}.*", name),
                    None,
                )
            }
        }
    }

    fn expand_all(&self) -> Vec<Projection> {
        let mut columns = Vec::new();
        for table in self.scope.tables() {
            match &table.columns {
                Some(names) => columns.extend(
                    names
                        .iter()
                        .map(|c| Projection::column(Some(table.table.alias_or_name().to_string()), c.clone())),
                ),
                None => return Vec::new(),
            }
        }
        columns
    }

    fn build_expr(&mut self, expr: &sql::Expr, alias: Option<String>) -> Projection {
        let text = expr.to_string();
        match expr {
            sql::Expr::Identifier(_) | sql::Expr::CompoundIdentifier(_) => match column_parts(expr) {
                Some((owner, name)) => {
                    Projection::new(ProjectionKind::Column { owner, name }, text, alias)
                }
                None => Projection::new(ProjectionKind::Expression, text, alias),
            },
            sql::Expr::Function(function) => match self.build_aggregation(function) {
                Some(aggregation) => {
                    let alias = match alias {
                        None if aggregation.distinct => {
                            let derived = format!("AGGREGATION_DISTINCT_DERIVED_{}", self.distinct_derived);
                            self.distinct_derived += 1;
                            Some(derived)
                        }
                        alias => alias,
                    };
                    Projection::new(ProjectionKind::Aggregation(aggregation), text, alias)
                }
                None => Projection::new(ProjectionKind::Expression, text, alias),
            },
            sql::Expr::Subquery(query) => match self.source.offset(query.span().start) {
                Some(start) => Projection::new(ProjectionKind::Subquery { start }, text, alias),
                None => Projection::new(ProjectionKind::Expression, text, alias),
            },
            sql::Expr::Value(sql::Value::Placeholder(marker)) => match parameter_index(marker) {
                Some(parameter) => {
                    Projection::new(ProjectionKind::ParameterMarker { parameter }, text, alias)
                }
                None => Projection::new(ProjectionKind::Expression, text, alias),
            },
            sql::Expr::Nested(inner) if column_parts(inner).is_some() => self.build_expr(inner, alias),
            _ => Projection::new(ProjectionKind::Expression, text, alias),
        }
    }

    fn build_aggregation(&mut self, function: &sql::Function) -> Option<AggregationProjection> {
        if function.over.is_some() {
            return None;
        }
        let name = function.name.0.last()?.value.as_str();
        let aggregation = AggregationType::from_name(name)?;
        let (distinct, inner_expression) = match &function.args {
            sql::FunctionArguments::List(list) => {
                let distinct = matches!(list.duplicate_treatment, Some(sql::DuplicateTreatment::Distinct));
                let args: Vec<String> = list.args.iter().map(|a| a.to_string()).collect();
                (distinct, args.join(", "))
            }
            sql::FunctionArguments::None => (false, String::new()),
            sql::FunctionArguments::Subquery(query) => (false, query.to_string()),
        };

        let mut derived = Vec::new();
        if aggregation == AggregationType::Avg {
            let prefix = if distinct { "DISTINCT " } else { "" };
            let n = self.avg_derived;
            self.avg_derived += 1;
            for (derived_type, label) in [
                (AggregationType::Count, format!("AVG_DERIVED_COUNT_{}", n)),
                (AggregationType::Sum, format!("AVG_DERIVED_SUM_{}", n)),
            ] {
                derived.push(Projection::new(
                    ProjectionKind::Aggregation(AggregationProjection {
                        aggregation: derived_type,
                        distinct,
                        inner_expression: inner_expression.clone(),
                        derived: Vec::new(),
                    }),
                    format!("{}({}{})", derived_type.name(), prefix, inner_expression),
                    Some(label),
                ));
            }
        }

        Some(AggregationProjection {
            aggregation,
            distinct,
            inner_expression,
            derived,
        })
    }
}

fn distinct_columns(projections: &[Projection]) -> Vec<String> {
    fn push(columns: &mut Vec<String>, name: String) {
        if !columns.iter().any(|c| c.eq_ignore_ascii_case(&name)) {
            columns.push(name);
        }
    }
    let mut columns: Vec<String> = Vec::new();
    if let Some(first) = projections.first() {
        match &first.kind {
            ProjectionKind::Shorthand { columns: expanded, .. } => {
                for column in expanded {
                    push(&mut columns, column.column_label());
                }
            }
            _ => push(&mut columns, first.column_label()),
        }
    }
    for projection in projections.iter().skip(1) {
        if let ProjectionKind::Column { .. } = projection.kind {
            push(&mut columns, projection.column_label());
        }
    }
    columns
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column_scope::ScopeTable;
    use crate::order_by::OrderDirection;
    use crate::tables_context::SimpleTable;
    use shardbind_parser::{parse_statement, DatabaseType};

    fn select_of(sql: &str) -> (sql::Select, Vec<OrderByItem>) {
        let parsed = parse_statement(sql, DatabaseType::MySql).unwrap();
        let source = SourceText::new(sql);
        match parsed.statement {
            sql::Statement::Query(query) => {
                let order = query
                    .order_by
                    .as_ref()
                    .map(|o| {
                        o.exprs
                            .iter()
                            .map(|e| OrderByItem::from_order_by_expr(e, &source))
                            .collect()
                    })
                    .unwrap_or_default();
                match *query.body {
                    sql::SetExpr::Select(select) => (*select, order),
                    _ => panic!("not a select"),
                }
            }
            _ => panic!("not a query"),
        }
    }

    fn build(sql: &str, scope: &ColumnScope) -> (ProjectionsContext, Vec<OrderByItem>) {
        let (select, order) = select_of(sql);
        let source = SourceText::new(sql);
        let context = ProjectionsBuilder::new(scope, &source).build(&select);
        (context, order)
    }

    fn order_scope() -> ColumnScope {
        ColumnScope::new(vec![ScopeTable::physical(
            SimpleTable::new("t_order").with_alias("o"),
            Some(vec!["order_id".into(), "user_id".into(), "status".into()]),
        )])
    }

    #[test]
    fn test_projection_kinds() {
        let (context, _) = build(
            "SELECT o.order_id, COUNT(*) AS c, (SELECT 1), ?, user_id + 1 FROM t_order o",
            &order_scope(),
        );
        let p = context.projections();
        assert!(matches!(&p[0].kind, ProjectionKind::Column { owner: Some(o), name } if o == "o" && name == "order_id"));
        assert_eq!(p[0].column_label(), "order_id");
        assert!(matches!(&p[1].kind, ProjectionKind::Aggregation(a) if a.aggregation == AggregationType::Count && a.inner_expression == "*"));
        assert_eq!(p[1].column_label(), "c");
        assert!(matches!(p[2].kind, ProjectionKind::Subquery { start: 35 }));
        assert!(matches!(p[3].kind, ProjectionKind::ParameterMarker { parameter: 0 }));
        assert!(matches!(p[4].kind, ProjectionKind::Expression));
        assert_eq!(p[4].column_label(), "user_id + 1");
    }

    #[test]
    fn test_shorthand_expansion() {
        let (context, _) = build("SELECT * FROM t_order o", &order_scope());
        assert!(context.is_unqualified_shorthand());
        assert_eq!(context.column_labels(), vec!["order_id", "user_id", "status"]);
        assert_eq!(context.find_alias("user_id"), None);

        let (context, _) = build("SELECT * FROM t_order o", &ColumnScope::new(vec![ScopeTable::physical(SimpleTable::new("t_order"), None)]));
        assert!(context.column_labels().is_empty());
        assert_eq!(context.known_column_labels(), None);
    }

    #[test]
    fn test_avg_and_distinct_derivation() {
        let (context, _) = build(
            "SELECT AVG(price), COUNT(DISTINCT user_id), AVG(DISTINCT amount) AS a FROM t_order o",
            &order_scope(),
        );
        assert_eq!(
            context.column_labels(),
            vec![
                "AVG(price)",
                "AGGREGATION_DISTINCT_DERIVED_0",
                "a",
                "AVG_DERIVED_COUNT_0",
                "AVG_DERIVED_SUM_0",
                "AVG_DERIVED_COUNT_1",
                "AVG_DERIVED_SUM_1",
            ]
        );
        assert_eq!(context.aggregation_projections().len(), 3);
        assert_eq!(context.aggregation_distinct_projections().len(), 2);
        let avg = context.projections()[2].as_aggregation().unwrap();
        assert_eq!(avg.derived[0].expression, "COUNT(DISTINCT amount)");
    }

    #[test]
    fn test_window_function_is_not_aggregation() {
        let (context, _) = build("SELECT SUM(price) OVER (PARTITION BY user_id) FROM t_order o", &order_scope());
        assert!(context.aggregation_projections().is_empty());
    }

    #[test]
    fn test_order_by_derived_projections() {
        let (context, order) = build(
            "SELECT o.order_id, status AS s FROM t_order o ORDER BY o.user_id, s, order_id, 1, LENGTH(status)",
            &order_scope(),
        );
        let context = context.with_derived(&order, false, &[]);
        let derived: Vec<(String, String)> = context
            .derived_projections()
            .iter()
            .map(|p| (p.expression.clone(), p.column_label()))
            .collect();
        assert_eq!(
            derived,
            vec![
                ("o.user_id".to_string(), "ORDER_BY_DERIVED_0".to_string()),
                ("LENGTH(status)".to_string(), "ORDER_BY_DERIVED_1".to_string()),
            ]
        );
    }

    #[test]
    fn test_group_by_derived_checks_order_derived() {
        let (context, order) = build("SELECT COUNT(*) FROM t_order o ORDER BY user_id", &order_scope());
        let group = vec![
            OrderByItem { direction: OrderDirection::Asc, ..order[0].clone() },
            OrderByItem {
                kind: OrderByItemKind::Column { owner: None, name: "status".into() },
                text: "status".into(),
                direction: OrderDirection::Asc,
                nulls_order: None,
                index: None,
                start: None,
            },
        ];
        let context = context.with_derived(&order, false, &group);
        let labels: Vec<String> = context.derived_projections().iter().map(|p| p.column_label()).collect();
        assert_eq!(labels, vec!["ORDER_BY_DERIVED_0", "GROUP_BY_DERIVED_0"]);
    }

    #[test]
    fn test_find_alias_first_declared_wins() {
        let (context, _) = build("SELECT status AS x, user_id AS x, order_id AS status FROM t_order o", &order_scope());
        assert_eq!(context.find_alias("status"), Some("x".to_string()));
        assert_eq!(context.find_alias("x"), Some("x".to_string()));
        assert_eq!(context.find_alias("missing"), None);
    }

    #[test]
    fn test_find_projection_index() {
        let (context, _) = build("SELECT order_id, user_id AS uid FROM t_order o", &order_scope());
        assert_eq!(context.find_projection_index("user_id"), Some(2));
        assert_eq!(context.find_projection_index("UID"), Some(2));
        assert_eq!(context.find_projection_index("status"), None);
    }

    #[test]
    fn test_distinct_columns() {
        let (context, _) = build("SELECT DISTINCT user_id, COUNT(*), status FROM t_order o", &order_scope());
        assert!(context.is_distinct_row());
        assert_eq!(context.distinct_columns(), &["user_id".to_string(), "status".to_string()]);
    }

    #[test]
    fn test_set_indexes_requires_aggregations() {
        let (mut context, _) = build("SELECT user_id, AVG(price) AS a FROM t_order o", &order_scope());
        let mut labels: HashMap<String, usize> = HashMap::new();
        labels.insert("user_id".into(), 1);
        labels.insert("a".into(), 2);
        assert!(matches!(
            context.clone().set_indexes(&labels),
            Err(Error::CannotFindIndex(label)) if label == "AVG_DERIVED_COUNT_0"
        ));
        labels.insert("avg_derived_count_0".into(), 3);
        labels.insert("avg_derived_sum_0".into(), 4);
        context.set_indexes(&labels).unwrap();
        let avg = &context.projections()[1];
        assert_eq!(avg.index, Some(2));
        assert_eq!(avg.as_aggregation().unwrap().derived[1].index, Some(4));
        assert_eq!(context.projections()[0].index, Some(1));
    }
}

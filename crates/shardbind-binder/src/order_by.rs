//! ORDER BY and GROUP BY items

use crate::expression_binder::{column_parts, normalize_expression};
use shardbind_parser::SourceText;
use sqlparser::ast as sql;
use sqlparser::ast::Spanned;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullsOrder {
    First,
    Last,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderByItemKind {
    /// `ORDER BY 2`
    Index(usize),
    Column {
        owner: Option<String>,
        name: String,
    },
    Expression,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderByItem {
    pub kind: OrderByItemKind,
    /// Item as written, normalized by the parser
    pub text: String,
    pub direction: OrderDirection,
    pub nulls_order: Option<NullsOrder>,
    /// 1-based position in the result set, once known
    pub index: Option<usize>,
    /// Byte offset of the item in the statement
    pub start: Option<usize>,
}

impl OrderByItem {
    pub(crate) fn new(
        expr: &sql::Expr,
        direction: OrderDirection,
        nulls_order: Option<NullsOrder>,
        source: &SourceText<'_>,
    ) -> Self {
        let kind = match expr {
            sql::Expr::Value(sql::Value::Number(n, _)) => match n.parse::<usize>() {
                Ok(ordinal) if ordinal > 0 => OrderByItemKind::Index(ordinal),
                _ => OrderByItemKind::Expression,
            },
            sql::Expr::Identifier(_) | sql::Expr::CompoundIdentifier(_) => match column_parts(expr) {
                Some((owner, name)) => OrderByItemKind::Column { owner, name },
                None => OrderByItemKind::Expression,
            },
            _ => OrderByItemKind::Expression,
        };
        let index = match kind {
            OrderByItemKind::Index(ordinal) => Some(ordinal),
            _ => None,
        };
        OrderByItem {
            kind,
            text: expr.to_string(),
            direction,
            nulls_order,
            index,
            start: source.offset(expr.span().start),
        }
    }

    pub(crate) fn from_order_by_expr(item: &sql::OrderByExpr, source: &SourceText<'_>) -> Self {
        let direction = match item.asc {
            Some(false) => OrderDirection::Desc,
            _ => OrderDirection::Asc,
        };
        let nulls_order = item.nulls_first.map(|first| {
            if first {
                NullsOrder::First
            } else {
                NullsOrder::Last
            }
        });
        OrderByItem::new(&item.expr, direction, nulls_order, source)
    }

    /// Column name for column items, the item text otherwise
    pub fn name(&self) -> &str {
        match &self.kind {
            OrderByItemKind::Column { name, .. } => name,
            _ => &self.text,
        }
    }

    pub fn owner(&self) -> Option<&str> {
        match &self.kind {
            OrderByItemKind::Column { owner, .. } => owner.as_deref(),
            _ => None,
        }
    }

    fn same_item(&self, other: &OrderByItem) -> bool {
        self.direction == other.direction
            && self.nulls_order == other.nulls_order
            && normalize_expression(&self.text) == normalize_expression(&other.text)
    }
}

impl fmt::Display for OrderByItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text)?;
        if self.direction == OrderDirection::Desc {
            write!(f, " DESC")?;
        }
        if let Some(index) = self.index {
            write!(f, " #{}", index)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderByContext {
    pub items: Vec<OrderByItem>,
    /// Items were not written but derived from GROUP BY or DISTINCT
    pub generated: bool,
}

impl OrderByContext {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupByContext {
    pub items: Vec<OrderByItem>,
}

impl GroupByContext {
    pub(crate) fn new(group_by: &sql::GroupByExpr, source: &SourceText<'_>) -> Self {
        let items = match group_by {
            sql::GroupByExpr::Expressions(exprs, _) => exprs
                .iter()
                .map(|e| OrderByItem::new(e, OrderDirection::Asc, None, source))
                .collect(),
            _ => Vec::new(),
        };
        GroupByContext { items }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Whether a grouped query is already sorted the way its ORDER BY asks
pub fn is_same_group_by_and_order_by_items(group_by: &GroupByContext, order_by: &OrderByContext) -> bool {
    !group_by.is_empty()
        && group_by.items.len() == order_by.items.len()
        && group_by
            .items
            .iter()
            .zip(&order_by.items)
            .all(|(g, o)| g.same_item(o))
}

#[cfg(test)]
mod tests {
    use super::*;
    use shardbind_parser::{parse_statement, DatabaseType};

    fn order_items(sql: &str) -> Vec<OrderByItem> {
        let parsed = parse_statement(sql, DatabaseType::MySql).unwrap();
        let source = SourceText::new(sql);
        match parsed.statement {
            sql::Statement::Query(query) => query
                .order_by
                .map(|o| o.exprs)
                .unwrap_or_default()
                .iter()
                .map(|e| OrderByItem::from_order_by_expr(e, &source))
                .collect(),
            _ => panic!("not a query"),
        }
    }

    #[test]
    fn test_order_item_kinds() {
        let items = order_items("SELECT a, b FROM t ORDER BY 2 DESC, o.user_id, a + b NULLS FIRST");
        assert_eq!(items[0].kind, OrderByItemKind::Index(2));
        assert_eq!(items[0].index, Some(2));
        assert_eq!(items[0].direction, OrderDirection::Desc);
        assert_eq!(
            items[1].kind,
            OrderByItemKind::Column {
                owner: Some("o".to_string()),
                name: "user_id".to_string()
            }
        );
        assert_eq!(items[1].start, Some(36));
        assert_eq!(items[1].name(), "user_id");
        assert_eq!(items[2].kind, OrderByItemKind::Expression);
        assert_eq!(items[2].text, "a + b");
        assert_eq!(items[2].nulls_order, Some(NullsOrder::First));
    }

    #[test]
    fn test_same_group_by_and_order_by() {
        let order = OrderByContext {
            items: order_items("SELECT a FROM t ORDER BY a, b"),
            generated: false,
        };
        let group = GroupByContext {
            items: order_items("SELECT a FROM t ORDER BY A, b"),
        };
        assert!(is_same_group_by_and_order_by_items(&group, &order));

        let desc = OrderByContext {
            items: order_items("SELECT a FROM t ORDER BY a DESC, b"),
            generated: false,
        };
        assert!(!is_same_group_by_and_order_by_items(&group, &desc));
        assert!(!is_same_group_by_and_order_by_items(&GroupByContext::default(), &OrderByContext::default()));
    }
}

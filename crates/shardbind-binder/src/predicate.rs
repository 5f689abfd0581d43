//! Predicate normalization
//!
//! Predicates are flattened into disjunctive normal form: a list of AND
//! groups, any of which may hold. Leaves are borrowed from the statement.
//!
//! Distributing AND over OR multiplies group counts, so normalization stops
//! with `None` once a form would exceed `MAX_AND_GROUPS`.

use sqlparser::ast as sql;

/// Largest DNF the extractor will build
pub(crate) const MAX_AND_GROUPS: usize = 1024;

/// One conjunction of predicate leaves
pub(crate) type AndGroup<'a> = Vec<&'a sql::Expr>;

/// DNF of a single predicate tree
pub(crate) fn to_dnf(expr: &sql::Expr) -> Option<Vec<AndGroup<'_>>> {
    match expr {
        sql::Expr::Nested(inner) => to_dnf(inner),
        sql::Expr::BinaryOp {
            left,
            op: sql::BinaryOperator::Or,
            right,
        } => {
            let mut groups = to_dnf(left)?;
            let right = to_dnf(right)?;
            if groups.len() + right.len() > MAX_AND_GROUPS {
                return None;
            }
            groups.extend(right);
            Some(groups)
        }
        sql::Expr::BinaryOp {
            left,
            op: sql::BinaryOperator::And,
            right,
        } => cross(to_dnf(left)?, to_dnf(right)?),
        leaf => Some(vec![vec![leaf]]),
    }
}

/// DNF of the conjunction of several predicate trees (WHERE plus join ON clauses)
pub(crate) fn conjunction_dnf<'a>(exprs: &[&'a sql::Expr]) -> Option<Vec<AndGroup<'a>>> {
    let mut groups = vec![Vec::new()];
    for expr in exprs {
        groups = cross(groups, to_dnf(expr)?)?;
    }
    Some(groups.into_iter().filter(|group| !group.is_empty()).collect())
}

/// Every leaf of a predicate tree, left to right
pub(crate) fn leaves(expr: &sql::Expr) -> Vec<&sql::Expr> {
    match expr {
        sql::Expr::Nested(inner) => leaves(inner),
        sql::Expr::BinaryOp {
            left,
            op: sql::BinaryOperator::Or | sql::BinaryOperator::And,
            right,
        } => {
            let mut result = leaves(left);
            result.extend(leaves(right));
            result
        }
        leaf => vec![leaf],
    }
}

fn cross<'a>(left: Vec<AndGroup<'a>>, right: Vec<AndGroup<'a>>) -> Option<Vec<AndGroup<'a>>> {
    let size = left.len().checked_mul(right.len())?;
    if size > MAX_AND_GROUPS {
        return None;
    }
    let mut groups = Vec::with_capacity(size);
    for l in &left {
        for r in &right {
            let mut group = l.clone();
            group.extend(r.iter().copied());
            groups.push(group);
        }
    }
    Some(groups)
}

//! Parameter marker numbering
//!
//! Positional markers (`?`) carry no index in the AST. They are rewritten to
//! numbered markers (`$1`, `$2`, ...) in the order they appear in the text,
//! so every later stage can read the parameter index straight off the marker.
//! Markers that already carry a number (`$3`, `?3`) keep it.
//!
//! The AST visitor does not walk expressions in text order (a CASE visits all
//! of its conditions before its results, a LIMIT visits the row count before a
//! leading offset), and placeholder values carry no location. So the text is
//! numbered at the token level first and parsed again: both trees have the
//! same shape, which lines their markers up in visit order.

use shardbind_common::{Error, Result};
use sqlparser::ast::{Expr, Statement, Value, VisitMut, VisitorMut};
use sqlparser::dialect::Dialect;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::{Token, Tokenizer};
use std::ops::ControlFlow;

use crate::source::SourceText;

/// Zero-based parameter index of a marker, if it carries a number
pub fn parameter_index(marker: &str) -> Option<usize> {
    let digits = marker.strip_prefix('$').or_else(|| marker.strip_prefix('?'))?;
    match digits.parse::<usize>() {
        Ok(n) if n > 0 => Some(n - 1),
        _ => None,
    }
}

/// Number the positional markers of a statement, returning the parameter count
pub fn number_parameter_markers(
    statement: &mut Statement,
    dialect: &dyn Dialect,
    sql: &str,
) -> Result<usize> {
    let numbers = match numbered_text(dialect, sql)? {
        Some(text) => text_order_numbers(dialect, &text)?,
        None => Vec::new(),
    };
    let mut numbering = MarkerNumbering {
        numbers: numbers.into_iter(),
        count: 0,
    };
    let _ = statement.visit(&mut numbering);
    Ok(numbering.count)
}

/// The statement text with every positional marker replaced by `?n`, `n`
/// counting positional markers left to right. `None` when there are none.
fn numbered_text(dialect: &dyn Dialect, sql: &str) -> Result<Option<String>> {
    let tokens = Tokenizer::new(dialect, sql)
        .tokenize_with_location()
        .map_err(|e| Error::Parse(e.to_string()))?;
    let source = SourceText::new(sql);

    let mut text = String::with_capacity(sql.len() + 8);
    let mut copied = 0;
    let mut next = 0;
    for token in &tokens {
        if !matches!(&token.token, Token::Placeholder(marker) if marker == "?") {
            continue;
        }
        let start = source.offset(token.span.start).ok_or_else(|| {
            Error::Internal(format!("parameter marker outside the text at {:?}", token.span.start))
        })?;
        next += 1;
        text.push_str(&sql[copied..start]);
        text.push_str(&format!("?{}", next));
        copied = start + 1;
    }
    if next == 0 {
        return Ok(None);
    }
    text.push_str(&sql[copied..]);
    Ok(Some(text))
}

/// Marker numbers of a numbered text, in the order the visitor meets them
fn text_order_numbers(dialect: &dyn Dialect, text: &str) -> Result<Vec<Option<usize>>> {
    let mut statements = Parser::parse_sql(dialect, text).map_err(|e| Error::Parse(e.to_string()))?;
    let mut collector = MarkerCollector::default();
    for statement in statements.iter_mut() {
        let _ = statement.visit(&mut collector);
    }
    Ok(collector.markers)
}

#[derive(Default)]
struct MarkerCollector {
    markers: Vec<Option<usize>>,
}

impl VisitorMut for MarkerCollector {
    type Break = ();

    fn post_visit_expr(&mut self, expr: &mut Expr) -> ControlFlow<Self::Break> {
        if let Expr::Value(Value::Placeholder(marker)) = expr {
            self.markers.push(parameter_index(marker));
        }
        ControlFlow::Continue(())
    }
}

struct MarkerNumbering {
    /// Index of every marker of the numbered text, in visit order
    numbers: std::vec::IntoIter<Option<usize>>,
    count: usize,
}

impl VisitorMut for MarkerNumbering {
    type Break = ();

    fn post_visit_expr(&mut self, expr: &mut Expr) -> ControlFlow<Self::Break> {
        if let Expr::Value(Value::Placeholder(marker)) = expr {
            let numbered = self.numbers.next().flatten();
            // named markers (`:name`) stay as written
            let index = match parameter_index(marker) {
                Some(index) => Some(index),
                None => {
                    if let Some(index) = numbered {
                        *marker = format!("${}", index + 1);
                    }
                    numbered
                }
            };
            if let Some(index) = index {
                self.count = self.count.max(index + 1);
            }
        }
        ControlFlow::Continue(())
    }
}

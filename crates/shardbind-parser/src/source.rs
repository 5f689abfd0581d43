//! Byte offsets into the statement text
//!
//! The parser reports 1-based line/column locations counted in characters.
//! Rewriting works on byte offsets into the original text, so every location
//! the binder records goes through `SourceText`.

use sqlparser::tokenizer::{Location, Span};
use std::ops::Range;

pub struct SourceText<'a> {
    sql: &'a str,
    /// Byte offset of the first character of each line
    line_starts: Vec<usize>,
}

impl<'a> SourceText<'a> {
    pub fn new(sql: &'a str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(sql.match_indices('\n').map(|(i, _)| i + 1));
        SourceText { sql, line_starts }
    }

    pub fn sql(&self) -> &'a str {
        self.sql
    }

    /// Byte offset of a location; `None` for the empty location or one past the text
    pub fn offset(&self, location: Location) -> Option<usize> {
        if location.line == 0 || location.column == 0 {
            return None;
        }
        let line_start = *self.line_starts.get(location.line as usize - 1)?;
        let line_end = self
            .line_starts
            .get(location.line as usize)
            .map(|next| next - 1)
            .unwrap_or(self.sql.len());
        let line = &self.sql[line_start..line_end];
        let column = location.column as usize - 1;
        match line.char_indices().nth(column) {
            Some((i, _)) => Some(line_start + i),
            // the end of a span may point just past the last character
            None if column == line.chars().count() => Some(line_end),
            None => None,
        }
    }

    /// Byte range covered by a span
    pub fn range(&self, span: Span) -> Option<Range<usize>> {
        let start = self.offset(span.start)?;
        let end = self.offset(span.end)?;
        (start <= end).then_some(start..end)
    }

    pub fn slice(&self, span: Span) -> Option<&'a str> {
        self.range(span).map(|range| &self.sql[range])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(line: u64, column: u64) -> Location {
        Location { line, column }
    }

    #[test]
    fn test_offset_single_line() {
        let source = SourceText::new("SELECT id FROM t_order");
        assert_eq!(source.offset(loc(1, 1)), Some(0));
        assert_eq!(source.offset(loc(1, 16)), Some(15));
        assert_eq!(source.offset(loc(1, 23)), Some(22));
        assert_eq!(source.offset(loc(1, 24)), None);
        assert_eq!(source.offset(loc(0, 0)), None);
    }

    #[test]
    fn test_offset_multi_line_and_multibyte() {
        let sql = "SELECT 'é'\nFROM t";
        let source = SourceText::new(sql);
        assert_eq!(source.offset(loc(2, 6)), Some(sql.find('t').unwrap()));
        let span = Span::new(loc(2, 6), loc(2, 7));
        assert_eq!(source.slice(span), Some("t"));
    }
}

//! shardbind parser - SQL parsing front end
//!
//! This crate wraps sqlparser-rs and prepares its output for binding:
//! - picks the dialect of the configured database type
//! - numbers positional parameter markers in text order
//! - converts parser locations into byte offsets of the original text

mod dialect;
mod placeholder;
mod source;

pub use dialect::DatabaseType;
pub use placeholder::{number_parameter_markers, parameter_index};
pub use source::SourceText;

use shardbind_common::{Error, Result};
use sqlparser::ast::Statement;
use sqlparser::parser::Parser;
use tracing::trace;

/// A parsed statement together with the text it came from
#[derive(Debug, Clone)]
pub struct ParsedStatement {
    /// The original statement text; every recorded offset points into it
    pub sql: String,
    /// Statement with positional markers rewritten to numbered ones
    pub statement: Statement,
    /// Number of bind parameters the statement expects
    pub parameter_count: usize,
    pub database_type: DatabaseType,
}

/// Parse a SQL string into a list of statements
pub fn parse_sql(sql: &str, database_type: DatabaseType) -> Result<Vec<Statement>> {
    let dialect = database_type.dialect();
    Parser::parse_sql(dialect.as_ref(), sql).map_err(|e| Error::Parse(e.to_string()))
}

/// Parse a single SQL statement and number its parameter markers
pub fn parse_statement(sql: &str, database_type: DatabaseType) -> Result<ParsedStatement> {
    let dialect = database_type.dialect();
    let mut statements =
        Parser::parse_sql(dialect.as_ref(), sql).map_err(|e| Error::Parse(e.to_string()))?;
    if statements.len() != 1 {
        return Err(Error::Parse(format!(
            "Expected 1 statement, got {}",
            statements.len()
        )));
    }
    let mut statement = statements.remove(0);
    let parameter_count = number_parameter_markers(&mut statement, dialect.as_ref(), sql)?;
    trace!(parameter_count, %database_type, "statement parsed");

    Ok(ParsedStatement {
        sql: sql.to_string(),
        statement,
        parameter_count,
        database_type,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_select() {
        let result = parse_sql("SELECT 1", DatabaseType::MySql);
        assert!(result.is_ok());
        assert_eq!(result.unwrap().len(), 1);
    }

    #[test]
    fn test_parse_multiple_statements() {
        let result = parse_sql("SELECT 1; SELECT 2", DatabaseType::Generic);
        assert_eq!(result.unwrap().len(), 2);
    }

    #[test]
    fn test_parse_statement_rejects_multiple() {
        let result = parse_statement("SELECT 1; SELECT 2", DatabaseType::MySql);
        assert!(matches!(result, Err(Error::Parse(_))));
    }

    #[test]
    fn test_parse_statement_counts_parameters() {
        let parsed =
            parse_statement("INSERT INTO t (a, b) VALUES (?, ?), (?, 1)", DatabaseType::MySql)
                .unwrap();
        assert_eq!(parsed.parameter_count, 3);
        assert_eq!(parsed.sql, "INSERT INTO t (a, b) VALUES (?, ?), (?, 1)");
    }

    #[test]
    fn test_parse_error() {
        let result = parse_statement("SELECT * FORM users", DatabaseType::MySql);
        assert!(result.is_err());
    }
}

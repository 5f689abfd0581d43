//! Error types for shardbind

use thiserror::Error;

/// The main error type for binding operations
#[derive(Error, Debug)]
pub enum Error {
    // Parser errors
    #[error("Parse error: {0}")]
    Parse(String),

    // Metadata errors
    #[error("No database selected")]
    NoDatabaseSelected,

    #[error("Unknown database: {0}")]
    UnknownDatabase(String),

    #[error("Table already exists: {0}")]
    TableAlreadyExists(String),

    // Binder errors
    #[error("Column count doesn't match value count at row {row}: expected {expected}, got {actual}")]
    InsertValueCountMismatch {
        row: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Can't find index: {0}, please add alias for aggregate selections")]
    CannotFindIndex(String),

    #[error("Unsupported expression: {0}")]
    UnsupportedExpression(String),

    #[error("Parameter index {index} out of range, {count} parameters bound")]
    ParameterOutOfRange { index: usize, count: usize },

    // Rule errors
    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    // General errors
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using shardbind's Error
pub type Result<T> = std::result::Result<T, Error>;

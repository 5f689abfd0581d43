//! shardbind common - types shared across all crates
//!
//! This crate provides the foundational types used throughout shardbind:
//! - `LogicalType`: column types recorded in the catalog
//! - `Value`: literal and bind-parameter values
//! - `Error`: unified error type

pub mod error;
pub mod types;
pub mod value;

pub use error::{Error, Result};
pub use types::LogicalType;
pub use value::Value;

//! Query construction and execution.
//!
//! `builder` renders declarative specs as SQL; `executor` runs SQL end to end
//! and reports the result.

pub mod builder;
pub mod executor;

pub use builder::{
    quote_string_literal, quote_table_identifier, Direction, FilterValue, QueryBuilder, QuerySpec,
    TableRef,
};
pub use executor::{QueryExecutor, QueryOutcome, RunOptions};

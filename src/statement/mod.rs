//! Statement classification.
//!
//! Decides whether submitted SQL returns rows or modifies data, which selects
//! how the finished job is reported.

mod classifier;

pub use classifier::{classify_sql, StatementClassifier};

use std::fmt;

/// Kind of data-manipulation statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DmlKind {
    Insert,
    Update,
    Delete,
    Merge,
}

impl fmt::Display for DmlKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Insert => write!(f, "INSERT"),
            Self::Update => write!(f, "UPDATE"),
            Self::Delete => write!(f, "DELETE"),
            Self::Merge => write!(f, "MERGE"),
        }
    }
}

/// What a SQL text does once submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    /// Returns a result set.
    Query,
    /// Modifies rows; the job reports row counts instead of rows.
    Dml(DmlKind),
    /// DDL, scripting and anything else the parser understood.
    Other,
    /// The local parser rejected it. The remote service decides.
    Unparsed,
}

impl StatementKind {
    /// Returns true for data-manipulation statements.
    pub fn is_dml(&self) -> bool {
        matches!(self, Self::Dml(_))
    }

    /// Returns true if resubmitting the statement could change data twice.
    pub fn is_idempotent(&self) -> bool {
        matches!(self, Self::Query)
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Query => write!(f, "QUERY"),
            Self::Dml(kind) => write!(f, "{}", kind),
            Self::Other => write!(f, "OTHER"),
            Self::Unparsed => write!(f, "UNPARSED"),
        }
    }
}

//! SQL construction from declarative query specifications.
//!
//! A [`QuerySpec`] names a target table, a projection, equality filters and
//! an ordering. [`QueryBuilder::build`] renders it as a single SELECT
//! statement in the BigQuery standard SQL dialect. Rendering never fails:
//! a malformed spec produces malformed SQL, which the remote service rejects.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{ReportError, Result};

/// Column and field identifiers, optionally qualified by a table alias.
static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*$")
        .expect("identifier pattern is valid")
});

/// Table paths: `table`, `dataset.table` or `project.dataset.table`.
/// Project ids may contain dashes.
static TABLE_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_-]+(\.[A-Za-z0-9_-]+){0,2}$").expect("table pattern is valid")
});

/// Sort direction for the ORDER BY clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    /// Returns the SQL keyword for this direction.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            _ => Err(format!("Invalid direction: {s}. Expected: asc or desc")),
        }
    }
}

/// A fully-qualified warehouse table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub project: Option<String>,
    pub dataset: String,
    pub table: String,
}

impl TableRef {
    /// Creates a table reference in the given project.
    pub fn new(
        project: impl Into<String>,
        dataset: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            project: Some(project.into()),
            dataset: dataset.into(),
            table: table.into(),
        }
    }

    /// Parses `project.dataset.table` or `dataset.table`.
    ///
    /// Surrounding backticks are accepted and stripped.
    pub fn parse(path: &str) -> Result<Self> {
        let trimmed = path.trim().trim_matches('`');
        let parts: Vec<&str> = trimmed.split('.').collect();

        if parts.iter().any(|p| p.is_empty()) {
            return Err(ReportError::config(format!("Invalid table path: '{path}'")));
        }

        match parts.as_slice() {
            [dataset, table] => Ok(Self {
                project: None,
                dataset: dataset.to_string(),
                table: table.to_string(),
            }),
            [project, dataset, table] => Ok(Self::new(*project, *dataset, *table)),
            _ => Err(ReportError::config(format!(
                "Invalid table path: '{path}'. Expected dataset.table or project.dataset.table"
            ))),
        }
    }

    /// Resolves a table given either as a bare name within `dataset` or as a
    /// dotted path.
    pub fn from_parts(dataset: Option<&str>, table: &str) -> Result<Self> {
        match dataset {
            Some(dataset) if !table.contains('.') => Ok(Self {
                project: None,
                dataset: dataset.to_string(),
                table: table.to_string(),
            }),
            _ => Self::parse(table),
        }
    }

    /// Fills in the project if none was given.
    pub fn with_default_project(mut self, project: Option<&str>) -> Self {
        if self.project.is_none() {
            self.project = project.map(String::from);
        }
        self
    }

    /// Returns the dotted path without quoting.
    pub fn qualified_name(&self) -> String {
        match &self.project {
            Some(project) => format!("{}.{}.{}", project, self.dataset, self.table),
            None => format!("{}.{}", self.dataset, self.table),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&quote_table_identifier(&self.qualified_name()))
    }
}

/// The right-hand side of an equality filter.
///
/// `Raw` values are inserted verbatim: the caller is responsible for quoting
/// them as SQL literals (e.g. `'EM'`). The typed variants are quoted and
/// escaped by the builder.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Raw(String),
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Timestamp(DateTime<Utc>),
}

impl FilterValue {
    /// Creates a pre-quoted literal that is inserted verbatim.
    pub fn raw(literal: impl Into<String>) -> Self {
        Self::Raw(literal.into())
    }

    /// Creates a string literal that will be quoted and escaped.
    pub fn string(value: impl Into<String>) -> Self {
        Self::String(value.into())
    }

    /// Renders this value as a SQL literal.
    pub fn to_sql_literal(&self) -> String {
        match self {
            Self::Raw(s) => s.clone(),
            Self::String(s) => quote_string_literal(s),
            Self::Int(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Bool(true) => "TRUE".to_string(),
            Self::Bool(false) => "FALSE".to_string(),
            Self::Timestamp(ts) => format!(
                "TIMESTAMP '{}'",
                ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
            ),
        }
    }
}

impl From<i64> for FilterValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for FilterValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for FilterValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<DateTime<Utc>> for FilterValue {
    fn from(v: DateTime<Utc>) -> Self {
        Self::Timestamp(v)
    }
}

/// Config representation: bare strings are raw literals, scalars map to their
/// typed variants, and `{ string = ".." }` / `{ timestamp = ".." }` request
/// explicit quoting.
#[derive(Deserialize)]
#[serde(untagged)]
enum FilterValueRepr {
    Bool(bool),
    Int(i64),
    Float(f64),
    Raw(String),
    Typed(TypedLiteral),
}

#[derive(Deserialize)]
#[serde(rename_all = "lowercase")]
enum TypedLiteral {
    String(String),
    Timestamp(DateTime<Utc>),
}

impl<'de> Deserialize<'de> for FilterValue {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match FilterValueRepr::deserialize(deserializer)? {
            FilterValueRepr::Bool(b) => Self::Bool(b),
            FilterValueRepr::Int(i) => Self::Int(i),
            FilterValueRepr::Float(f) => Self::Float(f),
            FilterValueRepr::Raw(s) => Self::Raw(s),
            FilterValueRepr::Typed(TypedLiteral::String(s)) => Self::String(s),
            FilterValueRepr::Typed(TypedLiteral::Timestamp(ts)) => Self::Timestamp(ts),
        })
    }
}

/// Declarative description of a SELECT query.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QuerySpec {
    /// Table name or dotted path; quoted by the builder when qualified.
    pub target_table: String,
    /// Projection. Empty means `*`.
    pub columns: Vec<String>,
    /// Equality filters, AND-combined, rendered in key order.
    pub filters: BTreeMap<String, FilterValue>,
    /// Ordering fields. Empty omits the ORDER BY clause entirely.
    pub order_by: Vec<String>,
    pub direction: Direction,
    pub limit: u64,
}

impl QuerySpec {
    /// Creates a spec selecting all columns from the given table.
    pub fn new(target_table: impl Into<String>) -> Self {
        Self {
            target_table: target_table.into(),
            ..Default::default()
        }
    }

    /// Sets the projected columns.
    pub fn with_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Adds an equality filter.
    pub fn with_filter(mut self, column: impl Into<String>, value: FilterValue) -> Self {
        self.filters.insert(column.into(), value);
        self
    }

    /// Sets the ordering fields, direction and row limit.
    pub fn with_order<I, S>(mut self, fields: I, direction: Direction, limit: u64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.order_by = fields.into_iter().map(Into::into).collect();
        self.direction = direction;
        self.limit = limit;
        self
    }

    /// Checks that the table, columns, filter keys and ordering fields are
    /// valid identifiers.
    pub fn validate(&self) -> Result<()> {
        let table = self.target_table.trim();
        let quoted = table.len() > 1 && table.starts_with('`') && table.ends_with('`');
        if !quoted && !TABLE_PATH.is_match(table) {
            return Err(ReportError::config(format!(
                "Invalid table identifier: '{}'",
                self.target_table
            )));
        }

        let fields = self
            .columns
            .iter()
            .map(|c| ("column", c))
            .chain(self.filters.keys().map(|k| ("filter", k)))
            .chain(self.order_by.iter().map(|o| ("order_by", o)));

        for (kind, name) in fields {
            if !IDENTIFIER.is_match(name) {
                return Err(ReportError::config(format!(
                    "Invalid {kind} identifier: '{name}'"
                )));
            }
        }

        Ok(())
    }
}

/// Renders [`QuerySpec`]s as SQL.
pub struct QueryBuilder;

impl QueryBuilder {
    /// Builds the SELECT statement for a spec.
    pub fn build(spec: &QuerySpec) -> String {
        let mut sql = format!(
            "SELECT {} FROM {}",
            render_projection(&spec.columns),
            quote_table_identifier(&spec.target_table)
        );

        if !spec.filters.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&render_filters(&spec.filters));
        }

        if !spec.order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&render_order_by(&spec.order_by, spec.direction, spec.limit));
        }

        sql
    }
}

/// Wraps a dotted table path in backticks.
///
/// Unqualified names and already-quoted paths are returned unchanged.
pub fn quote_table_identifier(name: &str) -> String {
    let name = name.trim();
    if name.len() > 1 && name.starts_with('`') && name.ends_with('`') {
        return name.to_string();
    }
    if !name.contains('.') {
        return name.to_string();
    }
    format!("`{}`", name.replace('`', "\\`"))
}

/// Quotes a string as a single-quoted literal with backslash escapes.
pub fn quote_string_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(ch),
        }
    }
    out.push('\'');
    out
}

fn render_projection(columns: &[String]) -> String {
    if columns.is_empty() {
        "*".to_string()
    } else {
        columns.join(",")
    }
}

fn render_filters(filters: &BTreeMap<String, FilterValue>) -> String {
    filters
        .iter()
        .map(|(key, value)| format!("{}={}", key, value.to_sql_literal()))
        .collect::<Vec<_>>()
        .join(" AND ")
}

fn render_order_by(fields: &[String], direction: Direction, limit: u64) -> String {
    format!("{} {} LIMIT {}", fields.join(","), direction, limit)
}

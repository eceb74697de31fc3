//! SQL parsing with the BigQuery dialect.

use sqlparser::ast::{Query, Select, SetExpr, Statement, TableFactor, TableWithJoins};
use sqlparser::dialect::BigQueryDialect;
use sqlparser::parser::Parser;
use tracing::debug;

use super::{DmlKind, StatementKind};

/// Parses SQL and reports its [`StatementKind`].
#[derive(Debug)]
pub struct StatementClassifier {
    dialect: BigQueryDialect,
}

impl Default for StatementClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl StatementClassifier {
    pub fn new() -> Self {
        Self {
            dialect: BigQueryDialect {},
        }
    }

    /// Classifies a SQL string.
    ///
    /// Scripts with several statements take the kind of the last one, which is
    /// what the job's result reflects.
    pub fn classify(&self, sql: &str) -> StatementKind {
        let statements = match Parser::parse_sql(&self.dialect, sql) {
            Ok(statements) => statements,
            Err(e) => {
                debug!(error = %e, "SQL did not parse locally");
                return StatementKind::Unparsed;
            }
        };

        statements
            .last()
            .map(classify_statement)
            .unwrap_or(StatementKind::Unparsed)
    }
}

/// Classifies SQL without creating a classifier instance.
pub fn classify_sql(sql: &str) -> StatementKind {
    StatementClassifier::new().classify(sql)
}

fn classify_statement(statement: &Statement) -> StatementKind {
    match statement {
        Statement::Query(query) => classify_query(query),
        Statement::Insert(_) => StatementKind::Dml(DmlKind::Insert),
        Statement::Update { .. } => StatementKind::Dml(DmlKind::Update),
        Statement::Delete(_) => StatementKind::Dml(DmlKind::Delete),
        Statement::Merge { .. } => StatementKind::Dml(DmlKind::Merge),
        _ => StatementKind::Other,
    }
}

/// A query is DML if any CTE or nested relation modifies data.
fn classify_query(query: &Query) -> StatementKind {
    if let Some(with) = &query.with {
        for cte in &with.cte_tables {
            if let kind @ StatementKind::Dml(_) = classify_query(&cte.query) {
                return kind;
            }
        }
    }
    classify_set_expr(&query.body)
}

fn classify_set_expr(set_expr: &SetExpr) -> StatementKind {
    match set_expr {
        SetExpr::Insert(stmt) | SetExpr::Update(stmt) => classify_statement(stmt),
        SetExpr::Query(query) => classify_query(query),
        SetExpr::Select(select) => classify_select(select),
        SetExpr::SetOperation { left, right, .. } => match classify_set_expr(left) {
            kind @ StatementKind::Dml(_) => kind,
            _ => classify_set_expr(right),
        },
        _ => StatementKind::Query,
    }
}

fn classify_select(select: &Select) -> StatementKind {
    select
        .from
        .iter()
        .map(classify_table_with_joins)
        .find(StatementKind::is_dml)
        .unwrap_or(StatementKind::Query)
}

fn classify_table_with_joins(twj: &TableWithJoins) -> StatementKind {
    std::iter::once(&twj.relation)
        .chain(twj.joins.iter().map(|join| &join.relation))
        .map(classify_table_factor)
        .find(StatementKind::is_dml)
        .unwrap_or(StatementKind::Query)
}

fn classify_table_factor(factor: &TableFactor) -> StatementKind {
    match factor {
        TableFactor::Derived { subquery, .. } => classify_query(subquery),
        TableFactor::NestedJoin {
            table_with_joins, ..
        } => classify_table_with_joins(table_with_joins),
        _ => StatementKind::Query,
    }
}

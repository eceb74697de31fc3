//! Streaming inserts through `tabledata.insertAll`.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::error::{ReportError, Result};
use crate::query::TableRef;
use crate::warehouse::{InsertAllRequest, InsertRow, QueryService};

/// Rows to stream into one table.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertRequest {
    pub table: TableRef,
    pub rows: Vec<Map<String, Value>>,
    pub skip_invalid_rows: bool,
    pub ignore_unknown_values: bool,
}

impl InsertRequest {
    pub fn new(table: TableRef) -> Self {
        Self {
            table,
            rows: Vec::new(),
            skip_invalid_rows: false,
            ignore_unknown_values: false,
        }
    }

    pub fn with_row(mut self, row: Map<String, Value>) -> Self {
        self.rows.push(row);
        self
    }

    /// Parses a row given as a JSON object, e.g. `{"id": 1, "name": "carrot"}`.
    pub fn parse_row(json: &str) -> Result<Map<String, Value>> {
        match serde_json::from_str(json) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(other) => Err(ReportError::config(format!(
                "Row must be a JSON object, got: {other}"
            ))),
            Err(e) => Err(ReportError::config(format!("Invalid row JSON '{json}': {e}"))),
        }
    }
}

/// Errors for one rejected row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowError {
    /// Position of the row in the request.
    pub index: u64,
    pub messages: Vec<String>,
}

/// Outcome of a streaming insert.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertSummary {
    pub table: TableRef,
    pub attempted: usize,
    pub row_errors: Vec<RowError>,
}

impl InsertSummary {
    pub fn new(table: TableRef, attempted: usize, row_errors: Vec<RowError>) -> Self {
        Self {
            table,
            attempted,
            row_errors,
        }
    }

    pub fn is_success(&self) -> bool {
        self.row_errors.is_empty()
    }

    /// Returns the attempted row count, or `InsertRejected` if any row failed.
    pub fn into_result(self) -> Result<usize> {
        let Some(first) = self.row_errors.first() else {
            return Ok(self.attempted);
        };
        Err(ReportError::InsertRejected {
            failed_rows: self.row_errors.len(),
            details: format!("entry {}: {}", first.index, first.messages.join("; ")),
        })
    }
}

/// Streams rows into tables.
#[derive(Clone)]
pub struct StreamingInserter {
    service: Arc<dyn QueryService>,
}

impl StreamingInserter {
    pub fn new(service: Arc<dyn QueryService>) -> Self {
        Self { service }
    }

    /// Sends all rows in one `insertAll` call.
    pub async fn insert(&self, request: InsertRequest) -> Result<InsertSummary> {
        if request.rows.is_empty() {
            return Err(ReportError::invalid_state(format!(
                "no rows to insert into {}",
                request.table
            )));
        }

        let attempted = request.rows.len();
        let wire = InsertAllRequest {
            rows: request
                .rows
                .into_iter()
                .map(|json| InsertRow {
                    insert_id: None,
                    json,
                })
                .collect(),
            skip_invalid_rows: request.skip_invalid_rows,
            ignore_unknown_values: request.ignore_unknown_values,
        };

        info!(table = %request.table, rows = attempted, "Streaming insert");
        let response = self.service.insert_rows(&request.table, &wire).await?;

        let row_errors: Vec<RowError> = response
            .insert_errors
            .into_iter()
            .map(|e| RowError {
                index: e.index,
                messages: e.errors.iter().map(|p| p.describe()).collect(),
            })
            .collect();

        if !row_errors.is_empty() {
            warn!(table = %request.table, failed = row_errors.len(), "Rows rejected");
        }

        Ok(InsertSummary::new(request.table, attempted, row_errors))
    }
}

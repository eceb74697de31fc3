//! Lazy, forward-only reading of a finished job's result set.

use std::collections::VecDeque;
use std::sync::Arc;

use futures::stream::{self, BoxStream, StreamExt};
use tracing::debug;

use super::value::{decode_cell, Scalar, ScalarType, WireType};
use crate::error::{ReportError, Result};
use crate::job::{Job, JobStatus};
use crate::warehouse::{FieldSchema, QueryService, ResultPage, WireRow};

/// Expected types for some or all result columns.
///
/// Names match case-insensitively. Columns not named here keep their
/// inferred type, and output order always follows the result schema.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowSchema {
    columns: Vec<(String, ScalarType)>,
}

impl RowSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a column expectation.
    pub fn with_column(mut self, name: impl Into<String>, ty: ScalarType) -> Self {
        self.columns.push((name.into(), ty));
        self
    }

    /// Returns the expected type of a column.
    pub fn expected(&self, name: &str) -> Option<ScalarType> {
        self.columns
            .iter()
            .find(|(column, _)| column.eq_ignore_ascii_case(name))
            .map(|(_, ty)| *ty)
    }

    pub fn names(&self) -> Vec<String> {
        self.columns.iter().map(|(name, _)| name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl FromIterator<(String, ScalarType)> for RowSchema {
    fn from_iter<I: IntoIterator<Item = (String, ScalarType)>>(iter: I) -> Self {
        Self {
            columns: iter.into_iter().collect(),
        }
    }
}

/// One decoded record, as ordered (column, value) pairs.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRow {
    fields: Vec<(String, Scalar)>,
}

impl ResultRow {
    pub fn new(fields: Vec<(String, Scalar)>) -> Self {
        Self { fields }
    }

    /// Returns the value of a column.
    pub fn get(&self, column: &str) -> Option<&Scalar> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    /// Values in column order.
    pub fn values(&self) -> impl Iterator<Item = &Scalar> {
        self.fields.iter().map(|(_, value)| value)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Column name, position in the wire row, and target type.
#[derive(Debug, Clone)]
struct ColumnPlan {
    name: String,
    index: usize,
    ty: ScalarType,
}

/// Opens result sets for finished jobs.
#[derive(Clone)]
pub struct ResultReader {
    service: Arc<dyn QueryService>,
}

impl ResultReader {
    pub fn new(service: Arc<dyn QueryService>) -> Self {
        Self { service }
    }

    /// Opens the result set of a successfully finished job.
    ///
    /// Fails with `InvalidState` (without contacting the service) unless the
    /// job is `Done`. The first page is fetched here and its schema checked
    /// against `schema`; with no schema, types are inferred.
    pub async fn rows(&self, job: Job, schema: Option<RowSchema>) -> Result<ResultSet> {
        if job.status != JobStatus::Done {
            return Err(ReportError::invalid_state(format!(
                "cannot read results of job {} in state '{}'",
                job.id(),
                job.status
            )));
        }

        let page = self.service.fetch_page(&job.reference, None).await?;
        if !page.job_complete {
            return Err(ReportError::invalid_state(format!(
                "job {} has no results available yet",
                job.id()
            )));
        }

        let fields = page.schema.as_ref().map(|s| s.fields.as_slice()).unwrap_or(&[]);
        let plan = match &schema {
            Some(expected) => plan_expected(expected, fields)?,
            None => plan_inferred(fields),
        };

        debug!(
            job_id = %job.id(),
            columns = plan.len(),
            total_rows = ?page.total_rows,
            "Opened result set"
        );

        Ok(ResultSet::open(self.service.clone(), job, plan, page))
    }
}

fn plan_inferred(fields: &[FieldSchema]) -> Vec<ColumnPlan> {
    fields
        .iter()
        .enumerate()
        .map(|(index, field)| ColumnPlan {
            name: field.name.clone(),
            index,
            ty: WireType::of(field).inferred(),
        })
        .collect()
}

/// Keeps every result column in result order. Columns named in `expected`
/// must exist and be compatible; the rest keep their inferred type.
fn plan_expected(expected: &RowSchema, fields: &[FieldSchema]) -> Result<Vec<ColumnPlan>> {
    if let Some((name, _)) = expected
        .columns
        .iter()
        .find(|(name, _)| !fields.iter().any(|f| f.name.eq_ignore_ascii_case(name)))
    {
        return Err(ReportError::MissingColumn(name.clone()));
    }

    fields
        .iter()
        .enumerate()
        .map(|(index, field)| {
            let Some(ty) = expected.expected(&field.name) else {
                return Ok(ColumnPlan {
                    name: field.name.clone(),
                    index,
                    ty: WireType::of(field).inferred(),
                });
            };

            if !ty.accepts(WireType::of(field)) {
                let actual = if field.is_repeated() {
                    format!("REPEATED {}", field.field_type)
                } else {
                    field.field_type.clone()
                };
                return Err(ReportError::type_mismatch(&field.name, ty.as_str(), actual));
            }

            Ok(ColumnPlan {
                name: field.name.clone(),
                index,
                ty,
            })
        })
        .collect()
}

/// A lazy, finite, forward-only sequence of decoded rows.
///
/// Owns the finished job; reading again means submitting again.
pub struct ResultSet {
    service: Arc<dyn QueryService>,
    job: Job,
    plan: Vec<ColumnPlan>,
    buffer: VecDeque<WireRow>,
    next_page: Option<String>,
    total_rows: Option<u64>,
}

impl ResultSet {
    fn open(
        service: Arc<dyn QueryService>,
        job: Job,
        plan: Vec<ColumnPlan>,
        page: ResultPage,
    ) -> Self {
        Self {
            service,
            job,
            plan,
            buffer: page.rows.into(),
            next_page: page.page_token,
            total_rows: page.total_rows,
        }
    }

    /// Column names in output order.
    pub fn columns(&self) -> Vec<String> {
        self.plan.iter().map(|c| c.name.clone()).collect()
    }

    pub fn job(&self) -> &Job {
        &self.job
    }

    /// Total row count reported by the service, if known.
    pub fn total_rows(&self) -> Option<u64> {
        self.total_rows
    }

    /// Returns the next row, fetching the next page when the current one is
    /// drained. `None` once the set is exhausted.
    pub async fn next_row(&mut self) -> Result<Option<ResultRow>> {
        loop {
            if let Some(row) = self.buffer.pop_front() {
                return self.decode(&row).map(Some);
            }

            let Some(token) = self.next_page.take() else {
                return Ok(None);
            };

            debug!(job_id = %self.job.id(), "Fetching next result page");
            let page = self.service.fetch_page(&self.job.reference, Some(token.as_str())).await?;
            self.buffer.extend(page.rows);
            self.next_page = page.page_token;
        }
    }

    /// Converts the set into a stream of rows.
    pub fn into_stream(self) -> BoxStream<'static, Result<ResultRow>> {
        stream::try_unfold(self, |mut set| async move {
            let row = set.next_row().await?;
            Ok::<_, ReportError>(row.map(|row| (row, set)))
        })
        .boxed()
    }

    /// Reads every remaining row into memory.
    pub async fn collect(mut self) -> Result<Vec<ResultRow>> {
        let mut rows = Vec::new();
        while let Some(row) = self.next_row().await? {
            rows.push(row);
        }
        Ok(rows)
    }

    fn decode(&self, row: &WireRow) -> Result<ResultRow> {
        let fields = self
            .plan
            .iter()
            .map(|column| {
                let raw = row
                    .f
                    .get(column.index)
                    .map(|cell| &cell.v)
                    .unwrap_or(&serde_json::Value::Null);
                decode_cell(&column.name, raw, column.ty).map(|value| (column.name.clone(), value))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(ResultRow::new(fields))
    }
}

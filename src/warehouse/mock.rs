//! Mock query service for testing.
//!
//! Provides an in-memory implementation with scripted job outcomes, used by
//! the test suite and by `--mock` runs.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::Deserialize;

use super::{
    DmlStats, ErrorProto, FieldSchema, InsertAllRequest, InsertAllResponse, InsertErrors,
    JobReference, JobStatistics, QueryService, QueryStatistics, RemoteJob, RemoteJobState,
    RemoteJobStatus, ResultPage, TableSchema, WireRow,
};
use crate::error::{ReportError, Result};
use crate::query::TableRef;

const MOCK_PROJECT: &str = "mock-project";
const DEFAULT_PAGE_SIZE: usize = 100;

/// A result table served by the mock.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MockTable {
    pub schema: Vec<FieldSchema>,
    #[serde(default)]
    pub rows: Vec<Vec<serde_json::Value>>,
}

impl MockTable {
    /// Creates an empty table with the given schema.
    pub fn new(schema: Vec<FieldSchema>) -> Self {
        Self {
            schema,
            rows: Vec::new(),
        }
    }

    /// Appends a row of raw wire values.
    pub fn with_row(mut self, values: Vec<serde_json::Value>) -> Self {
        self.rows.push(values);
        self
    }

    /// Creates a STRING column table.
    pub fn single_column(name: &str, values: &[&str]) -> Self {
        let mut table = Self::new(vec![FieldSchema::new(name, "STRING")]);
        for value in values {
            table = table.with_row(vec![serde_json::Value::from(*value)]);
        }
        table
    }

    /// Loads a table fixture from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ReportError::config(format!("Failed to read fixture {}: {e}", path.display()))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            ReportError::config(format!("Invalid fixture {}: {e}", path.display()))
        })
    }
}

/// How a mock job behaves once submitted.
#[derive(Debug, Clone, PartialEq)]
pub enum MockOutcome {
    /// Completes successfully and serves the table.
    Rows(MockTable),
    /// Completes with the given error message.
    Failed(String),
    /// Disappears: waits report it as unknown.
    Vanished,
    /// Never completes.
    Hang,
    /// Completes as a DML statement with the given inserted row count.
    Dml { inserted: i64 },
}

#[derive(Default)]
struct MockState {
    next_id: u64,
    jobs: HashMap<String, MockOutcome>,
    submitted: Vec<String>,
    inserts: Vec<(String, InsertAllRequest)>,
    page_fetches: usize,
}

/// A mock service that returns scripted results.
pub struct MockQueryService {
    rules: Vec<(String, MockOutcome)>,
    fallback: Option<MockOutcome>,
    page_size: usize,
    insert_errors: Vec<InsertErrors>,
    state: Mutex<MockState>,
}

impl MockQueryService {
    /// Creates a mock that echoes each statement back as a one-row result.
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            fallback: None,
            page_size: DEFAULT_PAGE_SIZE,
            insert_errors: Vec::new(),
            state: Mutex::new(MockState::default()),
        }
    }

    /// Adds a rule: statements containing `pattern` (case-insensitive) get
    /// `outcome`. Rules are checked in insertion order.
    pub fn on_sql(mut self, pattern: &str, outcome: MockOutcome) -> Self {
        self.rules.push((pattern.to_lowercase(), outcome));
        self
    }

    /// Sets the outcome for statements no rule matches.
    pub fn with_fallback(mut self, outcome: MockOutcome) -> Self {
        self.fallback = Some(outcome);
        self
    }

    /// Sets the number of rows served per page.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Scripts per-row rejections for streaming inserts.
    pub fn with_insert_errors(mut self, errors: Vec<InsertErrors>) -> Self {
        self.insert_errors = errors;
        self
    }

    /// Returns every statement submitted so far.
    pub fn submitted_sql(&self) -> Vec<String> {
        self.lock().submitted.clone()
    }

    /// Returns how many result pages have been fetched.
    pub fn page_fetches(&self) -> usize {
        self.lock().page_fetches
    }

    /// Returns the streaming insert requests received, keyed by table path.
    pub fn inserts(&self) -> Vec<(String, InsertAllRequest)> {
        self.lock().inserts.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        // A poisoned lock only means another test thread panicked.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn outcome_for(&self, sql: &str) -> MockOutcome {
        let lowered = sql.to_lowercase();
        self.rules
            .iter()
            .find(|(pattern, _)| lowered.contains(pattern.as_str()))
            .map(|(_, outcome)| outcome.clone())
            .or_else(|| self.fallback.clone())
            .unwrap_or_else(|| {
                let echo = format!("Mock result for: {sql}");
                MockOutcome::Rows(MockTable::single_column("result", &[echo.as_str()]))
            })
    }

    fn job_outcome(&self, reference: &JobReference) -> Option<MockOutcome> {
        self.lock().jobs.get(&reference.job_id).cloned()
    }
}

impl Default for MockQueryService {
    fn default() -> Self {
        Self::new()
    }
}

fn remote_job(reference: &JobReference, status: RemoteJobStatus) -> RemoteJob {
    RemoteJob {
        job_reference: reference.clone(),
        status,
        statistics: None,
    }
}

#[async_trait]
impl QueryService for MockQueryService {
    async fn insert_job(&self, sql: &str) -> Result<RemoteJob> {
        let outcome = self.outcome_for(sql);
        let mut state = self.lock();
        state.next_id += 1;
        let job_id = format!("mock_job_{}", state.next_id);
        state.jobs.insert(job_id.clone(), outcome);
        state.submitted.push(sql.to_string());

        let reference = JobReference::new(MOCK_PROJECT, job_id);
        Ok(remote_job(
            &reference,
            RemoteJobStatus {
                state: RemoteJobState::Running,
                ..Default::default()
            },
        ))
    }

    async fn wait_for_job(&self, reference: &JobReference) -> Result<Option<RemoteJob>> {
        let Some(outcome) = self.job_outcome(reference) else {
            return Ok(None);
        };

        let done = RemoteJobStatus {
            state: RemoteJobState::Done,
            ..Default::default()
        };

        match outcome {
            MockOutcome::Vanished => Ok(None),
            MockOutcome::Hang => std::future::pending().await,
            MockOutcome::Failed(message) => Ok(Some(remote_job(
                reference,
                RemoteJobStatus {
                    error_result: Some(ErrorProto::message(message)),
                    ..done
                },
            ))),
            MockOutcome::Dml { inserted } => {
                let mut job = remote_job(reference, done);
                job.statistics = Some(JobStatistics {
                    query: Some(QueryStatistics {
                        dml_stats: Some(DmlStats {
                            inserted_row_count: inserted,
                            ..Default::default()
                        }),
                        statement_type: Some("INSERT".to_string()),
                    }),
                });
                Ok(Some(job))
            }
            MockOutcome::Rows(_) => Ok(Some(remote_job(reference, done))),
        }
    }

    async fn fetch_page(
        &self,
        reference: &JobReference,
        page_token: Option<&str>,
    ) -> Result<ResultPage> {
        let outcome = {
            let mut state = self.lock();
            state.page_fetches += 1;
            state.jobs.get(&reference.job_id).cloned()
        };

        let table = match outcome {
            None | Some(MockOutcome::Vanished) => {
                return Err(ReportError::network(format!(
                    "404 Not Found: job {}",
                    reference.job_id
                )))
            }
            Some(MockOutcome::Failed(message)) => return Err(ReportError::job_execution(message)),
            Some(MockOutcome::Hang) => {
                return Ok(ResultPage {
                    job_complete: false,
                    ..Default::default()
                })
            }
            Some(MockOutcome::Dml { .. }) => MockTable::default(),
            Some(MockOutcome::Rows(table)) => table,
        };

        let offset: usize = match page_token {
            Some(token) => token
                .parse()
                .map_err(|_| ReportError::network(format!("400 Bad Request: page token {token}")))?,
            None => 0,
        };
        let end = (offset + self.page_size).min(table.rows.len());
        let rows = table
            .rows
            .get(offset..end)
            .unwrap_or_default()
            .iter()
            .map(|values| WireRow::from_values(values.iter().cloned()))
            .collect();

        Ok(ResultPage {
            job_complete: true,
            schema: Some(TableSchema {
                fields: table.schema.clone(),
            }),
            rows,
            page_token: (end < table.rows.len()).then(|| end.to_string()),
            total_rows: Some(table.rows.len() as u64),
        })
    }

    async fn insert_rows(
        &self,
        table: &TableRef,
        request: &InsertAllRequest,
    ) -> Result<InsertAllResponse> {
        self.lock()
            .inserts
            .push((table.qualified_name(), request.clone()));

        let row_count = request.rows.len() as u64;
        Ok(InsertAllResponse {
            insert_errors: self
                .insert_errors
                .iter()
                .filter(|e| e.index < row_count)
                .cloned()
                .collect(),
        })
    }
}

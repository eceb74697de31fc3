//! End-to-end query execution.
//!
//! Classifies the statement, submits it, waits for the job, then reports
//! either DML row counts or the decoded result rows. Nothing is written to
//! the reporter until the job has finished successfully.

use std::fmt;
use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::job::JobClient;
use crate::report::Reporter;
use crate::results::{ResultReader, RowSchema};
use crate::statement::{StatementClassifier, StatementKind};
use crate::warehouse::{DmlStats, QueryService};

use super::builder::{QueryBuilder, QuerySpec};

/// Per-run settings.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Expected column types; inferred from the result when unset.
    pub schema: Option<RowSchema>,
    /// Maximum time to wait for the job. Unset waits indefinitely.
    pub timeout: Option<Duration>,
}

/// What a successful run reported.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    /// Rows were read and emitted.
    Rows { job_id: String, rows: usize },
    /// A DML statement finished; its counts were emitted.
    Dml { job_id: String, stats: DmlStats },
}

impl QueryOutcome {
    pub fn job_id(&self) -> &str {
        match self {
            Self::Rows { job_id, .. } | Self::Dml { job_id, .. } => job_id,
        }
    }
}

impl fmt::Display for QueryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rows { rows, .. } => write!(f, "{} row(s)", rows),
            Self::Dml { stats, .. } => write!(
                f,
                "{} inserted, {} updated, {} deleted",
                stats.inserted_row_count, stats.updated_row_count, stats.deleted_row_count
            ),
        }
    }
}

/// Runs SQL through the job client, result reader and reporter.
pub struct QueryExecutor {
    jobs: JobClient,
    reader: ResultReader,
    classifier: StatementClassifier,
    cancel: CancellationToken,
}

impl QueryExecutor {
    /// Creates a new query executor.
    pub fn new(service: Arc<dyn QueryService>) -> Self {
        Self {
            jobs: JobClient::new(service.clone()),
            reader: ResultReader::new(service),
            classifier: StatementClassifier::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Stops waiting for jobs when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Builds the SQL for a spec and runs it.
    pub async fn run_spec<W: Write>(
        &self,
        spec: &QuerySpec,
        options: &RunOptions,
        reporter: &mut Reporter<W>,
    ) -> Result<QueryOutcome> {
        let sql = QueryBuilder::build(spec);
        self.run(&sql, options, reporter).await
    }

    /// Runs one SQL statement and reports its result.
    pub async fn run<W: Write>(
        &self,
        sql: &str,
        options: &RunOptions,
        reporter: &mut Reporter<W>,
    ) -> Result<QueryOutcome> {
        let start = Instant::now();

        let kind = self.classifier.classify(sql);
        match kind {
            StatementKind::Query => debug!("Statement returns rows"),
            StatementKind::Unparsed => debug!("Statement not recognized locally; submitting as-is"),
            other => warn!(kind = %other, "Submitting a statement that is not safe to resubmit"),
        }

        let job = self.jobs.submit(sql).await?;
        let job = self
            .jobs
            .await_completion_with_cancel(job, options.timeout, &self.cancel)
            .await?;
        let job_id = job.id().to_string();

        let outcome = match job.dml_stats() {
            Some(stats) => {
                reporter.emit_dml(&stats)?;
                QueryOutcome::Dml { job_id, stats }
            }
            None if kind.is_dml() => {
                warn!(
                    job_id = %job_id,
                    statement = %kind,
                    "Service returned no DML statistics; reporting zero affected rows"
                );
                let stats = DmlStats::default();
                reporter.emit_dml(&stats)?;
                QueryOutcome::Dml { job_id, stats }
            }
            None => {
                let set = self.reader.rows(job, options.schema.clone()).await?;
                let columns = set.columns();
                let rows = reporter.emit(set.into_stream(), &columns).await?;
                QueryOutcome::Rows { job_id, rows }
            }
        };

        let elapsed = start.elapsed();
        info!(
            job_id = %outcome.job_id(),
            outcome = %outcome,
            elapsed_secs = elapsed.as_secs(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Query executed"
        );

        Ok(outcome)
    }
}

//! Remote job submission and completion.
//!
//! A [`Job`] is created by [`JobClient::submit`] and only changes through
//! [`JobClient::await_completion`]. Waiting is a single suspension point: the
//! service's wait future is awaited under an optional deadline and an
//! optional cancellation token. Neither a timeout nor a cancellation stops the
//! remote job; the local handle is simply dropped.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{ReportError, Result};
use crate::warehouse::{
    DmlStats, JobReference, JobStatistics, QueryService, RemoteJob, RemoteJobState,
};

/// Locally observed state of a remote job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Running,
    Done,
    Failed,
}

impl JobStatus {
    /// Returns true for `Done` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Done => write!(f, "done"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// A handle to one remote query job.
#[derive(Debug, Clone)]
pub struct Job {
    pub reference: JobReference,
    pub sql: String,
    pub status: JobStatus,
    pub error: Option<String>,
    pub statistics: Option<JobStatistics>,
    pub submitted_at: DateTime<Utc>,
}

impl Job {
    /// Builds a local handle from the service's job resource.
    pub fn from_remote(
        remote: RemoteJob,
        sql: impl Into<String>,
        submitted_at: DateTime<Utc>,
    ) -> Self {
        let mut job = Self {
            reference: remote.job_reference.clone(),
            sql: sql.into(),
            status: JobStatus::Pending,
            error: None,
            statistics: None,
            submitted_at,
        };
        job.apply(remote);
        job
    }

    /// Returns the job id.
    pub fn id(&self) -> &str {
        &self.reference.job_id
    }

    /// Returns DML row counts for data manipulation jobs.
    pub fn dml_stats(&self) -> Option<DmlStats> {
        self.statistics.as_ref().and_then(JobStatistics::dml_stats)
    }

    /// Refreshes status, error and statistics from a newer job resource.
    fn apply(&mut self, remote: RemoteJob) {
        self.status = match remote.status.state {
            RemoteJobState::Pending => JobStatus::Pending,
            RemoteJobState::Running => JobStatus::Running,
            RemoteJobState::Done if remote.status.error_result.is_some() => JobStatus::Failed,
            RemoteJobState::Done => JobStatus::Done,
        };
        self.error = remote.status.error_result.map(|e| e.describe());
        if remote.statistics.is_some() {
            self.statistics = remote.statistics;
        }
    }
}

/// Submits SQL to the remote service and waits for jobs to finish.
#[derive(Clone)]
pub struct JobClient {
    service: Arc<dyn QueryService>,
}

impl JobClient {
    /// Creates a new job client.
    pub fn new(service: Arc<dyn QueryService>) -> Self {
        Self { service }
    }

    /// Submits SQL as a new job. One round trip; does not wait.
    pub async fn submit(&self, sql: &str) -> Result<Job> {
        let submitted_at = Utc::now();
        info!(sql = %sql, started_at = %submitted_at.to_rfc3339(), "Submitting query job");

        let remote = self.service.insert_job(sql).await?;
        let job = Job::from_remote(remote, sql, submitted_at);

        debug!(job_id = %job.id(), status = %job.status, "Job accepted");
        Ok(job)
    }

    /// Waits for the job to reach a terminal state.
    ///
    /// Fails with `JobVanished` if the service lost the job, with
    /// `JobExecution` if it failed remotely, and with `Timeout` if the
    /// deadline elapsed first.
    pub async fn await_completion(&self, job: Job, timeout: Option<Duration>) -> Result<Job> {
        self.await_completion_with_cancel(job, timeout, &CancellationToken::new())
            .await
    }

    /// Like [`await_completion`](Self::await_completion), but also stops
    /// waiting when `cancel` fires.
    pub async fn await_completion_with_cancel(
        &self,
        mut job: Job,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<Job> {
        let start = Instant::now();
        let wait = self.service.wait_for_job(&job.reference);

        let waited = tokio::select! {
            result = with_deadline(wait, timeout) => result,
            _ = cancel.cancelled() => {
                warn!(job_id = %job.id(), "Wait cancelled; job left running remotely");
                return Err(ReportError::Cancelled);
            }
        };

        let elapsed = start.elapsed();
        let finished_at = Utc::now();

        let remote = match waited {
            Err(e) => {
                if let ReportError::Timeout(_) = e {
                    warn!(job_id = %job.id(), "Wait timed out; job left running remotely");
                }
                return Err(e);
            }
            Ok(None) => {
                warn!(job_id = %job.id(), "Job no longer exists");
                return Err(ReportError::JobVanished(job.reference.job_id.clone()));
            }
            Ok(Some(remote)) => remote,
        };

        job.apply(remote);
        info!(
            job_id = %job.id(),
            sql = %job.sql,
            status = %job.status,
            started_at = %job.submitted_at.to_rfc3339(),
            finished_at = %finished_at.to_rfc3339(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Job finished"
        );

        match job.status {
            JobStatus::Done => Ok(job),
            JobStatus::Failed => Err(ReportError::job_execution(
                job.error.clone().unwrap_or_else(|| "unknown error".to_string()),
            )),
            other => Err(ReportError::invalid_state(format!(
                "service returned job {} in non-terminal state '{}'",
                job.id(),
                other
            ))),
        }
    }
}

async fn with_deadline<F, T>(future: F, timeout: Option<Duration>) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, future)
            .await
            .map_err(|_| ReportError::Timeout(limit))?,
        None => future.await,
    }
}

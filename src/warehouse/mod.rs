//! Remote execution service abstraction.
//!
//! The warehouse plans, runs and stores everything; this crate only talks to
//! it through the [`QueryService`] trait so the real REST client and the
//! in-memory mock can be used interchangeably.

mod http;
mod mock;
mod types;

pub use http::{BigQueryClient, DEFAULT_ENDPOINT};
pub use mock::{MockOutcome, MockQueryService, MockTable};
pub use types::{
    DmlStats, ErrorProto, FieldSchema, InsertAllRequest, InsertAllResponse, InsertErrors,
    InsertRow, JobReference, JobStatistics, QueryStatistics, RemoteJob, RemoteJobState,
    RemoteJobStatus, ResultPage, TableSchema, WireCell, WireRow,
};

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::ServiceConfig;
use crate::error::Result;
use crate::query::TableRef;

/// Creates the service client described by the configuration.
///
/// This is the central factory for remote connections.
pub fn connect(config: &ServiceConfig) -> Result<Arc<dyn QueryService>> {
    let client = BigQueryClient::new(config)?;
    Ok(Arc::new(client))
}

/// Trait defining the operations of the remote execution service.
///
/// Implementations must be thread-safe so they can be shared behind an `Arc`.
#[async_trait]
pub trait QueryService: Send + Sync {
    /// Submits SQL as a new query job. Returns as soon as the job is accepted.
    async fn insert_job(&self, sql: &str) -> Result<RemoteJob>;

    /// Waits until the job reaches a terminal state.
    ///
    /// Returns `None` if the service no longer knows the job.
    async fn wait_for_job(&self, reference: &JobReference) -> Result<Option<RemoteJob>>;

    /// Fetches one page of a completed job's results.
    async fn fetch_page(
        &self,
        reference: &JobReference,
        page_token: Option<&str>,
    ) -> Result<ResultPage>;

    /// Streams rows into a table.
    async fn insert_rows(
        &self,
        table: &TableRef,
        request: &InsertAllRequest,
    ) -> Result<InsertAllResponse>;
}

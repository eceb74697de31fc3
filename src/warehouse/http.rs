//! BigQuery REST client implementation.
//!
//! Implements the [`QueryService`] trait over the BigQuery v2 REST API using
//! reqwest. Authentication is an opaque OAuth bearer token.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid_like::job_id;

use super::{
    InsertAllRequest, InsertAllResponse, JobReference, QueryService, RemoteJob, RemoteJobState,
    ResultPage,
};
use crate::config::ServiceConfig;
use crate::error::{ReportError, Result};
use crate::query::TableRef;

/// Public BigQuery REST endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://bigquery.googleapis.com/bigquery/v2";

/// BigQuery REST client.
#[derive(Debug, Clone)]
pub struct BigQueryClient {
    client: Client,
    base_url: String,
    project: String,
    location: Option<String>,
    access_token: Option<String>,
    poll_timeout_ms: u64,
    page_size: u32,
}

impl BigQueryClient {
    /// Creates a new client from the service configuration.
    pub fn new(config: &ServiceConfig) -> Result<Self> {
        let base_url = config.endpoint_url()?.as_str().trim_end_matches('/').to_string();
        let project = config.require_project()?.to_string();

        // Long-poll requests must outlive the server-side wait.
        let request_timeout = Duration::from_secs(config.request_timeout_secs)
            .max(Duration::from_millis(config.poll_timeout_ms) + Duration::from_secs(5));

        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ReportError::network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            project,
            location: config.location.clone(),
            access_token: config.access_token.clone(),
            poll_timeout_ms: config.poll_timeout_ms,
            page_size: config.page_size,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn location_for<'a>(&'a self, reference: &'a JobReference) -> Option<&'a str> {
        reference.location.as_deref().or(self.location.as_deref())
    }

    /// Sends a request and returns the status and body.
    async fn send(&self, request: RequestBuilder) -> Result<(StatusCode, String)> {
        let response = self.authorize(request).send().await.map_err(|e| {
            if e.is_timeout() {
                ReportError::network("Request timed out")
            } else if e.is_connect() {
                ReportError::network(format!("Failed to connect to {}: {}", self.base_url, e))
            } else {
                ReportError::network(format!("Request failed: {}", e))
            }
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ReportError::network(format!("Failed to read response: {}", e)))?;

        Ok((status, body))
    }

    /// Sends a request, treating 404 as `None`.
    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<Option<T>> {
        let (status, body) = self.send(request).await?;

        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(Self::parse_error(status, &body));
        }

        serde_json::from_str(&body)
            .map(Some)
            .map_err(|e| ReportError::network(format!("Failed to parse response: {}", e)))
    }

    /// Parses an API error response.
    fn parse_error(status: StatusCode, body: &str) -> ReportError {
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return ReportError::network(format!(
                "Authentication failed ({}). Check BIGQUERY_ACCESS_TOKEN.",
                status
            ));
        }

        if let Ok(error_response) = serde_json::from_str::<ApiErrorResponse>(body) {
            return ReportError::network(format!(
                "BigQuery API error ({}): {}",
                status, error_response.error.message
            ));
        }

        ReportError::network(format!("BigQuery API error ({}): {}", status, body))
    }

    async fn get_job(&self, reference: &JobReference) -> Result<Option<RemoteJob>> {
        let mut request = self.client.get(self.url(&format!(
            "/projects/{}/jobs/{}",
            reference.project_id, reference.job_id
        )));
        if let Some(location) = self.location_for(reference) {
            request = request.query(&[("location", location)]);
        }
        self.send_json(request).await
    }

    async fn get_query_results(
        &self,
        reference: &JobReference,
        page_token: Option<&str>,
        max_results: u32,
    ) -> Result<Option<ResultPage>> {
        let mut params: Vec<(&str, String)> = vec![
            ("maxResults", max_results.to_string()),
            ("timeoutMs", self.poll_timeout_ms.to_string()),
        ];
        if let Some(token) = page_token {
            params.push(("pageToken", token.to_string()));
        }
        if let Some(location) = self.location_for(reference) {
            params.push(("location", location.to_string()));
        }

        let request = self
            .client
            .get(self.url(&format!(
                "/projects/{}/queries/{}",
                reference.project_id, reference.job_id
            )))
            .query(&params);
        self.send_json(request).await
    }
}

#[async_trait]
impl QueryService for BigQueryClient {
    async fn insert_job(&self, sql: &str) -> Result<RemoteJob> {
        let request = InsertJobRequest {
            job_reference: JobReference {
                project_id: self.project.clone(),
                job_id: job_id(),
                location: self.location.clone(),
            },
            configuration: JobConfiguration {
                query: QueryJobConfiguration {
                    query: sql.to_string(),
                    use_legacy_sql: false,
                },
            },
        };

        let http = self
            .client
            .post(self.url(&format!("/projects/{}/jobs", self.project)))
            .json(&request);

        self.send_json(http).await?.ok_or_else(|| {
            ReportError::network(format!("Project {} not found", self.project))
        })
    }

    async fn wait_for_job(&self, reference: &JobReference) -> Result<Option<RemoteJob>> {
        // getQueryResults blocks server-side for up to timeoutMs per call.
        loop {
            match self.get_query_results(reference, None, 0).await {
                Ok(None) => return Ok(None),
                Ok(Some(page)) if page.job_complete => break,
                Ok(Some(_)) => debug!(job_id = %reference.job_id, "Job still running"),
                // Failed jobs surface as API errors here; jobs.get has the detail.
                // Anything short of a finished job keeps the poll error.
                Err(e) => {
                    debug!(
                        job_id = %reference.job_id,
                        error = %e,
                        "Result poll failed, checking job status"
                    );
                    return match self.get_job(reference).await {
                        Ok(Some(job)) if job.status.state == RemoteJobState::Done => Ok(Some(job)),
                        _ => Err(e),
                    };
                }
            }
        }

        self.get_job(reference).await
    }

    async fn fetch_page(
        &self,
        reference: &JobReference,
        page_token: Option<&str>,
    ) -> Result<ResultPage> {
        debug!(job_id = %reference.job_id, page_token = ?page_token, "Fetching result page");
        self.get_query_results(reference, page_token, self.page_size)
            .await?
            .ok_or_else(|| ReportError::JobVanished(reference.job_id.clone()))
    }

    async fn insert_rows(
        &self,
        table: &TableRef,
        request: &InsertAllRequest,
    ) -> Result<InsertAllResponse> {
        let project = table.project.as_deref().unwrap_or(&self.project);
        let http = self
            .client
            .post(self.url(&format!(
                "/projects/{}/datasets/{}/tables/{}/insertAll",
                project, table.dataset, table.table
            )))
            .json(request);

        self.send_json(http)
            .await?
            .ok_or_else(|| ReportError::network(format!("Table {} not found", table)))
    }
}

/// Client-generated job ids make `jobs.insert` safe to resend.
mod uuid_like {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::{SystemTime, UNIX_EPOCH};

    static COUNTER: AtomicU64 = AtomicU64::new(0);

    pub fn job_id() -> String {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
        format!("bq_report_{:x}_{}_{}", nanos, std::process::id(), seq)
    }
}

// API request/response types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InsertJobRequest {
    job_reference: JobReference,
    configuration: JobConfiguration,
}

#[derive(Debug, Serialize)]
struct JobConfiguration {
    query: QueryJobConfiguration,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryJobConfiguration {
    query: String,
    use_legacy_sql: bool,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{Job, JobClient};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn config() -> ServiceConfig {
        ServiceConfig {
            project: Some("test-project-350020".to_string()),
            endpoint: "http://localhost:9050/bigquery/v2/".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_client_requires_project() {
        let result = BigQueryClient::new(&ServiceConfig::default());
        assert!(matches!(result, Err(ReportError::Config(_))));
    }

    #[test]
    fn test_client_url_trims_trailing_slash() {
        let client = BigQueryClient::new(&config()).unwrap();
        assert_eq!(
            client.url("/projects/p/jobs"),
            "http://localhost:9050/bigquery/v2/projects/p/jobs"
        );
    }

    #[test]
    fn test_location_prefers_job_reference() {
        let mut cfg = config();
        cfg.location = Some("US".to_string());
        let client = BigQueryClient::new(&cfg).unwrap();

        let mut reference = JobReference::new("p", "j");
        assert_eq!(client.location_for(&reference), Some("US"));

        reference.location = Some("EU".to_string());
        assert_eq!(client.location_for(&reference), Some("EU"));
    }

    #[test]
    fn test_parse_error_extracts_message() {
        let body =
            r#"{"error": {"code": 400, "message": "Syntax error: Unexpected end of script"}}"#;
        let err = BigQueryClient::parse_error(StatusCode::BAD_REQUEST, body);
        assert!(err.to_string().contains("Syntax error: Unexpected end of script"));

        let err = BigQueryClient::parse_error(StatusCode::UNAUTHORIZED, "");
        assert!(err.to_string().contains("Authentication failed"));

        let err = BigQueryClient::parse_error(StatusCode::BAD_GATEWAY, "upstream");
        assert!(err.to_string().contains("upstream"));
    }

    #[test]
    fn test_insert_job_request_shape() {
        let request = InsertJobRequest {
            job_reference: JobReference::new("p", "j"),
            configuration: JobConfiguration {
                query: QueryJobConfiguration {
                    query: "SELECT 1".to_string(),
                    use_legacy_sql: false,
                },
            },
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            serde_json::json!({
                "jobReference": {"projectId": "p", "jobId": "j"},
                "configuration": {"query": {"query": "SELECT 1", "useLegacySql": false}}
            })
        );
    }

    /// Serves canned JSON responses, matched by path fragment, one request
    /// per connection. Returns the endpoint to configure.
    async fn serve(routes: Vec<(&'static str, u16, &'static str)>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = vec![0u8; 8192];
                let n = socket.read(&mut buf).await.unwrap_or(0);
                let head = String::from_utf8_lossy(&buf[..n]).to_string();
                let path = head.split_whitespace().nth(1).unwrap_or_default().to_string();

                let (status, body) = routes
                    .iter()
                    .find(|(fragment, _, _)| path.contains(fragment))
                    .map(|(_, status, body)| (*status, *body))
                    .unwrap_or((404, "{}"));
                let response = format!(
                    "HTTP/1.1 {status} Stub\r\n\
                     content-type: application/json\r\n\
                     content-length: {}\r\n\
                     connection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        format!("http://{addr}/bigquery/v2")
    }

    fn stub_client(endpoint: String) -> BigQueryClient {
        BigQueryClient::new(&ServiceConfig {
            project: Some("p".to_string()),
            endpoint,
            poll_timeout_ms: 100,
            ..Default::default()
        })
        .unwrap()
    }

    fn pending_job() -> Job {
        let remote = RemoteJob {
            job_reference: JobReference::new("p", "j"),
            ..Default::default()
        };
        Job::from_remote(remote, "SELECT 1", chrono::Utc::now())
    }

    #[tokio::test]
    async fn test_poll_failure_on_running_job_is_network_error() {
        let endpoint = serve(vec![
            ("/queries/j", 503, r#"{"error": {"code": 503, "message": "backend unavailable"}}"#),
            (
                "/jobs/j",
                200,
                r#"{"jobReference": {"projectId": "p", "jobId": "j"},
                    "status": {"state": "RUNNING"}}"#,
            ),
        ])
        .await;
        let jobs = JobClient::new(Arc::new(stub_client(endpoint)));

        let err = jobs.await_completion(pending_job(), None).await.unwrap_err();

        assert!(matches!(err, ReportError::Network(_)));
        assert_eq!(err.category(), "Network Error");
        assert!(err.to_string().contains("backend unavailable"));
    }

    #[tokio::test]
    async fn test_poll_failure_on_failed_job_reports_job_error() {
        let endpoint = serve(vec![
            ("/queries/j", 400, r#"{"error": {"code": 400, "message": "Unrecognized name: foo"}}"#),
            (
                "/jobs/j",
                200,
                r#"{"jobReference": {"projectId": "p", "jobId": "j"},
                    "status": {"state": "DONE", "errorResult": {
                        "reason": "invalidQuery", "message": "Unrecognized name: foo"}}}"#,
            ),
        ])
        .await;
        let jobs = JobClient::new(Arc::new(stub_client(endpoint)));

        let err = jobs.await_completion(pending_job(), None).await.unwrap_err();

        assert!(matches!(err, ReportError::JobExecution(_)));
        assert!(err.to_string().contains("Unrecognized name: foo"));
    }

    #[test]
    fn test_job_ids_are_unique() {
        assert_ne!(job_id(), job_id());
    }
}

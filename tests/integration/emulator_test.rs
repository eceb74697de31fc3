//! REST client tests against a BigQuery emulator.
//!
//! Skipped unless BIGQUERY_EMULATOR_ENDPOINT is set, e.g.
//! `http://localhost:9050/bigquery/v2` for goccy/bigquery-emulator started
//! with `--project=test`.

use bq_report::config::ServiceConfig;
use bq_report::error::ReportError;
use bq_report::job::JobClient;
use bq_report::query::{QueryExecutor, RunOptions};
use bq_report::report::{OutputFormat, Reporter};
use bq_report::results::{ResultReader, Scalar};
use bq_report::warehouse::{self, JobReference, QueryService};

/// Helper to build a client for the emulator, if configured.
fn get_test_service() -> Option<std::sync::Arc<dyn QueryService>> {
    let endpoint = std::env::var("BIGQUERY_EMULATOR_ENDPOINT").ok()?;
    let config = ServiceConfig {
        endpoint,
        project: Some(std::env::var("BIGQUERY_EMULATOR_PROJECT").unwrap_or_else(|_| "test".into())),
        poll_timeout_ms: 1000,
        ..Default::default()
    };
    warehouse::connect(&config).ok()
}

#[tokio::test]
async fn test_emulator_select_literal() {
    let Some(service) = get_test_service() else {
        eprintln!("Skipping test: BIGQUERY_EMULATOR_ENDPOINT not set");
        return;
    };

    let jobs = JobClient::new(service.clone());
    let job = jobs.submit("SELECT 1 AS num, 'hello' AS greeting").await.unwrap();
    let job = jobs.await_completion(job, None).await.unwrap();

    let rows = ResultReader::new(service)
        .rows(job, None)
        .await
        .unwrap()
        .collect()
        .await
        .unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("num"), Some(&Scalar::Long(1)));
    assert_eq!(rows[0].get("greeting").and_then(Scalar::as_str), Some("hello"));
}

#[tokio::test]
async fn test_emulator_report() {
    let Some(service) = get_test_service() else {
        eprintln!("Skipping test: BIGQUERY_EMULATOR_ENDPOINT not set");
        return;
    };

    let executor = QueryExecutor::new(service);
    let mut reporter = Reporter::new(Vec::new(), OutputFormat::Text);
    executor
        .run(
            "SELECT n FROM UNNEST([1, 2, 3]) AS n ORDER BY n",
            &RunOptions::default(),
            &mut reporter,
        )
        .await
        .unwrap();

    let output = String::from_utf8(reporter.into_inner()).unwrap();
    assert_eq!(output.lines().count(), 3 + 2);
}

#[tokio::test]
async fn test_emulator_unknown_job_vanishes() {
    let Some(service) = get_test_service() else {
        eprintln!("Skipping test: BIGQUERY_EMULATOR_ENDPOINT not set");
        return;
    };

    let project = std::env::var("BIGQUERY_EMULATOR_PROJECT").unwrap_or_else(|_| "test".into());
    let missing = JobReference::new(project, "bq_report_missing_job");
    let result = service.wait_for_job(&missing).await;

    assert!(matches!(result, Ok(None) | Err(ReportError::Network(_))));
}

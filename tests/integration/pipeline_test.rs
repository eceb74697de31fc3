//! End-to-end pipeline tests against the mock service.
//!
//! Covers submit, wait, read and report as one flow.

use std::sync::Arc;
use std::time::Duration;

use bq_report::error::ReportError;
use bq_report::job::{JobClient, JobStatus};
use bq_report::query::{
    Direction, FilterValue, QueryExecutor, QueryOutcome, QuerySpec, RunOptions,
};
use bq_report::report::{OutputFormat, Reporter};
use bq_report::results::{ResultReader, RowSchema, Scalar, ScalarType};
use bq_report::warehouse::{FieldSchema, MockOutcome, MockQueryService, MockTable};
use serde_json::json;

fn cpe_history(rows: usize) -> MockTable {
    let mut table = MockTable::new(vec![
        FieldSchema::new("DeviceID", "STRING"),
        FieldSchema::new("CPE", "INTEGER"),
        FieldSchema::new("Fecha", "TIMESTAMP"),
    ]);
    for i in 0..rows {
        table = table.with_row(vec![
            json!(format!("device-{i}")),
            json!(i.to_string()),
            json!("1.6535232E9"),
        ]);
    }
    table
}

async fn run_to_string(
    service: MockQueryService,
    sql: &str,
    options: RunOptions,
) -> (Arc<MockQueryService>, String, Result<QueryOutcome, ReportError>) {
    let service = Arc::new(service);
    let executor = QueryExecutor::new(service.clone());
    let mut reporter = Reporter::new(Vec::new(), OutputFormat::Text);
    let result = executor.run(sql, &options, &mut reporter).await;
    let output = String::from_utf8(reporter.into_inner()).unwrap();
    (service, output, result)
}

#[tokio::test]
async fn test_report_line_count_matches_rows_across_pages() {
    let service = MockQueryService::new()
        .with_fallback(MockOutcome::Rows(cpe_history(7)))
        .with_page_size(3);

    let (service, output, result) =
        run_to_string(service, "SELECT * FROM `p.test.CPEHistoricData`", RunOptions::default())
            .await;

    assert!(matches!(result.unwrap(), QueryOutcome::Rows { rows: 7, .. }));
    assert_eq!(output.lines().count(), 7 + 2);
    assert_eq!(output.lines().next(), Some("DeviceID\tCPE\tFecha"));
    assert_eq!(
        output.lines().nth(2),
        Some("device-0\t0\t2022-05-26 00:00:00 UTC")
    );
    assert_eq!(service.page_fetches(), 3);
}

#[tokio::test]
async fn test_vanished_job_prints_nothing() {
    let service = MockQueryService::new().with_fallback(MockOutcome::Vanished);

    let (service, output, result) =
        run_to_string(service, "SELECT 1", RunOptions::default()).await;

    assert!(matches!(result, Err(ReportError::JobVanished(_))));
    assert!(output.is_empty());
    assert_eq!(service.page_fetches(), 0);
}

#[tokio::test]
async fn test_type_mismatch_prints_nothing() {
    let service = MockQueryService::new().with_fallback(MockOutcome::Rows(cpe_history(2)));
    let options = RunOptions {
        schema: Some(RowSchema::new().with_column("DeviceID", ScalarType::Long)),
        ..Default::default()
    };

    let (_, output, result) = run_to_string(service, "SELECT * FROM t", options).await;

    let err = result.unwrap_err();
    assert_eq!(err.category(), "Type Mismatch");
    assert!(err.to_string().contains("DeviceID"));
    assert!(output.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_timeout_abandons_job() {
    let service = MockQueryService::new().with_fallback(MockOutcome::Hang);
    let options = RunOptions {
        timeout: Some(Duration::from_secs(120)),
        ..Default::default()
    };

    let (service, output, result) = run_to_string(service, "SELECT 1", options).await;

    assert!(matches!(result, Err(ReportError::Timeout(_))));
    assert!(output.is_empty());
    assert_eq!(service.submitted_sql().len(), 1);
}

#[tokio::test]
async fn test_dml_insert_reports_count() {
    let service = MockQueryService::new().on_sql("insert into", MockOutcome::Dml { inserted: 2 });

    let (_, output, result) = run_to_string(
        service,
        "INSERT INTO `claro-test-332211.test.vegetables` (id, name) VALUES (1, 'carrot'), (2, 'beans')",
        RunOptions::default(),
    )
    .await;

    assert!(matches!(result.unwrap(), QueryOutcome::Dml { .. }));
    assert_eq!(output, "2 rows inserted\n");
}

#[tokio::test]
async fn test_spec_to_report_with_expected_schema() {
    let table = MockTable::new(vec![
        FieldSchema::new("BusinessEntityID", "INTEGER"),
        FieldSchema::new("ModifiedDate", "TIMESTAMP"),
    ])
    .with_row(vec![json!("285"), json!("1.2377952E9")]);
    let service = Arc::new(MockQueryService::new().with_fallback(MockOutcome::Rows(table)));
    let executor = QueryExecutor::new(service.clone());

    let spec = QuerySpec::new("test-project-350020.Pruebas.AllTables")
        .with_columns(["BusinessEntityID", "ModifiedDate"])
        .with_filter("PersonType", FilterValue::raw("'EM'"))
        .with_order(["ModifiedDate"], Direction::Desc, 20000);
    let options = RunOptions {
        schema: Some(
            RowSchema::new()
                .with_column("BusinessEntityID", ScalarType::Integer)
                .with_column("ModifiedDate", ScalarType::Timestamp),
        ),
        ..Default::default()
    };

    let mut reporter = Reporter::new(Vec::new(), OutputFormat::Json);
    executor.run_spec(&spec, &options, &mut reporter).await.unwrap();

    assert_eq!(
        service.submitted_sql(),
        vec![
            "SELECT BusinessEntityID,ModifiedDate FROM `test-project-350020.Pruebas.AllTables` WHERE PersonType='EM' ORDER BY ModifiedDate DESC LIMIT 20000"
                .to_string()
        ]
    );
    let output = String::from_utf8(reporter.into_inner()).unwrap();
    assert_eq!(
        output,
        "{\"BusinessEntityID\":285,\"ModifiedDate\":\"2009-03-23T08:00:00Z\"}\n"
    );
}

#[tokio::test]
async fn test_result_set_is_forward_only() {
    let service =
        Arc::new(MockQueryService::new().with_fallback(MockOutcome::Rows(cpe_history(2))));
    let jobs = JobClient::new(service.clone());
    let reader = ResultReader::new(service.clone());

    let job = jobs.submit("SELECT * FROM t").await.unwrap();
    let job = jobs.await_completion(job, None).await.unwrap();
    assert_eq!(job.status, JobStatus::Done);

    let mut set = reader.rows(job, None).await.unwrap();
    let first = set.next_row().await.unwrap().unwrap();
    assert_eq!(first.get("CPE"), Some(&Scalar::Long(0)));
    assert!(set.next_row().await.unwrap().is_some());
    assert!(set.next_row().await.unwrap().is_none());
    assert!(set.next_row().await.unwrap().is_none());
}

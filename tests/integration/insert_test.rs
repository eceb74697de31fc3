//! Streaming insert integration tests.

use std::sync::Arc;

use bq_report::error::ReportError;
use bq_report::insert::{InsertRequest, StreamingInserter};
use bq_report::query::TableRef;
use bq_report::report::{OutputFormat, Reporter};
use bq_report::warehouse::{ErrorProto, InsertErrors, MockQueryService};

fn vegetables(names: &[&str]) -> InsertRequest {
    let table = TableRef::parse("claro-test-332211.test.vegetables").unwrap();
    names
        .iter()
        .enumerate()
        .fold(InsertRequest::new(table), |request, (i, name)| {
            let row = format!(r#"{{"id": {}, "name": "{}"}}"#, i + 1, name);
            request.with_row(InsertRequest::parse_row(&row).unwrap())
        })
}

#[tokio::test]
async fn test_insert_and_report_success() {
    let service = Arc::new(MockQueryService::new());
    let inserter = StreamingInserter::new(service.clone());

    let summary = inserter.insert(vegetables(&["carrot", "beans"])).await.unwrap();

    let mut reporter = Reporter::new(Vec::new(), OutputFormat::Text);
    reporter.emit_insert_summary(&summary).unwrap();
    assert_eq!(
        String::from_utf8(reporter.into_inner()).unwrap(),
        "inserted successfully\n"
    );
    assert_eq!(summary.into_result().unwrap(), 2);

    let inserts = service.inserts();
    let (table, request) = &inserts[0];
    assert_eq!(table, "claro-test-332211.test.vegetables");
    assert_eq!(request.rows.len(), 2);
}

#[tokio::test]
async fn test_insert_reports_each_rejected_entry() {
    let service = Arc::new(MockQueryService::new().with_insert_errors(vec![
        InsertErrors {
            index: 0,
            errors: vec![ErrorProto {
                reason: Some("invalid".to_string()),
                location: Some("name".to_string()),
                message: "Cannot convert value to string".to_string(),
            }],
        },
        InsertErrors {
            index: 2,
            errors: vec![ErrorProto::message("no such field: colour")],
        },
    ]));
    let inserter = StreamingInserter::new(service);

    let summary = inserter
        .insert(vegetables(&["carrot", "beans", "leek"]))
        .await
        .unwrap();

    let mut reporter = Reporter::new(Vec::new(), OutputFormat::Text);
    reporter.emit_insert_summary(&summary).unwrap();
    let output = String::from_utf8(reporter.into_inner()).unwrap();
    let lines: Vec<&str> = output.lines().collect();

    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("error in entry 0: "));
    assert!(lines[0].contains("Cannot convert value to string"));
    assert_eq!(lines[1], "error in entry 2: no such field: colour");

    let err = summary.into_result().unwrap_err();
    assert!(matches!(err, ReportError::InsertRejected { failed_rows: 2, .. }));
    assert_eq!(err.category(), "Insert Error");
}

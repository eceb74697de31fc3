//! Configuration integration tests.
//!
//! Loads TOML files from disk and checks the queries they resolve to.

use std::sync::Arc;

use bq_report::config::{Config, ResolvedQuery};
use bq_report::query::{QueryBuilder, QueryExecutor, RunOptions};
use bq_report::report::{OutputFormat, Reporter};
use bq_report::results::ScalarType;
use bq_report::warehouse::{FieldSchema, MockOutcome, MockQueryService, MockTable};
use pretty_assertions::assert_eq;
use serde_json::json;

fn write_config(content: &str) -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, content).unwrap();
    (dir, path)
}

const REPORTS: &str = r#"
[service]
project = "test-project-350020"
endpoint = "http://localhost:9050/bigquery/v2"
wait_timeout_secs = 300
page_size = 500

[queries.default]
dataset = "Pruebas"
table = "AllTables"
columns = ["BusinessEntityID", "rowguid", "ModifiedDate"]
order_by = ["ModifiedDate"]
direction = "desc"
limit = 20000

[queries.default.filters]
PersonType = "'EM'"

[queries.employees]
table = "Pruebas.AllTables"
columns = ["BusinessEntityID"]

[queries.employees.filters]
PersonType = { string = "EM" }
EmailPromotion = 0

[queries.cpe]
table = "claro-test-332211.test.CPEHistoricData"

[queries.cpe.schema]
CPE = "integer"
Fecha = "timestamp"
"#;

#[test]
fn test_default_query_builds_expected_sql() {
    let (_dir, path) = write_config(REPORTS);
    let config = Config::load_from_file(&path).unwrap();

    assert_eq!(config.service.page_size, 500);
    assert_eq!(config.service.endpoint_url().unwrap().port(), Some(9050));

    let query = config.get_query(None).unwrap();
    let ResolvedQuery::Spec(spec) = query.resolve(config.service.project.as_deref()).unwrap() else {
        panic!("Expected a declarative query");
    };

    assert_eq!(
        QueryBuilder::build(&spec),
        "SELECT BusinessEntityID,rowguid,ModifiedDate FROM `test-project-350020.Pruebas.AllTables` WHERE PersonType='EM' ORDER BY ModifiedDate DESC LIMIT 20000"
    );
}

#[test]
fn test_typed_filters_are_quoted() {
    let (_dir, path) = write_config(REPORTS);
    let config = Config::load_from_file(&path).unwrap();

    let query = config.get_query(Some("employees")).unwrap();
    let ResolvedQuery::Spec(spec) = query.resolve(Some("test-project-350020")).unwrap() else {
        panic!("Expected a declarative query");
    };

    assert_eq!(
        QueryBuilder::build(&spec),
        "SELECT BusinessEntityID FROM `test-project-350020.Pruebas.AllTables` WHERE EmailPromotion=0 AND PersonType='EM'"
    );
}

#[test]
fn test_query_schema_is_read() {
    let (_dir, path) = write_config(REPORTS);
    let config = Config::load_from_file(&path).unwrap();

    let schema = config.get_query(Some("cpe")).unwrap().row_schema().unwrap();
    assert_eq!(schema.len(), 2);
    assert_eq!(schema.expected("CPE"), Some(ScalarType::Integer));
    assert_eq!(schema.expected("Fecha"), Some(ScalarType::Timestamp));
}

#[test]
fn test_unknown_named_query() {
    let (_dir, path) = write_config(REPORTS);
    let config = Config::load_from_file(&path).unwrap();
    assert!(config.get_query(Some("missing")).is_none());
}

#[test]
fn test_bad_direction_is_rejected() {
    let (_dir, path) = write_config(
        r#"
[queries.default]
table = "d.t"
direction = "sideways"
"#,
    );
    let err = Config::load_from_file(&path).unwrap_err();
    assert_eq!(err.category(), "Configuration Error");
}

#[tokio::test]
async fn test_partial_schema_reports_every_projected_column() {
    let (_dir, path) = write_config(
        r#"
[service]
project = "test-project-350020"

[queries.people]
table = "Pruebas.AllTables"
columns = ["BusinessEntityID", "rowguid", "ModifiedDate"]

[queries.people.schema]
rowguid = "string"
BusinessEntityID = "long"
"#,
    );
    let config = Config::load_from_file(&path).unwrap();
    let query = config.get_query(Some("people")).unwrap();
    let ResolvedQuery::Spec(spec) = query.resolve(config.service.project.as_deref()).unwrap() else {
        panic!("Expected a declarative query");
    };

    let table = MockTable::new(vec![
        FieldSchema::new("BusinessEntityID", "INTEGER"),
        FieldSchema::new("rowguid", "STRING"),
        FieldSchema::new("ModifiedDate", "TIMESTAMP"),
    ])
    .with_row(vec![json!("1"), json!("g"), json!("1.2377952E9")]);
    let service = Arc::new(MockQueryService::new().with_fallback(MockOutcome::Rows(table)));
    let executor = QueryExecutor::new(service);
    let options = RunOptions {
        schema: query.row_schema(),
        ..Default::default()
    };

    let mut reporter = Reporter::new(Vec::new(), OutputFormat::Text);
    executor.run_spec(&spec, &options, &mut reporter).await.unwrap();

    let output = String::from_utf8(reporter.into_inner()).unwrap();
    let lines: Vec<&str> = output.lines().collect();
    assert_eq!(lines[0], "BusinessEntityID\trowguid\tModifiedDate");
    assert_eq!(lines[2], "1\tg\t2009-03-23 08:00:00 UTC");
}

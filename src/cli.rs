//! Command-line argument parsing for bq-report.

use std::collections::BTreeMap;
use std::path::PathBuf;

use bq_report::config::{QueryConfig, ServiceConfig};
use bq_report::error::{ReportError, Result};
use bq_report::query::{Direction, FilterValue};
use bq_report::report::OutputFormat;
use bq_report::results::{RowSchema, ScalarType};
use clap::{Args, Parser, Subcommand};

/// Runs declarative queries against BigQuery and prints tabular reports.
#[derive(Parser, Debug)]
#[command(name = "bq-report")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Run a named query from the config file
    #[arg(short = 'q', long, value_name = "NAME")]
    pub query: Option<String>,

    /// Project that jobs run in
    #[arg(short = 'p', long, value_name = "PROJECT")]
    pub project: Option<String>,

    /// REST endpoint base URL (e.g. an emulator)
    #[arg(long, value_name = "URL")]
    pub endpoint: Option<String>,

    /// Processing location (e.g. US, EU)
    #[arg(long, value_name = "LOCATION")]
    pub location: Option<String>,

    /// Seconds to wait for job completion
    #[arg(short = 't', long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Output format: text or json
    #[arg(long, value_name = "FORMAT", default_value = "text")]
    pub output: String,

    /// Use the in-memory mock service
    #[arg(long)]
    pub mock: bool,

    /// JSON result fixture served by the mock service
    #[arg(long, value_name = "PATH", requires = "mock")]
    pub mock_fixture: Option<PathBuf>,

    /// Write logs to a file instead of stderr
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build and run a SELECT from flags
    Select(SelectArgs),

    /// Run a raw SQL statement
    Sql {
        /// The statement to run
        #[arg(value_name = "SQL")]
        sql: String,

        /// Expected column type, as COLUMN:TYPE (repeatable)
        #[arg(long = "schema", value_name = "COLUMN:TYPE")]
        schema: Vec<String>,
    },

    /// Stream JSON rows into a table
    Insert(InsertArgs),
}

#[derive(Args, Debug)]
pub struct SelectArgs {
    /// Dataset containing the table
    #[arg(long, value_name = "DATASET")]
    pub dataset: Option<String>,

    /// Table name or dataset.table / project.dataset.table path
    #[arg(long, value_name = "TABLE")]
    pub table: String,

    /// Comma-separated columns to select (default: all)
    #[arg(long, value_name = "COLUMNS", value_delimiter = ',')]
    pub columns: Vec<String>,

    /// Equality filter as COLUMN=LITERAL (repeatable)
    #[arg(long = "filter", value_name = "COLUMN=LITERAL")]
    pub filters: Vec<String>,

    /// Comma-separated columns to order by
    #[arg(long, value_name = "COLUMNS", value_delimiter = ',')]
    pub order_by: Vec<String>,

    /// Sort direction: asc or desc
    #[arg(long, value_name = "DIRECTION", default_value = "asc")]
    pub direction: String,

    /// Row limit (applies together with --order-by)
    #[arg(long, value_name = "N", default_value_t = 1000)]
    pub limit: u64,

    /// Expected column type, as COLUMN:TYPE (repeatable)
    #[arg(long = "schema", value_name = "COLUMN:TYPE")]
    pub schema: Vec<String>,
}

#[derive(Args, Debug)]
pub struct InsertArgs {
    /// Dataset containing the table
    #[arg(long, value_name = "DATASET")]
    pub dataset: Option<String>,

    /// Table name or dataset.table / project.dataset.table path
    #[arg(long, value_name = "TABLE")]
    pub table: String,

    /// Row as a JSON object (repeatable)
    #[arg(long = "row", value_name = "JSON", required = true)]
    pub rows: Vec<String>,

    /// Insert valid rows even if some are invalid
    #[arg(long)]
    pub skip_invalid_rows: bool,

    /// Ignore fields not in the table schema
    #[arg(long)]
    pub ignore_unknown_values: bool,
}

impl Cli {
    /// Parses command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Returns the config file path to use.
    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(bq_report::config::Config::default_path)
    }

    /// Parses the output format from the --output argument.
    pub fn parse_output_format(&self) -> Result<OutputFormat> {
        self.output.parse().map_err(ReportError::config)
    }

    /// Applies CLI overrides on top of the file configuration.
    pub fn apply_service_overrides(&self, service: &mut ServiceConfig) {
        if let Some(project) = &self.project {
            service.project = Some(project.clone());
        }
        if let Some(endpoint) = &self.endpoint {
            service.endpoint = endpoint.clone();
        }
        if let Some(location) = &self.location {
            service.location = Some(location.clone());
        }
        if let Some(timeout) = self.timeout {
            service.wait_timeout_secs = Some(timeout);
        }
    }
}

impl SelectArgs {
    /// Converts the flags into a query definition, as if read from config.
    pub fn to_query_config(&self) -> Result<QueryConfig> {
        let filters = self
            .filters
            .iter()
            .map(|f| parse_filter(f))
            .collect::<Result<BTreeMap<_, _>>>()?;
        let schema = self
            .schema
            .iter()
            .map(|s| parse_schema_entry(s))
            .collect::<Result<BTreeMap<_, _>>>()?;
        let direction: Direction = self.direction.parse().map_err(ReportError::config)?;

        Ok(QueryConfig {
            target_project: None,
            dataset: self.dataset.clone(),
            table: Some(self.table.clone()),
            columns: self.columns.clone(),
            filters,
            order_by: self.order_by.clone(),
            direction,
            limit: self.limit,
            schema,
            sql: None,
        })
    }
}

/// Parses `COLUMN=LITERAL`. The literal is inserted verbatim, so string
/// values need their own quotes: `PersonType='EM'`.
pub fn parse_filter(arg: &str) -> Result<(String, FilterValue)> {
    match arg.split_once('=') {
        Some((column, literal)) if !column.trim().is_empty() && !literal.trim().is_empty() => {
            Ok((column.trim().to_string(), FilterValue::raw(literal.trim())))
        }
        _ => Err(ReportError::config(format!(
            "Invalid filter '{arg}'. Expected COLUMN=LITERAL"
        ))),
    }
}

/// Parses `COLUMN:TYPE`.
pub fn parse_schema_entry(arg: &str) -> Result<(String, ScalarType)> {
    let (column, ty) = arg.rsplit_once(':').ok_or_else(|| {
        ReportError::config(format!("Invalid schema entry '{arg}'. Expected COLUMN:TYPE"))
    })?;
    let ty: ScalarType = ty.trim().parse().map_err(ReportError::config)?;
    Ok((column.trim().to_string(), ty))
}

/// Parses repeated `--schema` entries, keeping their order.
pub fn parse_row_schema(entries: &[String]) -> Result<Option<RowSchema>> {
    if entries.is_empty() {
        return Ok(None);
    }
    entries
        .iter()
        .map(|e| parse_schema_entry(e))
        .collect::<Result<RowSchema>>()
        .map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_args(args: &[&str]) -> Cli {
        Cli::parse_from(args)
    }

    #[test]
    fn test_parse_global_flags() {
        let cli = parse_args(&[
            "bq-report",
            "--project",
            "test-project-350020",
            "--timeout",
            "120",
            "--output",
            "json",
            "-q",
            "cpe",
        ]);

        assert_eq!(cli.project.as_deref(), Some("test-project-350020"));
        assert_eq!(cli.timeout, Some(120));
        assert_eq!(cli.query.as_deref(), Some("cpe"));
        assert_eq!(cli.parse_output_format().unwrap(), OutputFormat::Json);
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_parse_output_format_invalid() {
        let cli = parse_args(&["bq-report", "--output", "frames"]);
        assert!(matches!(
            cli.parse_output_format(),
            Err(ReportError::Config(_))
        ));
    }

    #[test]
    fn test_parse_select_subcommand() {
        let cli = parse_args(&[
            "bq-report",
            "select",
            "--dataset",
            "Pruebas",
            "--table",
            "AllTables",
            "--columns",
            "BusinessEntityID,rowguid,ModifiedDate",
            "--filter",
            "PersonType='EM'",
            "--order-by",
            "ModifiedDate",
            "--direction",
            "desc",
            "--limit",
            "20000",
            "--schema",
            "ModifiedDate:timestamp",
        ]);

        let Some(Command::Select(args)) = cli.command else {
            panic!("Expected select subcommand");
        };
        let query = args.to_query_config().unwrap();

        assert_eq!(query.columns, vec!["BusinessEntityID", "rowguid", "ModifiedDate"]);
        assert_eq!(query.filters["PersonType"], FilterValue::raw("'EM'"));
        assert_eq!(query.direction, Direction::Desc);
        assert_eq!(query.limit, 20000);
        assert_eq!(query.schema["ModifiedDate"], ScalarType::Timestamp);

        let table = query.table_ref(Some("test-project-350020")).unwrap();
        assert_eq!(table.qualified_name(), "test-project-350020.Pruebas.AllTables");
    }

    #[test]
    fn test_parse_sql_subcommand() {
        let cli = parse_args(&[
            "bq-report",
            "--mock",
            "sql",
            "SELECT 1 AS n",
            "--schema",
            "n:long",
        ]);

        assert!(cli.mock);
        match cli.command {
            Some(Command::Sql { sql, schema }) => {
                assert_eq!(sql, "SELECT 1 AS n");
                let schema = parse_row_schema(&schema).unwrap().unwrap();
                assert_eq!(schema.expected("n"), Some(ScalarType::Long));
            }
            other => panic!("Expected sql subcommand, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_insert_subcommand() {
        let cli = parse_args(&[
            "bq-report",
            "insert",
            "--dataset",
            "d",
            "--table",
            "vegetables",
            "--row",
            r#"{"id": 1, "name": "carrot"}"#,
            "--row",
            r#"{"id": 2, "name": "beans"}"#,
        ]);

        let Some(Command::Insert(args)) = cli.command else {
            panic!("Expected insert subcommand");
        };
        assert_eq!(args.rows.len(), 2);
        assert!(!args.skip_invalid_rows);
    }

    #[test]
    fn test_insert_requires_rows() {
        let result = Cli::try_parse_from(["bq-report", "insert", "--table", "d.t"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_mock_fixture_requires_mock() {
        let result = Cli::try_parse_from(["bq-report", "--mock-fixture", "rows.json"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_service_overrides() {
        let cli = parse_args(&[
            "bq-report",
            "--project",
            "cli-project",
            "--endpoint",
            "http://localhost:9050",
            "--timeout",
            "5",
        ]);
        let mut service = ServiceConfig {
            project: Some("file-project".to_string()),
            ..Default::default()
        };
        cli.apply_service_overrides(&mut service);

        assert_eq!(service.project.as_deref(), Some("cli-project"));
        assert_eq!(service.endpoint, "http://localhost:9050");
        assert_eq!(service.wait_timeout_secs, Some(5));
        assert!(service.location.is_none());
    }

    #[test]
    fn test_parse_filter() {
        assert_eq!(
            parse_filter("PersonType='EM'").unwrap(),
            ("PersonType".to_string(), FilterValue::raw("'EM'"))
        );
        assert_eq!(
            parse_filter("a = 1").unwrap(),
            ("a".to_string(), FilterValue::raw("1"))
        );
        assert!(parse_filter("missing").is_err());
        assert!(parse_filter("=1").is_err());
    }

    #[test]
    fn test_parse_schema_entry() {
        assert_eq!(
            parse_schema_entry("cpe:integer").unwrap(),
            ("cpe".to_string(), ScalarType::Integer)
        );
        assert!(parse_schema_entry("cpe").is_err());
        assert!(parse_schema_entry("cpe:decimal").is_err());
        assert!(parse_row_schema(&[]).unwrap().is_none());
    }
}

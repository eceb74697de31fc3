//! bq-report - run declarative queries against BigQuery and print reports.

mod cli;
mod logging;

use std::io;
use std::sync::Arc;

use anyhow::Context;
use bq_report::config::{Config, QueryConfig, ResolvedQuery};
use bq_report::error::ReportError;
use bq_report::insert::{InsertRequest, StreamingInserter};
use bq_report::query::{QueryExecutor, RunOptions, TableRef};
use bq_report::report::Reporter;
use bq_report::warehouse::{self, MockOutcome, MockQueryService, MockTable, QueryService};
use cli::{Cli, Command, InsertArgs};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

fn main() {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse_args();
    match &cli.log_file {
        Some(path) => logging::init_file_logging(path),
        None => logging::init_stderr_logging(),
    }

    if let Err(e) = run(cli) {
        let category = e
            .downcast_ref::<ReportError>()
            .map(ReportError::category)
            .unwrap_or("Error");
        error!("{}: {:#}", category, e);
        eprintln!("{}: {:#}", category, e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    runtime.block_on(execute(cli))
}

async fn execute(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config_path();
    info!("Loading config from: {}", config_path.display());
    let config = Config::load_from_file(&config_path)?;

    // Precedence: CLI > config file > environment.
    let mut service_config = config.service.clone();
    cli.apply_service_overrides(&mut service_config);
    service_config.apply_env_defaults();

    let service = build_service(&cli, &service_config)?;
    let format = cli.parse_output_format()?;
    let mut reporter = Reporter::new(io::stdout(), format);
    let project = service_config.project.as_deref();

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let executor = QueryExecutor::new(service.clone()).with_cancellation(cancel);
    let timeout = service_config.wait_timeout();

    match &cli.command {
        Some(Command::Select(args)) => {
            let query = args.to_query_config()?;
            run_query_config(&executor, &query, project, timeout, &mut reporter).await?;
        }
        Some(Command::Sql { sql, schema }) => {
            let options = RunOptions {
                schema: cli::parse_row_schema(schema)?,
                timeout,
            };
            executor.run(sql, &options, &mut reporter).await?;
        }
        Some(Command::Insert(args)) => {
            let request = insert_request(args, project)?;
            let summary = StreamingInserter::new(service).insert(request).await?;
            reporter.emit_insert_summary(&summary)?;
            summary.into_result()?;
        }
        None => {
            let name = cli.query.as_deref();
            let query = config.get_query(name).ok_or_else(|| match name {
                Some(name) => {
                    ReportError::config(format!("Query '{}' not found in config file", name))
                }
                None => ReportError::config(format!(
                    "No [queries.default] in {}. Use a subcommand or --query. See --help.",
                    config_path.display()
                )),
            })?;
            run_query_config(&executor, query, project, timeout, &mut reporter).await?;
        }
    }

    Ok(())
}

fn build_service(
    cli: &Cli,
    config: &bq_report::config::ServiceConfig,
) -> anyhow::Result<Arc<dyn QueryService>> {
    if !cli.mock {
        info!("Service: {}", config.display_string());
        return Ok(warehouse::connect(config)?);
    }

    info!("Using mock service");
    let mut mock = MockQueryService::new();
    if let Some(path) = &cli.mock_fixture {
        let table = MockTable::load(path)?;
        mock = mock.with_fallback(MockOutcome::Rows(table));
    }
    Ok(Arc::new(mock))
}

async fn run_query_config(
    executor: &QueryExecutor,
    query: &QueryConfig,
    project: Option<&str>,
    timeout: Option<std::time::Duration>,
    reporter: &mut Reporter<io::Stdout>,
) -> anyhow::Result<()> {
    let options = RunOptions {
        schema: query.row_schema(),
        timeout,
    };

    match query.resolve(project)? {
        ResolvedQuery::Spec(spec) => executor.run_spec(&spec, &options, reporter).await?,
        ResolvedQuery::Sql(sql) => executor.run(&sql, &options, reporter).await?,
    };
    Ok(())
}

fn insert_request(args: &InsertArgs, project: Option<&str>) -> anyhow::Result<InsertRequest> {
    let table =
        TableRef::from_parts(args.dataset.as_deref(), &args.table)?.with_default_project(project);

    let mut request = InsertRequest::new(table);
    request.skip_invalid_rows = args.skip_invalid_rows;
    request.ignore_unknown_values = args.ignore_unknown_values;
    for row in &args.rows {
        request = request.with_row(InsertRequest::parse_row(row)?);
    }
    Ok(request)
}

//! athena-audit - Athena statement runner and usage-metrics collector.

use athena_audit::cli::{self, BatchArgs, Cli, Command, MetricsArgs, QueryArgs};
use athena_audit::config::Config;
use athena_audit::error::{AuditError, Result};
use athena_audit::logging;
use athena_audit::metrics::{LocalUploader, MetricsCollector, S3Uploader, Uploader};
use athena_audit::query::QueryExecutor;
use athena_audit::service::ResultPage;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    let cli = Cli::parse_args();
    match &cli.log_file {
        Some(path) => logging::init_file_logging(path),
        None => logging::init_stderr_logging(),
    }

    if let Err(e) = run(cli).await {
        error!("{}: {}", e.category(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    let executor = QueryExecutor::connect(&config)?;

    match cli.command {
        Command::Query(args) => run_query(&executor, args).await,
        Command::Batch(args) => run_batch(&executor, args).await,
        Command::Partitions { table } => {
            for partition in executor.table_partitions(&table).await? {
                println!("{partition}");
            }
            Ok(())
        }
        Command::Metrics(args) => run_metrics(executor, &config, args).await,
    }
}

/// Builds the configuration with precedence:
/// 1. CLI arguments (highest)
/// 2. Config file
/// 3. Environment variables
fn load_config(cli: &Cli) -> Result<Config> {
    let config_path = cli.config_path();
    info!("Loading config from: {}", config_path.display());
    let mut config = Config::load_from_file(&config_path)?;

    config.athena.apply_env_defaults();
    cli.apply_overrides(&mut config);
    config.validate()?;
    Ok(config)
}

async fn run_query(executor: &QueryExecutor, args: QueryArgs) -> Result<()> {
    let page = match args.max_rows {
        Some(max_rows) => {
            let handle = executor.start(&args.sql).await?;
            executor.fetch_page(&handle, None, max_rows).await?
        }
        None => executor.execute(&args.sql, args.cache).await?,
    };

    if args.json {
        let json = serde_json::to_string_pretty(&page)
            .map_err(|e| AuditError::internal(format!("Failed to serialize rows: {e}")))?;
        println!("{json}");
    } else {
        print_table(&page);
    }
    Ok(())
}

fn print_table(page: &ResultPage) {
    if !page.columns.is_empty() {
        println!("{}", page.column_names().join("\t"));
    }
    for row in &page.rows {
        let values: Vec<&str> = row
            .iter()
            .map(|v| v.as_deref().unwrap_or("NULL"))
            .collect();
        println!("{}", values.join("\t"));
    }
}

async fn run_batch(executor: &QueryExecutor, args: BatchArgs) -> Result<()> {
    let statements = cli::read_statements(&args.file)?;
    info!("Read {} statements from {}", statements.len(), args.file.display());

    // Fails with BatchFailed unless every statement succeeded
    let outcome = executor.execute_all(statements, args.pool).await?;
    println!("{} statements succeeded", outcome.succeeded);
    Ok(())
}

async fn run_metrics(executor: QueryExecutor, config: &Config, args: MetricsArgs) -> Result<()> {
    let uploader: Arc<dyn Uploader> = match (args.output_dir, &config.metrics.destination_bucket) {
        (Some(dir), _) => Arc::new(LocalUploader::new(dir)),
        (None, Some(bucket)) => {
            Arc::new(S3Uploader::connect(config.athena.region(), bucket.clone()).await)
        }
        (None, None) => {
            return Err(AuditError::config(
                "metrics needs --bucket, --output-dir or [metrics].destination_bucket",
            ))
        }
    };

    let collector = MetricsCollector::new(executor, config.metrics.clone(), uploader);
    let report = collector.collect(chrono::Local::now().date_naive()).await?;

    for file in &report.files {
        println!("{file}");
    }
    info!(
        "{} of {} executions written, {} chunks failed",
        report.executions, report.query_ids, report.failed_chunks
    );
    Ok(())
}

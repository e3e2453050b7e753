//! Command-line argument parsing for athena-audit.

use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::{AuditError, Result};

/// Runs Athena statements and collects Athena usage metrics.
#[derive(Parser, Debug)]
#[command(name = "athena-audit")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// S3 folder for raw results (e.g., s3://bucket/staging/)
    #[arg(long, value_name = "S3_URL", global = true)]
    pub staging: Option<String>,

    /// AWS region
    #[arg(long, value_name = "REGION", global = true)]
    pub region: Option<String>,

    /// Write logs to this file instead of stderr
    #[arg(long, value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one statement and print its rows
    Query(QueryArgs),
    /// Run the statements of a file concurrently
    Batch(BatchArgs),
    /// List the partitions of a table
    Partitions {
        /// Table name, optionally prefixed by its database
        #[arg(value_name = "TABLE")]
        table: String,
    },
    /// Collect usage statistics of recent executions
    Metrics(MetricsArgs),
}

#[derive(Args, Debug)]
pub struct QueryArgs {
    /// Statement to run
    #[arg(value_name = "SQL")]
    pub sql: String,

    /// Allow the service to reuse an earlier identical request
    #[arg(long)]
    pub cache: bool,

    /// Fetch only the first N rows
    #[arg(long, value_name = "N")]
    pub max_rows: Option<usize>,

    /// Print rows as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct BatchArgs {
    /// File with one statement per line
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Number of concurrent workers
    #[arg(long, value_name = "N")]
    pub pool: Option<usize>,
}

#[derive(Args, Debug)]
pub struct MetricsArgs {
    /// Destination bucket (overrides [metrics].destination_bucket)
    #[arg(long, short = 'b', value_name = "BUCKET")]
    pub bucket: Option<String>,

    /// Write files below this directory instead of uploading
    #[arg(long, value_name = "DIR", conflicts_with = "bucket")]
    pub output_dir: Option<PathBuf>,
}

impl Cli {
    /// Parses command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Returns the config file path to use.
    ///
    /// Uses the --config argument if provided, otherwise the default path.
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(Config::default_path)
    }

    /// Overrides file and environment settings with CLI flags.
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(staging) = &self.staging {
            config.athena.staging_location = Some(staging.clone());
        }
        if let Some(region) = &self.region {
            config.athena.region = Some(region.clone());
        }
        if let Command::Metrics(args) = &self.command {
            if let Some(bucket) = &args.bucket {
                config.metrics.destination_bucket = Some(bucket.clone());
            }
        }
    }
}

/// Reads the statements of a batch file.
///
/// Each non-empty line is one statement; lines starting with `--` are skipped.
pub fn read_statements(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| AuditError::io(format!("Failed to read {}: {e}", path.display())))?;
    Ok(parse_statements(&content))
}

fn parse_statements(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("--"))
        .map(|line| line.trim_end_matches(';').trim_end().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_args(args: &[&str]) -> Cli {
        Cli::parse_from(args)
    }

    #[test]
    fn test_parse_query() {
        let cli = parse_args(&["athena-audit", "query", "SELECT 1", "--cache", "--max-rows", "10"]);
        match cli.command {
            Command::Query(args) => {
                assert_eq!(args.sql, "SELECT 1");
                assert!(args.cache);
                assert_eq!(args.max_rows, Some(10));
                assert!(!args.json);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = parse_args(&[
            "athena-audit",
            "partitions",
            "logs.events",
            "--staging",
            "s3://bucket/staging/",
            "--region",
            "eu-west-1",
        ]);
        assert_eq!(cli.staging.as_deref(), Some("s3://bucket/staging/"));
        assert_eq!(cli.region.as_deref(), Some("eu-west-1"));
    }

    #[test]
    fn test_parse_config_path() {
        let cli = parse_args(&["athena-audit", "--config", "/path/to/config.toml", "partitions", "t"]);
        assert_eq!(cli.config_path(), PathBuf::from("/path/to/config.toml"));
    }

    #[test]
    fn test_overrides_take_precedence() {
        let cli = parse_args(&[
            "athena-audit",
            "--staging",
            "s3://cli/",
            "metrics",
            "--bucket",
            "cli-bucket",
        ]);
        let mut config = Config::default();
        config.athena.staging_location = Some("s3://file/".to_string());
        config.metrics.destination_bucket = Some("file-bucket".to_string());

        cli.apply_overrides(&mut config);

        assert_eq!(config.athena.staging_location.as_deref(), Some("s3://cli/"));
        assert_eq!(config.athena.region(), "us-west-2");
        assert_eq!(config.metrics.destination_bucket.as_deref(), Some("cli-bucket"));
    }

    #[test]
    fn test_metrics_bucket_conflicts_with_output_dir() {
        let result = Cli::try_parse_from([
            "athena-audit",
            "metrics",
            "--bucket",
            "b",
            "--output-dir",
            "/tmp/out",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_statements_skips_comments_and_blanks() {
        let content = "-- repair all tables\nMSCK REPAIR TABLE a;\n\n  MSCK REPAIR TABLE b  \n--done\n";
        assert_eq!(
            parse_statements(content),
            vec!["MSCK REPAIR TABLE a", "MSCK REPAIR TABLE b"]
        );
    }

    #[test]
    fn test_read_statements_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_statements(&dir.path().join("absent.sql")).unwrap_err();
        assert_eq!(err.category(), "I/O Error");
    }
}

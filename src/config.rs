//! Configuration management for athena-audit.
//!
//! Handles loading configuration from TOML files and environment variables:
//! the Athena target, polling and retry parameters, and the usage-metrics job.

use crate::error::{AuditError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Region used when neither the config file nor the environment names one.
pub const DEFAULT_REGION: &str = "us-west-2";

/// Largest page the service returns per result request.
pub const MAX_PAGE_SIZE: usize = 1000;

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Remote service target.
    #[serde(default)]
    pub athena: AthenaConfig,

    /// Polling and retry behavior.
    #[serde(default)]
    pub polling: PollingConfig,

    /// Usage-metrics collection job.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Remote service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AthenaConfig {
    /// AWS region, fixed for the lifetime of the process.
    ///
    /// Unset until the file, the environment or the CLI names one; see
    /// [`AthenaConfig::region`] for the effective value.
    pub region: Option<String>,

    /// `s3://` folder where the service writes raw results.
    pub staging_location: Option<String>,

    /// Optional workgroup statements run in.
    pub workgroup: Option<String>,

    /// Default number of batch workers.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// Rows requested per page when collecting full results.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

fn default_pool_size() -> usize {
    5
}

fn default_page_size() -> usize {
    MAX_PAGE_SIZE
}

impl Default for AthenaConfig {
    fn default() -> Self {
        Self {
            region: None,
            staging_location: None,
            workgroup: None,
            pool_size: default_pool_size(),
            page_size: default_page_size(),
        }
    }
}

impl AthenaConfig {
    /// Applies `ATHENA_STAGING_DIR` and `AWS_REGION`/`AWS_DEFAULT_REGION` as defaults.
    ///
    /// Values already set (by the config file) are kept.
    pub fn apply_env_defaults(&mut self) {
        self.apply_defaults_from(|key| std::env::var(key).ok());
    }

    fn apply_defaults_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.is_empty());
        if self.staging_location.is_none() {
            self.staging_location = non_empty("ATHENA_STAGING_DIR");
        }
        if self.region.is_none() {
            self.region = non_empty("AWS_REGION").or_else(|| non_empty("AWS_DEFAULT_REGION"));
        }
    }

    /// Returns the configured region, or [`DEFAULT_REGION`].
    pub fn region(&self) -> &str {
        self.region.as_deref().unwrap_or(DEFAULT_REGION)
    }

    /// Returns the staging location, which every execution path requires.
    pub fn staging_location(&self) -> Result<&str> {
        self.staging_location.as_deref().ok_or_else(|| {
            AuditError::config(
                "staging_location is required (set [athena].staging_location, ATHENA_STAGING_DIR or --staging)",
            )
        })
    }
}

/// Polling and retry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Pause between status queries while an execution is queued or running.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Consecutive failed status queries tolerated before forcing FAILED.
    #[serde(default = "default_max_status_errors")]
    pub max_status_errors: u32,

    /// Attempts per statement in batch execution.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Back-off after attempt `n` is `n * n` of these units.
    #[serde(default = "default_backoff_unit_ms")]
    pub backoff_unit_ms: u64,
}

fn default_interval_ms() -> u64 {
    500
}

fn default_max_status_errors() -> u32 {
    3
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_unit_ms() -> u64 {
    1000
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            max_status_errors: default_max_status_errors(),
            max_attempts: default_max_attempts(),
            backoff_unit_ms: default_backoff_unit_ms(),
        }
    }
}

impl PollingConfig {
    /// Same retry budgets as the default, with no waiting at all.
    pub fn immediate() -> Self {
        Self {
            interval_ms: 0,
            backoff_unit_ms: 0,
            ..Self::default()
        }
    }

    /// Pause between status queries.
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Back-off after the given 1-indexed attempt.
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let units = u64::from(attempt).saturating_mul(u64::from(attempt));
        Duration::from_millis(self.backoff_unit_ms.saturating_mul(units))
    }
}

/// Usage-metrics job configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Table holding the CloudTrail audit log.
    #[serde(default = "default_cloudtrail_table")]
    pub cloudtrail_table: String,

    /// How many days back to look for executions.
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,

    /// Execution ids per statistics call.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Key prefix for uploaded CSV files.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Bucket receiving the CSV files.
    pub destination_bucket: Option<String>,
}

fn default_cloudtrail_table() -> String {
    "default.\"cloudtrail_logs\"".to_string()
}

fn default_lookback_days() -> u32 {
    1
}

fn default_batch_size() -> usize {
    crate::service::MAX_STATS_BATCH
}

fn default_key_prefix() -> String {
    "athena-metrics".to_string()
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            cloudtrail_table: default_cloudtrail_table(),
            lookback_days: default_lookback_days(),
            batch_size: default_batch_size(),
            key_prefix: default_key_prefix(),
            destination_bucket: None,
        }
    }
}

/// Checks that `location` is an `s3://bucket/...` URL.
pub fn validate_staging_location(location: &str) -> Result<()> {
    let url = Url::parse(location)
        .map_err(|e| AuditError::config(format!("Invalid staging location '{location}': {e}")))?;

    if url.scheme() != "s3" {
        return Err(AuditError::config(format!(
            "Invalid scheme '{}' in staging location. Expected 's3'",
            url.scheme()
        )));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(AuditError::config(format!(
            "Staging location '{location}' has no bucket"
        )));
    }
    Ok(())
}

impl Config {
    /// Returns the default config file path for the current platform.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("athena-audit")
            .join("config.toml")
    }

    /// Loads configuration from a TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| AuditError::config(format!("Failed to read config file: {e}")))?;

        Self::parse_toml(&content, path)
    }

    /// Parses configuration from a TOML string.
    fn parse_toml(content: &str, path: &Path) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            AuditError::config(format!(
                "Configuration error in {}:\n  {}",
                path.display(),
                e
            ))
        })
    }

    /// Checks value ranges and the staging location format.
    pub fn validate(&self) -> Result<()> {
        if let Some(location) = &self.athena.staging_location {
            validate_staging_location(location)?;
        }
        if self.athena.pool_size == 0 {
            return Err(AuditError::config("athena.pool_size must be at least 1"));
        }
        if !(1..=MAX_PAGE_SIZE).contains(&self.athena.page_size) {
            return Err(AuditError::config(format!(
                "athena.page_size must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }
        if self.polling.max_attempts == 0 {
            return Err(AuditError::config("polling.max_attempts must be at least 1"));
        }
        if !(1..=crate::service::MAX_STATS_BATCH).contains(&self.metrics.batch_size) {
            return Err(AuditError::config(format!(
                "metrics.batch_size must be between 1 and {}",
                crate::service::MAX_STATS_BATCH
            )));
        }
        Ok(())
    }
}

//! Athena usage metrics.
//!
//! Finds the executions started in the lookback window through the CloudTrail
//! audit log, fetches their usage statistics in chunks, and writes one CSV
//! file per chunk below `<key_prefix>/<year>/<month>/<day>/`.

mod upload;

pub use upload::{LocalUploader, S3Uploader, Uploader};

use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::MetricsConfig;
use crate::error::Result;
use crate::query::QueryExecutor;
use crate::service::{ExecutionStats, ResultPage};

/// Placeholder for values the service did not report.
const MISSING: &str = "null";

/// Builds the audit-log query listing execution ids started in the last
/// `lookback_days` days.
pub fn cloudtrail_query(table: &str, lookback_days: u32) -> String {
    format!(
        "SELECT query_id, uid, role, dt FROM (\
         SELECT json_extract(responseelements, '$.queryExecutionId') AS query_id, \
         useridentity.arn AS uid, \
         useridentity.sessioncontext.sessionissuer.username AS role, \
         from_iso8601_timestamp(eventtime) AS dt \
         FROM {table} \
         WHERE eventsource = 'athena.amazonaws.com' \
         AND eventname = 'StartQueryExecution' \
         AND json_extract(responseelements, '$.queryExecutionId') IS NOT NULL) \
         WHERE dt > date_add('day', -{lookback_days}, now())"
    )
}

/// Takes the execution ids from the first column, dropping JSON quotes.
pub fn extract_query_ids(page: &ResultPage) -> Vec<String> {
    page.first_column()
        .map(|value| value.trim_matches('"'))
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}

/// Renders one CSV line (without newline) for `stats`.
pub fn csv_line(stats: &ExecutionStats) -> String {
    fn or_missing<T: ToString>(value: &Option<T>) -> String {
        value
            .as_ref()
            .map_or_else(|| MISSING.to_string(), T::to_string)
    }

    [
        stats.execution_id.clone(),
        or_missing(&stats.database),
        or_missing(&stats.engine_execution_ms),
        or_missing(&stats.data_scanned_bytes),
        stats.state.clone(),
        or_missing(&stats.submitted_at),
        or_missing(&stats.completed_at),
    ]
    .join(",")
}

/// Object key of chunk `index` collected on `date`.
pub fn object_key(prefix: &str, date: NaiveDate, index: usize) -> String {
    format!(
        "{}/{}/{}/{}/out{}.csv",
        prefix.trim_end_matches('/'),
        date.year(),
        date.month(),
        date.day(),
        index
    )
}

/// Summary of one collection run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsReport {
    /// Execution ids found in the audit log.
    pub query_ids: usize,
    /// Executions written to CSV.
    pub executions: usize,
    /// Destinations of the written files, in chunk order.
    pub files: Vec<String>,
    /// Chunks whose statistics could not be fetched.
    pub failed_chunks: usize,
}

/// Runs the metrics collection job.
pub struct MetricsCollector {
    executor: QueryExecutor,
    config: MetricsConfig,
    uploader: Arc<dyn Uploader>,
}

impl MetricsCollector {
    pub fn new(executor: QueryExecutor, config: MetricsConfig, uploader: Arc<dyn Uploader>) -> Self {
        Self {
            executor,
            config,
            uploader,
        }
    }

    /// Collects statistics and writes the files dated `date`.
    ///
    /// A chunk whose statistics call fails still produces an (empty) file.
    /// Upload failures abort the run.
    pub async fn collect(&self, date: NaiveDate) -> Result<MetricsReport> {
        let query = cloudtrail_query(&self.config.cloudtrail_table, self.config.lookback_days);
        let page = self.executor.execute(&query, false).await?;
        let ids = extract_query_ids(&page);
        info!("Found {} executions in {}", ids.len(), self.config.cloudtrail_table);

        let mut report = MetricsReport {
            query_ids: ids.len(),
            ..MetricsReport::default()
        };

        for (index, chunk) in ids.chunks(self.config.batch_size.max(1)).enumerate() {
            let mut body = String::new();
            match self.executor.execution_stats(chunk).await {
                Ok(stats) => {
                    for entry in &stats {
                        body.push_str(&csv_line(entry));
                        body.push('\n');
                    }
                    report.executions += stats.len();
                }
                Err(e) => {
                    warn!("Statistics for chunk {} failed: {}", index, e);
                    report.failed_chunks += 1;
                }
            }

            let key = object_key(&self.config.key_prefix, date, index);
            let destination = self.uploader.upload(&key, body.into_bytes()).await?;
            report.files.push(destination);
        }

        info!(
            "Wrote {} executions to {} files ({} chunks failed)",
            report.executions,
            report.files.len(),
            report.failed_chunks
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ClientManager, MockClientFactory};
    use crate::config::{Config, PollingConfig};
    use crate::service::{ColumnInfo, MockQueryService};

    fn stats(id: &str) -> ExecutionStats {
        ExecutionStats {
            execution_id: id.to_string(),
            database: Some("default".to_string()),
            engine_execution_ms: Some(1200),
            data_scanned_bytes: Some(4096),
            state: "SUCCEEDED".to_string(),
            submitted_at: Some("2024-03-07T10:00:00Z".to_string()),
            completed_at: Some("2024-03-07T10:00:02Z".to_string()),
        }
    }

    fn audit_service(ids: &[&str]) -> MockQueryService {
        let rows = ids.iter().map(|id| vec![Some(format!("\"{id}\""))]).collect();
        let mut service = MockQueryService::new().with_result(
            "cloudtrail_logs",
            vec![ColumnInfo::new("query_id", "json")],
            rows,
        );
        for id in ids {
            service = service.with_stats(stats(id));
        }
        service
    }

    fn collector(service: MockQueryService, root: &std::path::Path, batch_size: usize) -> MetricsCollector {
        let factory = Arc::new(MockClientFactory::new(service));
        let mut config = Config::default();
        config.athena.staging_location = Some("s3://staging/".to_string());
        config.polling = PollingConfig::immediate();
        config.metrics.batch_size = batch_size;
        let executor = QueryExecutor::new(Arc::new(ClientManager::new(factory)), &config).unwrap();
        MetricsCollector::new(executor, config.metrics, Arc::new(LocalUploader::new(root)))
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 7).unwrap()
    }

    #[test]
    fn test_cloudtrail_query_mentions_window() {
        let query = cloudtrail_query("default.\"cloudtrail_logs\"", 3);
        assert!(query.starts_with("SELECT"));
        assert!(query.contains("FROM default.\"cloudtrail_logs\""));
        assert!(query.contains("date_add('day', -3, now())"));
    }

    #[test]
    fn test_csv_line_uses_null_for_missing() {
        let mut entry = stats("q-1");
        entry.database = None;
        entry.completed_at = None;
        assert_eq!(
            csv_line(&entry),
            "q-1,null,1200,4096,SUCCEEDED,2024-03-07T10:00:00Z,null"
        );
    }

    #[test]
    fn test_object_key_is_unpadded() {
        assert_eq!(
            object_key("athena-metrics/", date(), 2),
            "athena-metrics/2024/3/7/out2.csv"
        );
    }

    #[test]
    fn test_extract_query_ids_skips_empty() {
        let page = ResultPage::with_data(
            vec![ColumnInfo::new("query_id", "json")],
            vec![
                vec![Some("\"a\"".to_string())],
                vec![None],
                vec![Some("\"\"".to_string())],
                vec![Some("b".to_string())],
            ],
        );
        assert_eq!(extract_query_ids(&page), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_collect_writes_one_file_per_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let collector = collector(audit_service(&["q1", "q2", "q3"]), dir.path(), 2);

        let report = collector.collect(date()).await.unwrap();

        assert_eq!(report.query_ids, 3);
        assert_eq!(report.executions, 3);
        assert_eq!(report.files.len(), 2);
        assert_eq!(report.failed_chunks, 0);

        let first =
            std::fs::read_to_string(dir.path().join("athena-metrics/2024/3/7/out0.csv")).unwrap();
        assert_eq!(first.lines().count(), 2);
        assert!(first.starts_with("q1,default,1200,4096,SUCCEEDED,"));
    }

    #[tokio::test]
    async fn test_failed_chunk_produces_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let collector = collector(audit_service(&["q1", "q2"]).with_stats_failures(1), dir.path(), 1);

        let report = collector.collect(date()).await.unwrap();

        assert_eq!(report.failed_chunks, 1);
        assert_eq!(report.executions, 1);
        let empty =
            std::fs::read_to_string(dir.path().join("athena-metrics/2024/3/7/out0.csv")).unwrap();
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn test_no_executions_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let collector = collector(audit_service(&[]), dir.path(), 50);

        let report = collector.collect(date()).await.unwrap();

        assert_eq!(report, MetricsReport::default());
    }
}

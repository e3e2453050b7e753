//! Usage-metrics collection over the mock service.

use super::common::{mock_executor, test_config};
use athena_audit::metrics::{LocalUploader, MetricsCollector};
use athena_audit::service::{ColumnInfo, ExecutionStats, MockQueryService};
use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn stats(id: &str, scanned: Option<i64>) -> ExecutionStats {
    ExecutionStats {
        execution_id: id.to_string(),
        database: Some("cloudtrail".to_string()),
        engine_execution_ms: Some(830),
        data_scanned_bytes: scanned,
        state: "SUCCEEDED".to_string(),
        submitted_at: Some("2024-11-02T08:15:00Z".to_string()),
        completed_at: None,
    }
}

#[tokio::test]
async fn test_collect_writes_dated_csv_files() {
    let ids: Vec<String> = (0..120).map(|i| format!("exec-{i:03}")).collect();
    let mut service = MockQueryService::new().with_result(
        "StartQueryExecution",
        vec![ColumnInfo::new("query_id", "json")],
        ids.iter().map(|id| vec![Some(format!("\"{id}\""))]).collect(),
    );
    for id in &ids {
        service = service.with_stats(stats(id, Some(2048)));
    }
    let (_, executor) = mock_executor(service);

    let dir = tempfile::tempdir().unwrap();
    let collector = MetricsCollector::new(
        executor,
        test_config().metrics,
        Arc::new(LocalUploader::new(dir.path())),
    );
    let date = NaiveDate::from_ymd_opt(2024, 11, 2).unwrap();

    let report = collector.collect(date).await.unwrap();

    assert_eq!(report.query_ids, 120);
    assert_eq!(report.executions, 120);
    assert_eq!(report.failed_chunks, 0);
    assert_eq!(report.files.len(), 3);

    let day = dir.path().join("athena-metrics/2024/11/2");
    let last = std::fs::read_to_string(day.join("out2.csv")).unwrap();
    assert_eq!(last.lines().count(), 20);
    assert_eq!(
        last.lines().next(),
        Some("exec-100,cloudtrail,830,2048,SUCCEEDED,2024-11-02T08:15:00Z,null")
    );
}

#[tokio::test]
async fn test_unknown_ids_are_left_out() {
    let service = MockQueryService::new()
        .with_result(
            "StartQueryExecution",
            vec![ColumnInfo::new("query_id", "json")],
            vec![
                vec![Some("\"known\"".to_string())],
                vec![Some("\"expired\"".to_string())],
            ],
        )
        .with_stats(stats("known", None));
    let (_, executor) = mock_executor(service);

    let dir = tempfile::tempdir().unwrap();
    let collector = MetricsCollector::new(
        executor,
        test_config().metrics,
        Arc::new(LocalUploader::new(dir.path())),
    );

    let report = collector
        .collect(NaiveDate::from_ymd_opt(2024, 1, 9).unwrap())
        .await
        .unwrap();

    assert_eq!(report.query_ids, 2);
    assert_eq!(report.executions, 1);
    let content =
        std::fs::read_to_string(dir.path().join("athena-metrics/2024/1/9/out0.csv")).unwrap();
    assert_eq!(
        content,
        "known,cloudtrail,830,null,SUCCEEDED,2024-11-02T08:15:00Z,null\n"
    );
}

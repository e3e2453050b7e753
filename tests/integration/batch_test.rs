//! Concurrent batch execution over the mock service.

use super::common::{mock_executor, mock_executor_with, test_config};
use athena_audit::error::AuditError;
use athena_audit::service::{ExecutionState, MockQueryService};
use pretty_assertions::assert_eq;

fn repair_statements(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("MSCK REPAIR TABLE logs_{i:02}")).collect()
}

#[tokio::test]
async fn test_all_statements_succeed() {
    let (factory, executor) = mock_executor(MockQueryService::new().with_running_polls(2));

    let outcome = executor.execute_all(repair_statements(20), Some(4)).await.unwrap();

    assert_eq!(
        (outcome.submitted, outcome.succeeded, outcome.failed, outcome.verdict),
        (20, 20, 0, true)
    );
    assert_eq!(factory.service().execution_count(), 20);
    assert!(factory.total_created() <= 4);
}

#[tokio::test]
async fn test_one_persistent_failure_fails_the_batch() {
    let service =
        MockQueryService::new().with_outcome("logs_07", ExecutionState::Failed, Some("HIVE_BAD_DATA"));
    let (factory, executor) = mock_executor(service);

    let err = executor
        .execute_all(repair_statements(10), Some(3))
        .await
        .unwrap_err();

    match err {
        AuditError::BatchFailed {
            submitted,
            succeeded,
            failed,
        } => assert_eq!((submitted, succeeded, failed), (10, 9, 1)),
        other => panic!("expected BatchFailed, got {other:?}"),
    }
    assert_eq!(factory.service().submissions("MSCK REPAIR TABLE logs_07"), 3);
    assert_eq!(factory.service().submissions("MSCK REPAIR TABLE logs_03"), 1);
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let (factory, executor) = mock_executor(MockQueryService::new().with_failed_attempts(1));

    let outcome = executor.execute_all(repair_statements(6), Some(2)).await.unwrap();

    assert_eq!(outcome.succeeded, 6);
    for statement in repair_statements(6) {
        assert_eq!(factory.service().submissions(&statement), 2);
    }
}

#[tokio::test]
async fn test_pool_larger_than_batch() {
    let (factory, executor) = mock_executor(MockQueryService::new());

    let outcome = executor.execute_all(repair_statements(2), Some(16)).await.unwrap();

    assert_eq!(outcome.succeeded, 2);
    assert!(factory.total_created() <= 2);
}

#[tokio::test]
async fn test_empty_batch() {
    let (factory, executor) = mock_executor(MockQueryService::new());

    let outcome = executor.execute_all(Vec::new(), None).await.unwrap();

    assert!(outcome.verdict);
    assert_eq!(outcome.submitted, 0);
    assert_eq!(factory.total_created(), 0);
}

#[tokio::test]
async fn test_single_attempt_budget() {
    let mut config = test_config();
    config.polling.max_attempts = 1;
    let (factory, executor) =
        mock_executor_with(MockQueryService::new().with_failed_attempts(1), &config);

    let result = executor.execute_all(repair_statements(3), Some(3)).await;

    assert!(matches!(
        result,
        Err(AuditError::BatchFailed { succeeded: 0, failed: 3, .. })
    ));
    assert_eq!(factory.service().execution_count(), 3);
}

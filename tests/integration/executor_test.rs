//! Single-statement execution over the mock service.

use super::common::{mock_executor, mock_executor_with, rows, test_config};
use athena_audit::client::WorkerId;
use athena_audit::error::AuditError;
use athena_audit::service::{
    ColumnInfo, ExecutionState, MockFault, MockQueryService, ResultPage, StatusSource,
};
use futures::TryStreamExt;
use pretty_assertions::assert_eq;

const EMAILS: [&str; 5] = [
    "a@example.com",
    "b@example.com",
    "c@example.com",
    "d@example.com",
    "e@example.com",
];

fn users_service() -> MockQueryService {
    MockQueryService::new()
        .with_result(
            "users",
            vec![ColumnInfo::new("email", "varchar")],
            rows(&EMAILS),
        )
        .with_running_polls(3)
}

#[tokio::test]
async fn test_execute_collects_all_pages_without_header() {
    let mut config = test_config();
    config.athena.page_size = 2;
    let (factory, executor) = mock_executor_with(users_service(), &config);

    let page = executor.execute("SELECT email FROM users", false).await.unwrap();

    assert_eq!(
        page,
        ResultPage::with_data(
            vec![ColumnInfo::new("email", "varchar")],
            rows(&EMAILS),
        )
    );
    // header + 5 rows in pages of 2
    assert_eq!(factory.service().page_requests().len(), 3);
    assert_eq!(factory.created_for(WorkerId::MAIN), 1);
}

#[tokio::test]
async fn test_manual_pagination_matches_full_result() {
    let (_, executor) = mock_executor(users_service());

    let handle = executor.start("SELECT email FROM users").await.unwrap();
    let first = executor.fetch_page(&handle, None, 2).await.unwrap();
    let token = first.next_token.clone().unwrap();
    let rest = executor.fetch_page(&handle, Some(&token), 10).await.unwrap();

    assert_eq!(first.rows, rows(&["a@example.com", "b@example.com"]));
    assert_eq!(rest.rows, rows(&["c@example.com", "d@example.com", "e@example.com"]));
    assert_eq!(rest.next_token, None);
}

#[tokio::test]
async fn test_page_stream_over_started_execution() {
    let (_, executor) = mock_executor(users_service());

    let handle = executor.start("SELECT email FROM users").await.unwrap();
    let pages: Vec<ResultPage> = executor.page_stream(handle, 2).try_collect().await.unwrap();

    assert_eq!(pages.len(), 3);
    assert_eq!(pages.iter().map(ResultPage::row_count).sum::<usize>(), 5);
}

#[tokio::test]
async fn test_failed_statement_reports_reason() {
    let service = MockQueryService::new().with_outcome(
        "nonexistent",
        ExecutionState::Failed,
        Some("SYNTAX_ERROR: line 1:15: Table nonexistent does not exist"),
    );
    let (_, executor) = mock_executor(service);

    let err = executor
        .execute("SELECT * FROM nonexistent", false)
        .await
        .unwrap_err();

    let AuditError::QueryFailed(status) = err else {
        panic!("expected QueryFailed, got {err:?}");
    };
    assert_eq!(status.state, ExecutionState::Failed);
    assert_eq!(status.statement_kind, "SELECT");
    assert!(status
        .failure_reason
        .as_deref()
        .is_some_and(|r| r.contains("does not exist")));
}

#[tokio::test]
async fn test_unreadable_status_is_explicit_failure() {
    let service = MockQueryService::new().with_persistent_status_fault(MockFault::Transport);
    let (factory, executor) = mock_executor(service);

    let handle = executor.start("SELECT 1").await.unwrap();
    let status = executor.await_completion(&handle).await;

    assert!(!status.success());
    assert_eq!(status.source, StatusSource::TransportExhausted { errors: 4 });
    assert_eq!(factory.service().status_calls(), 4);
}

#[tokio::test]
async fn test_expired_credentials_are_renewed_mid_poll() {
    let service = MockQueryService::new()
        .with_running_polls(2)
        .with_status_faults([MockFault::CredentialExpired, MockFault::CredentialExpired]);
    let (factory, executor) = mock_executor(service);

    let page = executor.execute("SHOW TABLES", false).await.unwrap();

    assert!(page.is_empty());
    assert_eq!(factory.created_for(WorkerId::MAIN), 3);
}

#[tokio::test]
async fn test_dedup_reuses_execution() {
    let (factory, executor) = mock_executor(users_service());

    let first = executor.execute("SELECT email FROM users", true).await.unwrap();
    let second = executor.execute("SELECT email FROM users", true).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(factory.service().execution_count(), 1);
}

#[tokio::test]
async fn test_table_partitions() {
    let service = MockQueryService::new().with_result(
        "PARTITIONS",
        vec![ColumnInfo::new("partition", "string")],
        rows(&["year=2024/month=2", "year=2023/month=12", "year=2024/month=1"]),
    );
    let (_, executor) = mock_executor(service);

    let partitions = executor.table_partitions("cloudtrail.events").await.unwrap();

    assert_eq!(
        partitions,
        vec!["year=2023/month=12", "year=2024/month=1", "year=2024/month=2"]
    );
}

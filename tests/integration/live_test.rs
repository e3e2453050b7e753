//! Tests against the real service.
//!
//! Require AWS credentials and `ATHENA_STAGING_DIR`.

use athena_audit::config::Config;
use athena_audit::query::QueryExecutor;

fn live_executor() -> Option<QueryExecutor> {
    let mut config = Config::default();
    config.athena.apply_env_defaults();
    config.athena.staging_location.as_ref()?;
    QueryExecutor::connect(&config).ok()
}

#[tokio::test]
async fn test_live_select_literal() {
    let Some(executor) = live_executor() else {
        eprintln!("Skipping test: ATHENA_STAGING_DIR not set");
        return;
    };

    let page = executor
        .execute("SELECT 1 AS num, 'hello' AS greeting", false)
        .await
        .unwrap();

    assert_eq!(page.column_names(), vec!["num", "greeting"]);
    assert_eq!(
        page.rows,
        vec![vec![Some("1".to_string()), Some("hello".to_string())]]
    );
}

#[tokio::test]
async fn test_live_failed_statement() {
    let Some(executor) = live_executor() else {
        eprintln!("Skipping test: ATHENA_STAGING_DIR not set");
        return;
    };

    let err = executor
        .execute("SELECT * FROM table_that_does_not_exist_42", false)
        .await
        .unwrap_err();

    assert_eq!(err.category(), "Query Error");
}

//! Shared setup for integration tests.

use athena_audit::client::{ClientManager, MockClientFactory};
use athena_audit::config::{Config, PollingConfig};
use athena_audit::query::QueryExecutor;
use athena_audit::service::{MockQueryService, Row};
use std::sync::Arc;

/// Config with a staging location and no waiting between polls or retries.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.athena.staging_location = Some("s3://audit-staging/results/".to_string());
    config.polling = PollingConfig::immediate();
    config
}

/// Executor over `service`, plus the factory for inspecting it.
pub fn mock_executor(service: MockQueryService) -> (Arc<MockClientFactory>, QueryExecutor) {
    mock_executor_with(service, &test_config())
}

pub fn mock_executor_with(
    service: MockQueryService,
    config: &Config,
) -> (Arc<MockClientFactory>, QueryExecutor) {
    let factory = Arc::new(MockClientFactory::new(service));
    let clients = Arc::new(ClientManager::new(factory.clone()));
    let executor = QueryExecutor::new(clients, config).expect("test config has a staging location");
    (factory, executor)
}

/// Rows of single string values.
pub fn rows(values: &[&str]) -> Vec<Row> {
    values.iter().map(|v| vec![Some(v.to_string())]).collect()
}

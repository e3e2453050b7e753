//! Query execution facade.
//!
//! Wires the submitter, poller, paginator, and batch orchestrator together
//! over one client manager and exposes the caller-facing execution paths.

use futures::stream::BoxStream;
use std::sync::Arc;
use tracing::info;

use super::batch::{BatchOrchestrator, BatchOutcome, StatementRunner};
use super::paginator::ResultPaginator;
use super::poller::CompletionPoller;
use super::submitter::Submitter;
use crate::client::{AthenaClientFactory, ClientManager, WorkerId};
use crate::config::Config;
use crate::error::{AuditError, Result};
use crate::service::{ExecutionHandle, ExecutionStats, ExecutionStatus, ResultPage};

/// Executes statements against the remote service.
#[derive(Debug, Clone)]
pub struct QueryExecutor {
    clients: Arc<ClientManager>,
    submitter: Submitter,
    poller: CompletionPoller,
    paginator: ResultPaginator,
    runner: StatementRunner,
    batch: BatchOrchestrator,
    default_pool_size: usize,
}

impl QueryExecutor {
    /// Creates an executor over `clients`.
    ///
    /// Fails if the configuration has no staging location.
    pub fn new(clients: Arc<ClientManager>, config: &Config) -> Result<Self> {
        let submitter = Submitter::new(config.athena.staging_location()?);
        let poller = CompletionPoller::new(clients.clone(), &config.polling);
        let paginator =
            ResultPaginator::new(clients.clone(), poller.clone(), config.athena.page_size);
        let runner = StatementRunner::new(
            clients.clone(),
            submitter.clone(),
            poller.clone(),
            &config.polling,
        );

        Ok(Self {
            clients,
            submitter,
            poller,
            paginator,
            batch: BatchOrchestrator::new(runner.clone()),
            runner,
            default_pool_size: config.athena.pool_size,
        })
    }

    /// Creates an executor talking to Athena in the configured region.
    pub fn connect(config: &Config) -> Result<Self> {
        let factory = Arc::new(AthenaClientFactory::new(&config.athena));
        Self::new(Arc::new(ClientManager::new(factory)), config)
    }

    /// Runs `statement` and returns all of its rows.
    ///
    /// With `use_dedup` the statement text is the dedup key, so an identical
    /// earlier request may be reused by the service.
    pub async fn execute(&self, statement: &str, use_dedup: bool) -> Result<ResultPage> {
        let dedup_key = use_dedup.then_some(statement);
        let handle = self.submit(statement, None, dedup_key).await?;
        self.paginator.fetch_all(WorkerId::MAIN, &handle).await
    }

    /// Starts `statement` for manual pagination with [`Self::fetch_page`].
    pub async fn start(&self, statement: &str) -> Result<ExecutionHandle> {
        self.submit(statement, None, None).await
    }

    /// Waits for an execution started with [`Self::start`].
    pub async fn await_completion(&self, handle: &ExecutionHandle) -> ExecutionStatus {
        self.poller.await_completion(WorkerId::MAIN, handle).await
    }

    /// Fetches one page of a started execution.
    pub async fn fetch_page(
        &self,
        handle: &ExecutionHandle,
        continuation_token: Option<&str>,
        max_rows: usize,
    ) -> Result<ResultPage> {
        self.paginator
            .fetch_page(WorkerId::MAIN, handle, continuation_token, max_rows)
            .await
    }

    /// Streams the pages of a started execution, `page_size` rows each.
    pub fn page_stream(
        &self,
        handle: ExecutionHandle,
        page_size: usize,
    ) -> BoxStream<'static, Result<ResultPage>> {
        self.paginator.page_stream(WorkerId::MAIN, handle, page_size)
    }

    /// Runs independent statements concurrently.
    ///
    /// Uses the configured pool size when `pool_size` is `None`.
    pub async fn execute_all(
        &self,
        statements: Vec<String>,
        pool_size: Option<usize>,
    ) -> Result<BatchOutcome> {
        self.batch
            .execute_all(statements, pool_size.unwrap_or(self.default_pool_size))
            .await
    }

    /// Runs `statement` with the batch retry policy and returns its status.
    ///
    /// Useful for long statements whose handle is needed afterwards.
    pub async fn execute_and_wait(&self, statement: &str) -> Result<ExecutionStatus> {
        let report = self.runner.run(WorkerId::MAIN, 0, statement).await;
        match report.status {
            Some(status) if status.success() => Ok(status),
            Some(status) => Err(AuditError::query_failed(status)),
            None => Err(AuditError::transport(report.last_error.unwrap_or_else(|| {
                format!("no attempt of '{statement}' reached the service")
            }))),
        }
    }

    /// Runs `statement` writing its results to `output_location`.
    pub async fn execute_and_save(
        &self,
        statement: &str,
        output_location: &str,
    ) -> Result<ExecutionStatus> {
        let handle = self.submit(statement, Some(output_location), None).await?;
        let status = self.await_completion(&handle).await;
        if status.success() {
            info!("Results of {} saved to {}", handle, output_location);
            Ok(status)
        } else {
            Err(AuditError::query_failed(status))
        }
    }

    /// Returns the partitions of `table` (with database prefix), sorted.
    pub async fn table_partitions(&self, table: &str) -> Result<Vec<String>> {
        let statement = format!("SHOW PARTITIONS {table}");
        info!("Executing {}", statement);
        let page = self.execute(&statement, false).await?;

        let mut partitions: Vec<String> = page
            .rows
            .into_iter()
            .flatten()
            .flatten()
            .collect();
        partitions.sort();
        Ok(partitions)
    }

    /// Returns usage statistics for up to 50 executions.
    pub async fn execution_stats(&self, execution_ids: &[String]) -> Result<Vec<ExecutionStats>> {
        let client = self.clients.handle_for(WorkerId::MAIN).await?;
        client.batch_execution_stats(execution_ids).await
    }

    async fn submit(
        &self,
        statement: &str,
        output_location: Option<&str>,
        dedup_key: Option<&str>,
    ) -> Result<ExecutionHandle> {
        let client = self.clients.handle_for(WorkerId::MAIN).await?;
        self.submitter
            .submit(client.as_ref(), statement, output_location, dedup_key)
            .await
    }
}

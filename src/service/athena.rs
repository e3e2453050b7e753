//! Athena implementation of the query service.
//!
//! Wraps the AWS SDK client and maps its responses onto the crate's types.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_athena::config::Region;
use aws_sdk_athena::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_athena::primitives::{DateTime, DateTimeFormat};
use aws_sdk_athena::types::{QueryExecutionState, ResultConfiguration};
use aws_sdk_athena::Client;
use tracing::{debug, warn};

use super::{
    ColumnInfo, ExecutionHandle, ExecutionState, ExecutionStats, ExecutionStatus, QueryService,
    ResultPage, MAX_STATS_BATCH,
};
use crate::error::{AuditError, Result};

/// Error codes the service uses for expired session credentials.
const EXPIRED_CREDENTIAL_CODES: &[&str] = &["ExpiredTokenException", "ExpiredToken"];

/// Athena client bound to one region.
#[derive(Debug, Clone)]
pub struct AthenaService {
    client: Client,
    workgroup: Option<String>,
}

impl AthenaService {
    /// Wraps an already configured SDK client.
    pub fn new(client: Client, workgroup: Option<String>) -> Self {
        Self { client, workgroup }
    }

    /// Resolves credentials from the default provider chain and builds a client.
    pub async fn connect(region: &str, workgroup: Option<String>) -> Self {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .load()
            .await;
        debug!("Created Athena client for region {}", region);
        Self::new(Client::new(&sdk_config), workgroup)
    }

    /// Maps an SDK failure onto the transport error taxonomy.
    fn classify<E>(operation: &str, err: SdkError<E>) -> AuditError
    where
        E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    {
        let expired = err
            .code()
            .is_some_and(|code| EXPIRED_CREDENTIAL_CODES.contains(&code));
        let message = format!("{operation}: {}", DisplayErrorContext(&err));
        if expired {
            AuditError::credential_expired(message)
        } else {
            AuditError::transport(message)
        }
    }

    fn map_state(state: &QueryExecutionState) -> Result<ExecutionState> {
        match state {
            QueryExecutionState::Queued => Ok(ExecutionState::Queued),
            QueryExecutionState::Running => Ok(ExecutionState::Running),
            QueryExecutionState::Succeeded => Ok(ExecutionState::Succeeded),
            QueryExecutionState::Failed => Ok(ExecutionState::Failed),
            QueryExecutionState::Cancelled => Ok(ExecutionState::Cancelled),
            other => Err(AuditError::malformed(format!(
                "unknown execution state '{}'",
                other.as_str()
            ))),
        }
    }

    fn format_time(time: Option<&DateTime>) -> Option<String> {
        time.and_then(|t| t.fmt(DateTimeFormat::DateTime).ok())
    }
}

#[async_trait]
impl QueryService for AthenaService {
    async fn start_execution(
        &self,
        statement: &str,
        request_token: &str,
        output_location: &str,
    ) -> Result<ExecutionHandle> {
        let output = self
            .client
            .start_query_execution()
            .query_string(statement)
            .client_request_token(request_token)
            .result_configuration(
                ResultConfiguration::builder()
                    .output_location(output_location)
                    .build(),
            )
            .set_work_group(self.workgroup.clone())
            .send()
            .await
            .map_err(|e| Self::classify("StartQueryExecution", e))?;

        output
            .query_execution_id()
            .map(ExecutionHandle::new)
            .ok_or_else(|| AuditError::malformed("StartQueryExecution returned no execution id"))
    }

    async fn execution_status(&self, handle: &ExecutionHandle) -> Result<ExecutionStatus> {
        let output = self
            .client
            .get_query_execution()
            .query_execution_id(handle.as_str())
            .send()
            .await
            .map_err(|e| Self::classify("GetQueryExecution", e))?;

        let execution = output
            .query_execution()
            .ok_or_else(|| AuditError::malformed(format!("no execution details for {handle}")))?;
        let status = execution
            .status()
            .ok_or_else(|| AuditError::malformed(format!("no status for {handle}")))?;
        let state = status
            .state()
            .ok_or_else(|| AuditError::malformed(format!("no state for {handle}")))?;

        Ok(ExecutionStatus::reported(
            handle.clone(),
            Self::map_state(state)?,
            execution.query().unwrap_or_default(),
            status.state_change_reason().map(str::to_string),
        ))
    }

    async fn result_page(
        &self,
        handle: &ExecutionHandle,
        continuation_token: Option<&str>,
        max_rows: usize,
    ) -> Result<ResultPage> {
        let max_results = i32::try_from(max_rows)
            .map_err(|_| AuditError::config(format!("page size {max_rows} is too large")))?;

        let output = self
            .client
            .get_query_results()
            .query_execution_id(handle.as_str())
            .set_next_token(continuation_token.map(str::to_string))
            .max_results(max_results)
            .send()
            .await
            .map_err(|e| Self::classify("GetQueryResults", e))?;

        let result_set = output
            .result_set()
            .ok_or_else(|| AuditError::malformed(format!("no result set for {handle}")))?;
        let metadata = result_set
            .result_set_metadata()
            .ok_or_else(|| AuditError::malformed(format!("missing column metadata for {handle}")))?;

        let columns = metadata
            .column_info()
            .iter()
            .map(|c| ColumnInfo::new(c.name(), c.r#type()))
            .collect();
        let rows = result_set
            .rows()
            .iter()
            .map(|row| {
                row.data()
                    .iter()
                    .map(|datum| datum.var_char_value().map(str::to_string))
                    .collect()
            })
            .collect();

        Ok(ResultPage {
            columns,
            rows,
            next_token: output.next_token().map(str::to_string),
        })
    }

    async fn batch_execution_stats(
        &self,
        execution_ids: &[String],
    ) -> Result<Vec<ExecutionStats>> {
        if execution_ids.len() > MAX_STATS_BATCH {
            return Err(AuditError::internal(format!(
                "at most {MAX_STATS_BATCH} execution ids per call, got {}",
                execution_ids.len()
            )));
        }

        let output = self
            .client
            .batch_get_query_execution()
            .set_query_execution_ids(Some(execution_ids.to_vec()))
            .send()
            .await
            .map_err(|e| Self::classify("BatchGetQueryExecution", e))?;

        let unprocessed = output.unprocessed_query_execution_ids();
        if !unprocessed.is_empty() {
            warn!("{} execution ids were not processed", unprocessed.len());
        }

        Ok(output
            .query_executions()
            .iter()
            .map(|execution| {
                let statistics = execution.statistics();
                let status = execution.status();
                ExecutionStats {
                    execution_id: execution.query_execution_id().unwrap_or_default().to_string(),
                    database: execution
                        .query_execution_context()
                        .and_then(|c| c.database())
                        .map(str::to_string),
                    engine_execution_ms: statistics
                        .and_then(|s| s.engine_execution_time_in_millis()),
                    data_scanned_bytes: statistics.and_then(|s| s.data_scanned_in_bytes()),
                    state: status
                        .and_then(|s| s.state())
                        .map(|s| s.as_str().to_string())
                        .unwrap_or_default(),
                    submitted_at: Self::format_time(status.and_then(|s| s.submission_date_time())),
                    completed_at: Self::format_time(status.and_then(|s| s.completion_date_time())),
                }
            })
            .collect())
    }
}
